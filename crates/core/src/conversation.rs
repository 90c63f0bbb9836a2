//! Conversation and turn domain types.
//!
//! A conversation is a long-lived relationship between one user and the
//! agent. Each exchange is a turn; the finalized [`TurnRecord`] is the
//! immutable audit trail of what the engine saw, did, and answered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolResult;

/// Unique identifier for a conversation (one per user relationship).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Agent => write!(f, "agent"),
        }
    }
}

/// A single utterance within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub id: String,
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Speaker::User, content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(Speaker::Agent, content)
    }

    fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            speaker,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The loop produced a final answer.
    Done,
    /// The user (or a confirmation timeout) refused a sensitive action.
    Cancelled,
    /// The step limit tripped before an answer emerged.
    Aborted,
    /// A mandatory dependency (the model) failed outright.
    Failed,
}

/// One tool invocation inside a turn, recorded for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// None when the call never executed (refused or timed out).
    pub result: Option<ToolResult>,
    pub confirmed: Option<bool>,
}

/// Per-section prompt metadata carried on the finalized turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionStat {
    pub name: String,
    pub tokens: usize,
    #[serde(default)]
    pub dropped_records: usize,
}

/// The immutable record of one completed turn.
///
/// Built incrementally during the turn, finalized exactly once, and then
/// handed to the archiver. Nothing mutates a finalized record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub conversation: ConversationId,
    pub input: Utterance,
    pub reply: Utterance,
    pub outcome: TurnOutcome,
    pub affinity_delta: i8,
    pub affinity_score: u8,
    pub sections: Vec<SectionStat>,
    pub tool_invocations: Vec<ToolInvocation>,
    pub steps: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utterance_constructors_set_speaker() {
        let u = Utterance::user("hello");
        assert_eq!(u.speaker, Speaker::User);
        let a = Utterance::agent("hi there");
        assert_eq!(a.speaker, Speaker::Agent);
    }

    #[test]
    fn turn_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&TurnOutcome::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn turn_record_roundtrip() {
        let record = TurnRecord {
            conversation: ConversationId::from("conv-1"),
            input: Utterance::user("hi"),
            reply: Utterance::agent("hello"),
            outcome: TurnOutcome::Done,
            affinity_delta: 1,
            affinity_score: 51,
            sections: vec![SectionStat {
                name: "persona".into(),
                tokens: 120,
                dropped_records: 0,
            }],
            tool_invocations: vec![],
            steps: 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: TurnRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.outcome, TurnOutcome::Done);
        assert_eq!(back.affinity_score, 51);
    }
}
