//! Memory traits and record types.
//!
//! Memory is two-tiered: a short-term tier of exact utterances and a
//! long-term tier of summarized records carrying embeddings. Backends only
//! store and load; ranking, budgeting, and promotion policy live in the
//! memory crate on top of these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::{ConversationId, Speaker};
use crate::error::MemoryError;

/// Which tier a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Exact recent utterances, cheap to keep, plentiful.
    Short,
    /// Summarized history, embedded for similarity search.
    Long,
}

/// A single memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub conversation: ConversationId,
    pub tier: MemoryTier,
    pub speaker: Speaker,
    pub content: String,
    pub created_at: DateTime<Utc>,

    /// Present on long-tier records; short-tier records are ranked by
    /// recency alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// For a summary record, the ids of every record it folded. Empty for
    /// exact records. A summary with a non-empty list is the loss-free
    /// receipt of a promotion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ids: Vec<String>,

    /// Retrieval score, set by search operations. Not persisted meaning.
    #[serde(default)]
    pub salience: f32,
}

impl MemoryRecord {
    /// A fresh short-tier record for one utterance.
    pub fn short(conversation: ConversationId, speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation,
            tier: MemoryTier::Short,
            speaker,
            content: content.into(),
            created_at: Utc::now(),
            embedding: None,
            source_ids: Vec::new(),
            salience: 0.0,
        }
    }

    /// A long-tier summary folding the given source records.
    pub fn summary(
        conversation: ConversationId,
        content: impl Into<String>,
        source_ids: Vec<String>,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation,
            tier: MemoryTier::Long,
            speaker: Speaker::Agent,
            content: content.into(),
            created_at: Utc::now(),
            embedding,
            source_ids,
            salience: 0.0,
        }
    }

    /// Rough token estimate (4 chars per token plus a small overhead).
    pub fn estimated_tokens(&self) -> usize {
        (self.content.len() + 3) / 4 + 4
    }
}

/// Storage for memory records, keyed by conversation.
///
/// Implementations: in-memory (tests), JSONL file, SQLite.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "sqlite", "file", "in_memory").
    fn name(&self) -> &str;

    /// Store a record, returning its id.
    async fn append(&self, record: MemoryRecord) -> std::result::Result<String, MemoryError>;

    /// All records of one tier for a conversation, oldest first.
    async fn records(
        &self,
        conversation: &ConversationId,
        tier: MemoryTier,
    ) -> std::result::Result<Vec<MemoryRecord>, MemoryError>;

    /// Write a summary to the long tier, then remove the source records
    /// from the short tier. The summary must be durable before any source
    /// disappears; a crash in between leaves duplicates, never a gap.
    async fn replace_with_summary(
        &self,
        conversation: &ConversationId,
        summary: MemoryRecord,
        source_ids: &[String],
    ) -> std::result::Result<String, MemoryError>;

    /// Record count for a conversation across both tiers.
    async fn count(&self, conversation: &ConversationId)
    -> std::result::Result<usize, MemoryError>;

    /// Remove everything for a conversation.
    async fn clear(&self, conversation: &ConversationId) -> std::result::Result<(), MemoryError>;
}

/// Text embedding, behind a trait so the engine never assumes a vendor.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, MemoryError>;
}

/// Conversation summarization for promotion.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        records: &[MemoryRecord],
    ) -> std::result::Result<String, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_record_has_no_sources() {
        let record = MemoryRecord::short(ConversationId::from("c1"), Speaker::User, "hello");
        assert_eq!(record.tier, MemoryTier::Short);
        assert!(record.source_ids.is_empty());
        assert!(record.embedding.is_none());
    }

    #[test]
    fn summary_record_keeps_source_ids() {
        let sources = vec!["a".to_string(), "b".to_string()];
        let record = MemoryRecord::summary(
            ConversationId::from("c1"),
            "they talked about lunch",
            sources.clone(),
            Some(vec![0.1, 0.2]),
        );
        assert_eq!(record.tier, MemoryTier::Long);
        assert_eq!(record.source_ids, sources);
    }

    #[test]
    fn token_estimate_scales_with_length() {
        let record = MemoryRecord::short(
            ConversationId::from("c1"),
            Speaker::User,
            "x".repeat(40),
        );
        assert_eq!(record.estimated_tokens(), 14);
    }
}
