//! Summarizers for memory promotion.
//!
//! The model-backed summarizer is the real path; the extractive one is the
//! no-dependency fallback that promotion falls through to, so a summarizer
//! outage can never block or lose a promotion.

use async_trait::async_trait;
use kindred_core::error::MemoryError;
use kindred_core::memory::{MemoryRecord, Summarizer};
use kindred_core::model::{ChatMessage, ModelClient, ModelRequest};
use std::sync::Arc;
use tracing::debug;

/// Truncated verbatim join. Keeps attribution per line and caps length, so
/// the output is lossy but always derived from the real transcript.
pub struct ExtractiveSummarizer {
    max_chars: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(50),
        }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(500)
    }
}

pub(crate) fn transcript(records: &[MemoryRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}: {}", r.speaker, r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, records: &[MemoryRecord]) -> Result<String, MemoryError> {
        if records.is_empty() {
            return Err(MemoryError::SummarizationFailed("nothing to summarize".into()));
        }
        let joined = transcript(records);
        let truncated: String = joined.chars().take(self.max_chars).collect();
        Ok(truncated)
    }
}

/// Summarizer that asks the model for a compact third-person digest.
pub struct ModelSummarizer {
    client: Arc<dyn ModelClient>,
    model: String,
}

impl ModelSummarizer {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation excerpt in 2-3 plain \
sentences. Keep concrete facts the agent should remember about the user \
(names, preferences, plans, dates). Write in the third person.";

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, records: &[MemoryRecord]) -> Result<String, MemoryError> {
        if records.is_empty() {
            return Err(MemoryError::SummarizationFailed("nothing to summarize".into()));
        }
        let request = ModelRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(SUMMARY_INSTRUCTION),
                ChatMessage::user(transcript(records)),
            ],
            temperature: 0.3,
            max_tokens: Some(256),
            tools: Vec::new(),
        };
        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| MemoryError::SummarizationFailed(e.to_string()))?;

        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(MemoryError::SummarizationFailed("model returned empty summary".into()));
        }
        debug!(records = records.len(), chars = summary.len(), "model summary produced");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::conversation::{ConversationId, Speaker};

    fn record(speaker: Speaker, content: &str) -> MemoryRecord {
        MemoryRecord::short(ConversationId::from("c1"), speaker, content)
    }

    #[tokio::test]
    async fn extractive_keeps_attribution() {
        let summarizer = ExtractiveSummarizer::default();
        let records = vec![
            record(Speaker::User, "I moved to Lisbon last month"),
            record(Speaker::Agent, "How are you finding it?"),
        ];
        let summary = summarizer.summarize(&records).await.unwrap();
        assert!(summary.contains("user: I moved to Lisbon"));
        assert!(summary.contains("agent: How are you finding it?"));
    }

    #[tokio::test]
    async fn extractive_truncates_at_cap() {
        let summarizer = ExtractiveSummarizer::new(50);
        let records = vec![record(Speaker::User, &"long ".repeat(100))];
        let summary = summarizer.summarize(&records).await.unwrap();
        assert_eq!(summary.chars().count(), 50);
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        let summarizer = ExtractiveSummarizer::default();
        assert!(summarizer.summarize(&[]).await.is_err());
    }
}
