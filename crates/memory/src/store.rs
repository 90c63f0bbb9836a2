//! The tiered memory store: append, retrieve, promote.
//!
//! Policy lives here; persistence lives behind [`MemoryBackend`]. Retrieval
//! degrades (recency-only) when the embedder is down. Promotion writes the
//! summary before the sources go away and falls back to an extractive
//! summary when the model summarizer fails, so it can duplicate but never
//! lose.

use kindred_core::conversation::{ConversationId, Speaker};
use kindred_core::error::MemoryError;
use kindred_core::memory::{Embedder, MemoryBackend, MemoryRecord, MemoryTier, Summarizer};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::summarize::ExtractiveSummarizer;
use crate::vector;

/// Thresholds and limits for the store.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Short-tier record count that triggers promotion.
    pub max_short_records: usize,
    /// Short-tier estimated token total that triggers promotion.
    pub max_short_tokens: usize,
    /// How many of the oldest short-tier records fold into one summary.
    pub promote_batch: usize,
    /// Default maximum records returned by retrieval.
    pub retrieve_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_short_records: 20,
            max_short_tokens: 2000,
            promote_batch: 10,
            retrieve_limit: 5,
        }
    }
}

pub struct MemoryStore {
    backend: Arc<dyn MemoryBackend>,
    embedder: Arc<dyn Embedder>,
    summarizer: Arc<dyn Summarizer>,
    fallback: ExtractiveSummarizer,
    config: MemoryConfig,
}

impl MemoryStore {
    pub fn new(
        backend: Arc<dyn MemoryBackend>,
        embedder: Arc<dyn Embedder>,
        summarizer: Arc<dyn Summarizer>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            backend,
            embedder,
            summarizer,
            fallback: ExtractiveSummarizer::default(),
            config,
        }
    }

    /// Append one utterance to the short tier. Never summarizes inline.
    pub async fn remember(
        &self,
        conversation: &ConversationId,
        speaker: Speaker,
        content: &str,
    ) -> Result<String, MemoryError> {
        let record = MemoryRecord::short(conversation.clone(), speaker, content);
        self.backend.append(record).await
    }

    /// Retrieve up to `k` records across both tiers within `token_budget`.
    ///
    /// Candidates are ranked by blended similarity/recency score; the fill
    /// is greedy in rank order and stops at the first record that would
    /// overflow the budget. An embedder outage downgrades ranking to pure
    /// recency instead of failing the turn.
    pub async fn retrieve(
        &self,
        conversation: &ConversationId,
        query: &str,
        k: usize,
        token_budget: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let mut candidates = self.backend.records(conversation, MemoryTier::Long).await?;
        candidates.extend(self.backend.records(conversation, MemoryTier::Short).await?);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = match self.embedder.embed(query).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "retrieval degraded to recency-only ranking");
                None
            }
        };

        vector::rank(&mut candidates, query_embedding.as_deref());
        candidates.truncate(k);

        let mut selected = Vec::new();
        let mut used_tokens = 0usize;
        for record in candidates {
            let cost = record.estimated_tokens();
            if used_tokens + cost > token_budget {
                break;
            }
            used_tokens += cost;
            selected.push(record);
        }

        debug!(
            conversation = %conversation,
            selected = selected.len(),
            used_tokens,
            token_budget,
            "memory retrieval complete"
        );
        Ok(selected)
    }

    /// Fold the oldest short-tier run into one long-tier summary when a
    /// threshold trips. Returns the summary id when a promotion happened.
    pub async fn promote_if_needed(
        &self,
        conversation: &ConversationId,
    ) -> Result<Option<String>, MemoryError> {
        let short = self.backend.records(conversation, MemoryTier::Short).await?;
        let total_tokens: usize = short.iter().map(|r| r.estimated_tokens()).sum();

        let over_count = short.len() >= self.config.max_short_records;
        let over_tokens = total_tokens >= self.config.max_short_tokens;
        if !over_count && !over_tokens {
            return Ok(None);
        }

        let batch = self.config.promote_batch.min(short.len());
        if batch == 0 {
            return Ok(None);
        }
        let oldest = &short[..batch];
        let source_ids: Vec<String> = oldest.iter().map(|r| r.id.clone()).collect();

        let summary_text = match self.summarizer.summarize(oldest).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "summarizer failed, using extractive fallback");
                self.fallback.summarize(oldest).await?
            }
        };

        let embedding = match self.embedder.embed(&summary_text).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "summary stored without embedding");
                None
            }
        };

        let summary = MemoryRecord::summary(
            conversation.clone(),
            summary_text,
            source_ids.clone(),
            embedding,
        );
        let id = self
            .backend
            .replace_with_summary(conversation, summary, &source_ids)
            .await?;

        info!(
            conversation = %conversation,
            folded = source_ids.len(),
            summary = %id,
            "short-term run promoted"
        );
        Ok(Some(id))
    }

    /// (short, long) record counts, for status reporting.
    pub async fn tier_counts(
        &self,
        conversation: &ConversationId,
    ) -> Result<(usize, usize), MemoryError> {
        let short = self.backend.records(conversation, MemoryTier::Short).await?;
        let long = self.backend.records(conversation, MemoryTier::Long).await?;
        Ok((short.len(), long.len()))
    }

    pub async fn clear(&self, conversation: &ConversationId) -> Result<(), MemoryError> {
        self.backend.clear(conversation).await
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::in_memory::InMemoryBackend;
    use async_trait::async_trait;

    struct CannedSummarizer;

    #[async_trait]
    impl Summarizer for CannedSummarizer {
        async fn summarize(&self, records: &[MemoryRecord]) -> Result<String, MemoryError> {
            Ok(format!("summary of {} utterances", records.len()))
        }
    }

    struct BrokenSummarizer;

    #[async_trait]
    impl Summarizer for BrokenSummarizer {
        async fn summarize(&self, _records: &[MemoryRecord]) -> Result<String, MemoryError> {
            Err(MemoryError::SummarizationFailed("offline".into()))
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
            Err(MemoryError::RetrievalUnavailable("embedder down".into()))
        }
    }

    fn store_with(
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
    ) -> MemoryStore {
        MemoryStore::new(
            Arc::new(InMemoryBackend::new()),
            embedder,
            summarizer,
            MemoryConfig::default(),
        )
    }

    fn conv() -> ConversationId {
        ConversationId::from("c1")
    }

    #[tokio::test]
    async fn twenty_turns_promote_oldest_ten() {
        let store = store_with(Arc::new(CannedSummarizer), Arc::new(HashEmbedder::default()));
        for i in 0..20 {
            store
                .remember(&conv(), Speaker::User, &format!("turn {i}"))
                .await
                .unwrap();
        }

        let promoted = store.promote_if_needed(&conv()).await.unwrap();
        assert!(promoted.is_some());

        let (short, long) = store.tier_counts(&conv()).await.unwrap();
        assert_eq!(short, 10);
        assert_eq!(long, 1);
    }

    #[tokio::test]
    async fn promotion_is_loss_free_with_broken_summarizer() {
        let store = store_with(Arc::new(BrokenSummarizer), Arc::new(HashEmbedder::default()));
        for i in 0..20 {
            store
                .remember(&conv(), Speaker::User, &format!("fact number {i}"))
                .await
                .unwrap();
        }

        store.promote_if_needed(&conv()).await.unwrap().unwrap();
        let (short, long) = store.tier_counts(&conv()).await.unwrap();
        assert_eq!(short, 10);
        assert_eq!(long, 1);

        // Fallback summary still derives from the real transcript.
        let records = store.retrieve(&conv(), "fact", 20, 10_000).await.unwrap();
        let summary = records.iter().find(|r| r.tier == MemoryTier::Long).unwrap();
        assert!(summary.content.contains("fact number 0"));
        assert_eq!(summary.source_ids.len(), 10);
    }

    #[tokio::test]
    async fn under_threshold_does_not_promote() {
        let store = store_with(Arc::new(CannedSummarizer), Arc::new(HashEmbedder::default()));
        for i in 0..5 {
            store
                .remember(&conv(), Speaker::User, &format!("turn {i}"))
                .await
                .unwrap();
        }
        assert!(store.promote_if_needed(&conv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retrieval_respects_token_budget() {
        let store = store_with(Arc::new(CannedSummarizer), Arc::new(HashEmbedder::default()));
        for i in 0..5 {
            store
                .remember(&conv(), Speaker::User, &format!("message {i} {}", "x".repeat(100)))
                .await
                .unwrap();
        }

        // Each record is ~29 tokens plus overhead; a tight budget keeps one.
        let results = store.retrieve(&conv(), "message", 10, 40).await.unwrap();
        assert_eq!(results.len(), 1);

        let all = store.retrieve(&conv(), "message", 10, 10_000).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn broken_embedder_degrades_to_recency() {
        let store = store_with(Arc::new(CannedSummarizer), Arc::new(BrokenEmbedder));
        store.remember(&conv(), Speaker::User, "older").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.remember(&conv(), Speaker::User, "newer").await.unwrap();

        let results = store.retrieve(&conv(), "anything", 10, 1_000).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "newer");
    }

    #[tokio::test]
    async fn retrieve_caps_at_k() {
        let store = store_with(Arc::new(CannedSummarizer), Arc::new(HashEmbedder::default()));
        for i in 0..8 {
            store
                .remember(&conv(), Speaker::User, &format!("turn {i}"))
                .await
                .unwrap();
        }
        let results = store.retrieve(&conv(), "turn", 3, 10_000).await.unwrap();
        assert_eq!(results.len(), 3);
    }
}
