//! In-memory backend for tests and ephemeral sessions.

use async_trait::async_trait;
use kindred_core::conversation::ConversationId;
use kindred_core::error::MemoryError;
use kindred_core::memory::{MemoryBackend, MemoryRecord, MemoryTier};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Records held in a `Vec` behind an async `RwLock`. Nothing survives a
/// process restart.
#[derive(Default)]
pub struct InMemoryBackend {
    records: Arc<RwLock<Vec<MemoryRecord>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, mut record: MemoryRecord) -> Result<String, MemoryError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn records(
        &self,
        conversation: &ConversationId,
        tier: MemoryTier,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let records = self.records.read().await;
        let mut matching: Vec<MemoryRecord> = records
            .iter()
            .filter(|r| &r.conversation == conversation && r.tier == tier)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn replace_with_summary(
        &self,
        conversation: &ConversationId,
        summary: MemoryRecord,
        source_ids: &[String],
    ) -> Result<String, MemoryError> {
        let mut records = self.records.write().await;
        let id = summary.id.clone();
        // Summary lands before sources disappear.
        records.push(summary);
        records.retain(|r| {
            !(&r.conversation == conversation
                && r.tier == MemoryTier::Short
                && source_ids.contains(&r.id))
        });
        Ok(id)
    }

    async fn count(&self, conversation: &ConversationId) -> Result<usize, MemoryError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| &r.conversation == conversation)
            .count())
    }

    async fn clear(&self, conversation: &ConversationId) -> Result<(), MemoryError> {
        self.records
            .write()
            .await
            .retain(|r| &r.conversation != conversation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::conversation::Speaker;

    fn conv() -> ConversationId {
        ConversationId::from("c1")
    }

    #[tokio::test]
    async fn append_and_list_by_tier() {
        let backend = InMemoryBackend::new();
        backend
            .append(MemoryRecord::short(conv(), Speaker::User, "hello"))
            .await
            .unwrap();
        backend
            .append(MemoryRecord::summary(conv(), "summary", vec![], None))
            .await
            .unwrap();

        let short = backend.records(&conv(), MemoryTier::Short).await.unwrap();
        let long = backend.records(&conv(), MemoryTier::Long).await.unwrap();
        assert_eq!(short.len(), 1);
        assert_eq!(long.len(), 1);
    }

    #[tokio::test]
    async fn replace_with_summary_removes_only_sources() {
        let backend = InMemoryBackend::new();
        let a = backend
            .append(MemoryRecord::short(conv(), Speaker::User, "one"))
            .await
            .unwrap();
        backend
            .append(MemoryRecord::short(conv(), Speaker::Agent, "two"))
            .await
            .unwrap();

        let summary = MemoryRecord::summary(conv(), "folded one", vec![a.clone()], None);
        backend
            .replace_with_summary(&conv(), summary, &[a])
            .await
            .unwrap();

        let short = backend.records(&conv(), MemoryTier::Short).await.unwrap();
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].content, "two");
        let long = backend.records(&conv(), MemoryTier::Long).await.unwrap();
        assert_eq!(long.len(), 1);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let backend = InMemoryBackend::new();
        let other = ConversationId::from("c2");
        backend
            .append(MemoryRecord::short(conv(), Speaker::User, "mine"))
            .await
            .unwrap();
        assert_eq!(backend.count(&conv()).await.unwrap(), 1);
        assert_eq!(backend.count(&other).await.unwrap(), 0);

        backend.clear(&conv()).await.unwrap();
        assert_eq!(backend.count(&conv()).await.unwrap(), 0);
    }
}
