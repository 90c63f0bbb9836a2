//! File-based memory backend — persistent JSON-lines storage.
//!
//! One JSONL file holds every record across conversations; each line is a
//! JSON-encoded `MemoryRecord`. Records load into memory on creation and
//! flush to disk on every mutation, so reads are fast and writes durable.
//!
//! Storage location: `~/.kindred/memory/records.jsonl`

use async_trait::async_trait;
use kindred_core::conversation::ConversationId;
use kindred_core::error::MemoryError;
use kindred_core::memory::{MemoryBackend, MemoryRecord, MemoryTier};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct FileBackend {
    path: PathBuf,
    records: Arc<RwLock<Vec<MemoryRecord>>>,
}

impl FileBackend {
    /// Create a backend at the given path. If the file exists, records are
    /// loaded from it; otherwise it is created on first write.
    pub fn new(path: PathBuf) -> Self {
        let records = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = records.len(), "file memory backend loaded");
        Self {
            path,
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Default path: `~/.kindred/memory/records.jsonl`
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".kindred")
            .join("memory")
            .join("records.jsonl")
    }

    fn load_from_disk(path: &PathBuf) -> Vec<MemoryRecord> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<MemoryRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "skipping corrupted memory record");
                    None
                }
            })
            .collect()
    }

    /// Flush all records to disk as JSONL.
    async fn flush(&self) -> Result<(), MemoryError> {
        let records = self.records.read().await;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(format!("create memory directory: {e}")))?;
        }

        let mut content = String::new();
        for record in records.iter() {
            let line = serde_json::to_string(record)
                .map_err(|e| MemoryError::Storage(format!("serialize memory record: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| MemoryError::Storage(format!("write memory file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl MemoryBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, mut record: MemoryRecord) -> Result<String, MemoryError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        self.records.write().await.push(record);
        self.flush().await?;
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
        let id = summary.id.clone();
        {
            let mut records = self.records.write().await;
            records.push(summary);
        }
        // Flush with the summary present before dropping any source, so a
        // crash between the two writes duplicates instead of losing.
        self.flush().await?;
        {
            let mut records = self.records.write().await;
            records.retain(|r| {
                !(&r.conversation == conversation
                    && r.tier == MemoryTier::Short
                    && source_ids.contains(&r.id))
            });
        }
        self.flush().await?;
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
        self.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::conversation::Speaker;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn conv() -> ConversationId {
        ConversationId::from("c1")
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let backend = FileBackend::new(path.clone());
        backend
            .append(MemoryRecord::short(conv(), Speaker::User, "persist me"))
            .await
            .unwrap();
        drop(backend);

        let reopened = FileBackend::new(path);
        let short = reopened.records(&conv(), MemoryTier::Short).await.unwrap();
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].content, "persist me");
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        let good = serde_json::to_string(&MemoryRecord::short(conv(), Speaker::User, "ok")).unwrap();
        writeln!(file, "{good}").unwrap();
        writeln!(file, "{{not valid json").unwrap();
        file.flush().unwrap();

        let backend = FileBackend::new(file.path().to_path_buf());
        assert_eq!(backend.count(&conv()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn promote_persists_summary_and_drops_sources() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let backend = FileBackend::new(path.clone());

        let a = backend
            .append(MemoryRecord::short(conv(), Speaker::User, "one"))
            .await
            .unwrap();
        let b = backend
            .append(MemoryRecord::short(conv(), Speaker::Agent, "two"))
            .await
            .unwrap();

        let summary =
            MemoryRecord::summary(conv(), "folded", vec![a.clone(), b.clone()], None);
        backend
            .replace_with_summary(&conv(), summary, &[a, b])
            .await
            .unwrap();

        let reopened = FileBackend::new(path);
        assert!(reopened
            .records(&conv(), MemoryTier::Short)
            .await
            .unwrap()
            .is_empty());
        let long = reopened.records(&conv(), MemoryTier::Long).await.unwrap();
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].source_ids.len(), 2);
    }
}
