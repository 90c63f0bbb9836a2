//! SQLite backend — durable record storage with transactional promotion.
//!
//! A single `records` table holds both tiers, keyed by conversation.
//! Embeddings are stored as little-endian f32 blobs. Promotion runs inside
//! one transaction so the summary and the source deletions land together.

use async_trait::async_trait;
use chrono::Utc;
use kindred_core::conversation::{ConversationId, Speaker};
use kindred_core::error::MemoryError;
use kindred_core::memory::{MemoryBackend, MemoryRecord, MemoryTier};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Create a new SQLite backend from a file path.
    ///
    /// The database and its schema are created automatically. Pass
    /// `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("failed to open SQLite: {e}")))?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        info!("SQLite memory backend initialized at {path}");
        Ok(backend)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                id           TEXT UNIQUE NOT NULL,
                conversation TEXT NOT NULL,
                tier         TEXT NOT NULL,
                speaker      TEXT NOT NULL,
                content      TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                embedding    BLOB,
                source_ids   TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("records table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_conv_tier ON records(conversation, tier, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("records index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryRecord, MemoryError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| MemoryError::Storage(format!("id column: {e}")))?;
        let conversation: String = row
            .try_get("conversation")
            .map_err(|e| MemoryError::Storage(format!("conversation column: {e}")))?;
        let tier: String = row
            .try_get("tier")
            .map_err(|e| MemoryError::Storage(format!("tier column: {e}")))?;
        let speaker: String = row
            .try_get("speaker")
            .map_err(|e| MemoryError::Storage(format!("speaker column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::Storage(format!("content column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::Storage(format!("created_at column: {e}")))?;
        let source_ids_json: String = row
            .try_get("source_ids")
            .map_err(|e| MemoryError::Storage(format!("source_ids column: {e}")))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let embedding: Option<Vec<u8>> = row.try_get("embedding").ok();
        let embedding = embedding.map(|blob| {
            blob.chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect()
        });

        Ok(MemoryRecord {
            id,
            conversation: ConversationId(conversation),
            tier: if tier == "long" {
                MemoryTier::Long
            } else {
                MemoryTier::Short
            },
            speaker: if speaker == "agent" {
                Speaker::Agent
            } else {
                Speaker::User
            },
            content,
            created_at,
            embedding,
            source_ids: serde_json::from_str(&source_ids_json).unwrap_or_default(),
            salience: 0.0,
        })
    }

    fn tier_str(tier: MemoryTier) -> &'static str {
        match tier {
            MemoryTier::Short => "short",
            MemoryTier::Long => "long",
        }
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, mut record: MemoryRecord) -> Result<String, MemoryError> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        let source_ids = serde_json::to_string(&record.source_ids)
            .map_err(|e| MemoryError::Storage(format!("source_ids serialization: {e}")))?;
        let embedding_blob: Option<Vec<u8>> =
            record.embedding.as_deref().map(Self::embedding_to_blob);

        sqlx::query(
            r#"
            INSERT INTO records (id, conversation, tier, speaker, content, created_at, embedding, source_ids)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                tier = excluded.tier,
                embedding = excluded.embedding,
                source_ids = excluded.source_ids
            "#,
        )
        .bind(&record.id)
        .bind(&record.conversation.0)
        .bind(Self::tier_str(record.tier))
        .bind(record.speaker.to_string())
        .bind(&record.content)
        .bind(record.created_at.to_rfc3339())
        .bind(embedding_blob.as_deref())
        .bind(&source_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!("stored memory record {id}");
        Ok(id)
    }

    async fn records(
        &self,
        conversation: &ConversationId,
        tier: MemoryTier,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = sqlx::query(
            "SELECT * FROM records WHERE conversation = ?1 AND tier = ?2 ORDER BY created_at ASC, iid ASC",
        )
        .bind(&conversation.0)
        .bind(Self::tier_str(tier))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("SELECT failed: {e}")))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn replace_with_summary(
        &self,
        conversation: &ConversationId,
        summary: MemoryRecord,
        source_ids: &[String],
    ) -> Result<String, MemoryError> {
        let id = summary.id.clone();
        let source_ids_json = serde_json::to_string(&summary.source_ids)
            .map_err(|e| MemoryError::Storage(format!("source_ids serialization: {e}")))?;
        let embedding_blob: Option<Vec<u8>> =
            summary.embedding.as_deref().map(Self::embedding_to_blob);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("begin transaction: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO records (id, conversation, tier, speaker, content, created_at, embedding, source_ids)
            VALUES (?1, ?2, 'long', ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&summary.id)
        .bind(&conversation.0)
        .bind(summary.speaker.to_string())
        .bind(&summary.content)
        .bind(summary.created_at.to_rfc3339())
        .bind(embedding_blob.as_deref())
        .bind(&source_ids_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("summary insert: {e}")))?;

        for source in source_ids {
            sqlx::query("DELETE FROM records WHERE id = ?1 AND conversation = ?2 AND tier = 'short'")
                .bind(source)
                .bind(&conversation.0)
                .execute(&mut *tx)
                .await
                .map_err(|e| MemoryError::Storage(format!("source delete: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("commit promotion: {e}")))?;

        debug!(summary = %id, folded = source_ids.len(), "promotion committed");
        Ok(id)
    }

    async fn count(&self, conversation: &ConversationId) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM records WHERE conversation = ?1")
            .bind(&conversation.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("COUNT failed: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| MemoryError::Storage(format!("count column: {e}")))?;
        Ok(n as usize)
    }

    async fn clear(&self, conversation: &ConversationId) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM records WHERE conversation = ?1")
            .bind(&conversation.0)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> ConversationId {
        ConversationId::from("c1")
    }

    #[tokio::test]
    async fn roundtrip_with_embedding() {
        let backend = SqliteBackend::new(":memory:").await.unwrap();
        let mut record = MemoryRecord::short(conv(), Speaker::User, "remember this");
        record.embedding = Some(vec![0.25, -0.5, 1.0]);
        backend.append(record).await.unwrap();

        let loaded = backend.records(&conv(), MemoryTier::Short).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "remember this");
        assert_eq!(loaded[0].embedding.as_deref(), Some(&[0.25, -0.5, 1.0][..]));
    }

    #[tokio::test]
    async fn transactional_promotion() {
        let backend = SqliteBackend::new(":memory:").await.unwrap();
        let mut source_ids = Vec::new();
        for i in 0..4 {
            let id = backend
                .append(MemoryRecord::short(conv(), Speaker::User, format!("turn {i}")))
                .await
                .unwrap();
            source_ids.push(id);
        }

        let folded = source_ids[..2].to_vec();
        let summary = MemoryRecord::summary(conv(), "early turns", folded.clone(), None);
        backend
            .replace_with_summary(&conv(), summary, &folded)
            .await
            .unwrap();

        let short = backend.records(&conv(), MemoryTier::Short).await.unwrap();
        assert_eq!(short.len(), 2);
        let long = backend.records(&conv(), MemoryTier::Long).await.unwrap();
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].source_ids, folded);
    }

    #[tokio::test]
    async fn records_survive_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let path = path.to_string_lossy().to_string();

        {
            let backend = SqliteBackend::new(&path).await.unwrap();
            backend
                .append(MemoryRecord::short(conv(), Speaker::User, "persist me"))
                .await
                .unwrap();
        }

        let reopened = SqliteBackend::new(&path).await.unwrap();
        let short = reopened.records(&conv(), MemoryTier::Short).await.unwrap();
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].content, "persist me");
    }

    #[tokio::test]
    async fn count_and_clear_scope_to_conversation() {
        let backend = SqliteBackend::new(":memory:").await.unwrap();
        let other = ConversationId::from("c2");
        backend
            .append(MemoryRecord::short(conv(), Speaker::User, "a"))
            .await
            .unwrap();
        backend
            .append(MemoryRecord::short(other.clone(), Speaker::User, "b"))
            .await
            .unwrap();

        backend.clear(&conv()).await.unwrap();
        assert_eq!(backend.count(&conv()).await.unwrap(), 0);
        assert_eq!(backend.count(&other).await.unwrap(), 1);
    }
}
