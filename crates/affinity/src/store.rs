//! Persisted relationship state, one snapshot per conversation.
//!
//! The file store writes a small JSON document per conversation under a
//! state directory. Snapshots are loaded on demand and flushed on every
//! save, so state survives restarts and conversations never share files.

use async_trait::async_trait;
use kindred_core::conversation::ConversationId;
use kindred_core::error::AffinityError;
use kindred_core::persona::{AffinityState, Emotion, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Everything the engine persists about one relationship.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    pub state: AffinityState,

    #[serde(default)]
    pub profile: UserProfile,

    #[serde(default)]
    pub emotion: Emotion,
}

#[async_trait]
pub trait AffinityStore: Send + Sync {
    /// Load the snapshot for a conversation, or the default for a new one.
    async fn load(
        &self,
        conversation: &ConversationId,
    ) -> Result<RelationshipSnapshot, AffinityError>;

    async fn save(
        &self,
        conversation: &ConversationId,
        snapshot: &RelationshipSnapshot,
    ) -> Result<(), AffinityError>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct InMemoryAffinityStore {
    snapshots: Arc<RwLock<HashMap<ConversationId, RelationshipSnapshot>>>,
}

impl InMemoryAffinityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AffinityStore for InMemoryAffinityStore {
    async fn load(
        &self,
        conversation: &ConversationId,
    ) -> Result<RelationshipSnapshot, AffinityError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(conversation)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(
        &self,
        conversation: &ConversationId,
        snapshot: &RelationshipSnapshot,
    ) -> Result<(), AffinityError> {
        self.snapshots
            .write()
            .await
            .insert(conversation.clone(), snapshot.clone());
        Ok(())
    }
}

/// File-backed store: `<dir>/<conversation>.json`.
pub struct FileAffinityStore {
    dir: PathBuf,
}

impl FileAffinityStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, conversation: &ConversationId) -> PathBuf {
        // Conversation ids are uuids or user-chosen names; strip path
        // separators so a hostile id cannot escape the state dir.
        let safe: String = conversation
            .0
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl AffinityStore for FileAffinityStore {
    async fn load(
        &self,
        conversation: &ConversationId,
    ) -> Result<RelationshipSnapshot, AffinityError> {
        let path = self.path_for(conversation);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => {
                debug!(conversation = %conversation, "no affinity snapshot, starting fresh");
                return Ok(RelationshipSnapshot::default());
            }
        };
        serde_json::from_str(&content)
            .map_err(|e| AffinityError::Storage(format!("corrupt snapshot at {}: {e}", path.display())))
    }

    async fn save(
        &self,
        conversation: &ConversationId,
        snapshot: &RelationshipSnapshot,
    ) -> Result<(), AffinityError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| AffinityError::Storage(format!("create dir: {e}")))?;
        let path = self.path_for(conversation);
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| AffinityError::Storage(format!("serialize snapshot: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| AffinityError::Storage(format!("write {}: {e}", path.display())))?;
        debug!(conversation = %conversation, score = snapshot.state.score, "affinity snapshot saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAffinityStore::new(dir.path().to_path_buf());
        let conv = ConversationId::from("alice");

        let mut snapshot = RelationshipSnapshot::default();
        snapshot.state.score = 72;
        snapshot.profile.nickname = Some("Ali".into());
        snapshot.emotion = Emotion::Happy;
        store.save(&conv, &snapshot).await.unwrap();

        let loaded = store.load(&conv).await.unwrap();
        assert_eq!(loaded.state.score, 72);
        assert_eq!(loaded.profile.nickname.as_deref(), Some("Ali"));
        assert_eq!(loaded.emotion, Emotion::Happy);
    }

    #[tokio::test]
    async fn missing_snapshot_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAffinityStore::new(dir.path().to_path_buf());
        let loaded = store.load(&ConversationId::from("nobody")).await.unwrap();
        assert_eq!(loaded.state.score, 50);
        assert!(loaded.profile.nickname.is_none());
    }

    #[tokio::test]
    async fn conversations_do_not_share_state() {
        let store = InMemoryAffinityStore::new();
        let a = ConversationId::from("a");
        let b = ConversationId::from("b");

        let mut snap = RelationshipSnapshot::default();
        snap.state.score = 90;
        store.save(&a, &snap).await.unwrap();

        assert_eq!(store.load(&a).await.unwrap().state.score, 90);
        assert_eq!(store.load(&b).await.unwrap().state.score, 50);
    }

    #[tokio::test]
    async fn hostile_conversation_id_stays_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAffinityStore::new(dir.path().to_path_buf());
        let conv = ConversationId::from("../../etc/passwd");
        store
            .save(&conv, &RelationshipSnapshot::default())
            .await
            .unwrap();
        // Exactly one file, inside the state dir.
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }
}
