//! The memory archiver — the single writer of conversational memory.
//!
//! Runs once per finalized turn, for every outcome. Cancelled and aborted
//! turns archive too; the relationship remembers refusals and dead ends the
//! same as answers.

use kindred_core::conversation::TurnRecord;
use kindred_core::error::MemoryError;
use std::sync::Arc;
use tracing::debug;

use crate::store::MemoryStore;

pub struct MemoryArchiver {
    store: Arc<MemoryStore>,
}

impl MemoryArchiver {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Append the turn's utterances to the short tier and promote when a
    /// threshold trips.
    pub async fn archive(&self, turn: &TurnRecord) -> Result<(), MemoryError> {
        self.store
            .remember(&turn.conversation, turn.input.speaker, &turn.input.content)
            .await?;
        if !turn.reply.content.is_empty() {
            self.store
                .remember(&turn.conversation, turn.reply.speaker, &turn.reply.content)
                .await?;
        }

        let promoted = self.store.promote_if_needed(&turn.conversation).await?;
        debug!(
            conversation = %turn.conversation,
            outcome = ?turn.outcome,
            promoted = promoted.is_some(),
            "turn archived"
        );
        Ok(())
    }
}
