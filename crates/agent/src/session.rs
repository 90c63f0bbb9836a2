//! Sessions — one live conversation each, plus the manager that serializes
//! turns per conversation while letting different conversations run
//! concurrently.
//!
//! `take_turn` is the whole per-turn pipeline: affinity update, memory
//! retrieval, context assembly, the tool loop, profile updates, and the
//! archiver. The archiver runs for every outcome, including failures.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use kindred_affinity::{AffinityEngine, AffinityStore};
use kindred_core::conversation::{ConversationId, TurnOutcome, TurnRecord, Utterance};
use kindred_core::error::Result;
use kindred_core::model::{AgentReply, ChatMessage, ModelClient};
use kindred_core::tool::ToolRegistry;
use kindred_memory::archiver::MemoryArchiver;
use kindred_memory::store::MemoryStore;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::context::assembler::{AssemblyInput, ContextAssembler};
use crate::turn_loop::{ConfirmationGate, TurnLoop, TurnLoopConfig};

/// Session-level knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Memories retrieved per turn.
    pub retrieve_k: usize,
    /// Token budget for retrieved memories.
    pub memory_token_budget: usize,
    /// Token budget for the assembled system prompt.
    pub context_budget: usize,
    /// Prior exchanges kept in the live transcript.
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retrieve_k: 5,
            memory_token_budget: 1024,
            context_budget: 4096,
            history_limit: 10,
        }
    }
}

/// Everything a session needs, shared across all conversations.
#[derive(Clone)]
pub struct SessionDeps {
    pub model: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub gate: Arc<dyn ConfirmationGate>,
    pub affinity: Arc<dyn AffinityStore>,
    pub memory: Arc<MemoryStore>,
    pub loop_config: TurnLoopConfig,
    pub session_config: SessionConfig,
}

/// One live conversation.
pub struct Session {
    conversation: ConversationId,
    engine: AffinityEngine,
    affinity: Arc<dyn AffinityStore>,
    memory: Arc<MemoryStore>,
    archiver: MemoryArchiver,
    tools: Arc<ToolRegistry>,
    assembler: ContextAssembler,
    turn_loop: TurnLoop,
    history: Vec<ChatMessage>,
    /// Whether the previous turn actually invoked tools. While true, the
    /// tools section is mandatory for the follow-up turn.
    last_turn_used_tools: bool,
    config: SessionConfig,
}

impl Session {
    pub fn new(conversation: ConversationId, deps: &SessionDeps) -> Self {
        Self {
            conversation,
            engine: AffinityEngine::new(),
            affinity: deps.affinity.clone(),
            memory: deps.memory.clone(),
            archiver: MemoryArchiver::new(deps.memory.clone()),
            tools: deps.tools.clone(),
            assembler: ContextAssembler::new(deps.session_config.context_budget),
            turn_loop: TurnLoop::new(
                deps.model.clone(),
                deps.tools.clone(),
                deps.gate.clone(),
                deps.loop_config.clone(),
            ),
            history: Vec::new(),
            last_turn_used_tools: false,
            config: deps.session_config.clone(),
        }
    }

    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Run one full turn and return its finalized record.
    ///
    /// A model failure does not bubble out; it resolves into a `Failed`
    /// record with a degraded reply, and the record is archived like any
    /// other turn.
    pub async fn take_turn(&mut self, input: &str) -> Result<TurnRecord> {
        let started_at = Utc::now();
        let input_utterance = Utterance::user(input);

        let mut snapshot = self.affinity.load(&self.conversation).await?;
        let delta = self.engine.update(&mut snapshot.state, input);

        let memories = match self
            .memory
            .retrieve(
                &self.conversation,
                input,
                self.config.retrieve_k,
                self.config.memory_token_budget,
            )
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "memory retrieval failed, continuing without memories");
                Vec::new()
            }
        };

        let definitions = self.tools.definitions();
        let prompt = self.assembler.assemble(&AssemblyInput {
            snapshot: &snapshot,
            memories: &memories,
            tool_definitions: &definitions,
            // A turn that follows tool use keeps its tools under budget
            // pressure; an idle chat turn can shed them.
            tools_optional: !self.last_turn_used_tools,
            now: started_at,
        })?;

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(prompt.system_message()));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(input));

        let (reply, outcome, invocations, steps) = match self.turn_loop.run(messages).await {
            Ok(result) => (
                result.reply,
                result.outcome,
                result.invocations,
                result.steps,
            ),
            Err(e) => {
                warn!(error = %e, "model call failed, finishing turn degraded");
                (
                    AgentReply::plain(
                        "I'm having trouble thinking right now. Give me a moment and \
                         ask me again?",
                    ),
                    TurnOutcome::Failed,
                    Vec::new(),
                    0,
                )
            }
        };

        self.last_turn_used_tools = !invocations.is_empty();

        // The reply may rename the relationship; the engine owns the score.
        if let Some(nickname) = &reply.nickname {
            snapshot.profile.nickname = Some(nickname.clone());
        }
        if let Some(relation) = &reply.relation {
            snapshot.profile.relation = Some(relation.clone());
        }
        snapshot.emotion = reply.emotion;

        let record = TurnRecord {
            conversation: self.conversation.clone(),
            input: input_utterance,
            reply: Utterance::agent(reply.reply.clone()),
            outcome,
            affinity_delta: delta.value(),
            affinity_score: snapshot.state.score,
            sections: prompt.stats(),
            tool_invocations: invocations,
            steps: steps as usize,
            started_at,
            finished_at: Utc::now(),
        };

        // Archive first; memory must not depend on the snapshot save.
        if let Err(e) = self.archiver.archive(&record).await {
            warn!(error = %e, "archiver failed for this turn");
        }
        if let Err(e) = self.affinity.save(&self.conversation, &snapshot).await {
            warn!(error = %e, "failed to persist relationship snapshot");
        }

        if outcome != TurnOutcome::Failed {
            self.history.push(ChatMessage::user(input));
            self.history.push(ChatMessage::assistant(record.reply.content.clone()));
            let max = self.config.history_limit * 2;
            if self.history.len() > max {
                self.history.drain(..self.history.len() - max);
            }
        }

        info!(
            conversation = %record.conversation,
            outcome = ?record.outcome,
            score = record.affinity_score,
            steps = record.steps,
            "turn finished"
        );
        Ok(record)
    }
}

/// Owns all live sessions. One mutex per conversation keeps turns within a
/// conversation strictly ordered without blocking the others.
pub struct SessionManager {
    deps: SessionDeps,
    sessions: RwLock<HashMap<ConversationId, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch or create the session for a conversation.
    pub async fn session(&self, conversation: &ConversationId) -> Arc<Mutex<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(conversation) {
                return session.clone();
            }
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(conversation.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session::new(conversation.clone(), &self.deps)))
            })
            .clone()
    }

    /// Run one turn on the conversation's session.
    pub async fn take_turn(
        &self,
        conversation: &ConversationId,
        input: &str,
    ) -> Result<TurnRecord> {
        let session = self.session(conversation).await;
        let mut session = session.lock().await;
        session.take_turn(input).await
    }
}
