//! # Kindred Core
//!
//! Domain types, traits, and error definitions for the Kindred companion
//! agent engine. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod conversation;
pub mod error;
pub mod memory;
pub mod model;
pub mod persona;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use conversation::{
    ConversationId, SectionStat, Speaker, ToolInvocation, TurnOutcome, TurnRecord, Utterance,
};
pub use error::{
    AffinityError, ContextError, Error, MemoryError, ModelError, Result, ToolError,
};
pub use memory::{Embedder, MemoryBackend, MemoryRecord, MemoryTier, Summarizer};
pub use model::{
    AgentReply, ChatMessage, EmbeddingRequest, EmbeddingResponse, MessageToolCall, ModelClient,
    ModelRequest, ModelResponse, Role, ToolDefinition, Usage,
};
pub use persona::{AffinityState, Emotion, SentimentDelta, UserProfile, DAYS_THRESHOLDS};
pub use tool::{RiskTier, Tool, ToolCall, ToolRegistry, ToolResult};
