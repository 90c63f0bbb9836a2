//! Error types for the Kindred domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; recoverable conditions
//! (classification unavailable, retrieval unavailable) degrade at the call
//! site instead of aborting the turn.

use thiserror::Error;

/// The top-level error type for all Kindred operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Affinity errors ---
    #[error("Affinity error: {0}")]
    Affinity(#[from] AffinityError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Model invocation errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Prompt assembly errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum AffinityError {
    /// The sentiment classifier could not run. Callers treat this as a
    /// zero delta for the turn, never as a failed turn.
    #[error("Sentiment classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("Affinity state storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    /// Similarity search could not run (embedder down, index unreachable).
    /// Callers degrade to recency-only retrieval.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool invocation failed: {tool_name} — {reason}")]
    InvocationFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    /// No confirmation decision arrived within the window. Treated
    /// identically to an explicit refusal.
    #[error("Confirmation timed out for sensitive tool: {tool_name}")]
    ConfirmationTimeout { tool_name: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum ContextError {
    /// The mandatory sections alone do not fit the token budget. There is
    /// nothing left to drop, so assembly cannot proceed.
    #[error("Token budget exceeded: mandatory sections need {required} of {budget} tokens")]
    BudgetExceeded { required: usize, budget: usize },
}
