//! Model client implementations for Kindred.
//!
//! All clients implement `kindred_core::ModelClient`. The engine is wired
//! against the trait, so an OpenAI-compatible endpoint, a local Ollama, and
//! the scripted mocks are interchangeable.

pub mod mock;
pub mod openai_compat;

pub use mock::{CannedClient, FailingClient, SequentialClient};
pub use openai_compat::OpenAiCompatClient;
