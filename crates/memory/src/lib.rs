//! # Kindred Memory
//!
//! Tiered conversational memory: a short-term tier of exact utterances and
//! a long-term tier of summarized, embedded records. The store ranks across
//! both tiers with a similarity-dominant blended score, fills a token
//! budget greedily, and promotes the oldest short-term run into a summary
//! without ever losing data.

pub mod archiver;
pub mod embed;
pub mod file_backend;
pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod summarize;
pub mod vector;

pub use archiver::MemoryArchiver;
pub use embed::{HashEmbedder, ModelEmbedder};
pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use store::{MemoryConfig, MemoryStore};
pub use summarize::{ExtractiveSummarizer, ModelSummarizer};
