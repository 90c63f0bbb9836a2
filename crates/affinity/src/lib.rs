//! # Kindred Affinity
//!
//! The relationship dial: a bounded 0..=100 score per conversation, a
//! sentiment classifier that nudges it once per turn, and the static tier
//! tables that turn score and days-known into a persona guideline.

pub mod engine;
pub mod guideline;
pub mod store;

pub use engine::{AffinityEngine, LexicalClassifier, SentimentClassifier};
pub use guideline::{style, PersonaStyle, DEPTH_STEPS, TONE_STEPS};
pub use store::{
    AffinityStore, FileAffinityStore, InMemoryAffinityStore, RelationshipSnapshot,
};
