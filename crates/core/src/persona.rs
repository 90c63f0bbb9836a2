//! Persona state: affinity score, relationship age, displayed emotion,
//! and the user-editable profile.
//!
//! The affinity score is the single behavioral dial of the agent. It is a
//! bounded integer mutated at most once per turn; every read of tone or
//! relationship depth derives from it through pure functions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Days-known thresholds for the relationship-depth bands. The band is the
/// index of the last threshold the day count has reached, so a band is held
/// until the next threshold passes.
pub const DAYS_THRESHOLDS: [u32; 10] = [1, 3, 7, 14, 30, 60, 90, 150, 200, 365];

/// A bounded per-turn affinity adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentDelta {
    StrongNegative,
    MildNegative,
    Neutral,
    MildPositive,
    StrongPositive,
}

impl SentimentDelta {
    pub fn value(self) -> i8 {
        match self {
            SentimentDelta::StrongNegative => -3,
            SentimentDelta::MildNegative => -1,
            SentimentDelta::Neutral => 0,
            SentimentDelta::MildPositive => 1,
            SentimentDelta::StrongPositive => 3,
        }
    }
}

/// The agent's displayed emotion, carried across turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Basic,
    Angry,
    Busy,
    Happy,
    Love,
    Pouting,
    Sad,
}

impl Emotion {
    /// Lenient parse for model output; anything unrecognized maps to Basic.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "angry" => Emotion::Angry,
            "busy" => Emotion::Busy,
            "happy" => Emotion::Happy,
            "love" => Emotion::Love,
            "pouting" => Emotion::Pouting,
            "sad" => Emotion::Sad,
            _ => Emotion::Basic,
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Emotion::Basic => "basic",
            Emotion::Angry => "angry",
            Emotion::Busy => "busy",
            Emotion::Happy => "happy",
            Emotion::Love => "love",
            Emotion::Pouting => "pouting",
            Emotion::Sad => "sad",
        };
        write!(f, "{s}")
    }
}

/// What the agent calls the user and how it frames the relationship.
/// Changed only on an explicit user request surfaced in the model reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// The persisted relationship state for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffinityState {
    /// 0..=100. Every mutation goes through [`AffinityState::apply`].
    pub score: u8,

    /// When the relationship started. Never moves.
    pub first_met: DateTime<Utc>,
}

impl AffinityState {
    pub fn new(score: u8) -> Self {
        Self {
            score: score.min(100),
            first_met: Utc::now(),
        }
    }

    /// Apply a delta with saturation at both bounds.
    pub fn apply(&mut self, delta: i8) -> u8 {
        let next = i16::from(self.score) + i16::from(delta);
        self.score = next.clamp(0, 100) as u8;
        self.score
    }

    /// Whole days since first contact, counting the first day as day 1.
    pub fn relationship_days(&self, now: DateTime<Utc>) -> u32 {
        let days = (now - self.first_met).num_days().max(0) as u32;
        days + 1
    }

    /// Score band 0..=9. Integer division by ten, so a score exactly on a
    /// boundary lands in the upper band; 90..=100 share the top band.
    pub fn score_band(&self) -> usize {
        (usize::from(self.score) / 10).min(9)
    }

    /// Days-known band 0..=9 against [`DAYS_THRESHOLDS`]: the index of the
    /// last threshold already reached. Day counts between thresholds stay
    /// in the lower band.
    pub fn days_band(&self, now: DateTime<Utc>) -> usize {
        let days = self.relationship_days(now);
        DAYS_THRESHOLDS
            .iter()
            .take_while(|&&t| days >= t)
            .count()
            .saturating_sub(1)
    }
}

impl Default for AffinityState {
    fn default() -> Self {
        Self::new(50)
    }
}
