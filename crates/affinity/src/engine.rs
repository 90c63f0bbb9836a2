//! The affinity engine: sentiment cues in, bounded score delta out.
//!
//! The classifier is a trait so the lexical default can be swapped for a
//! model-backed one. A classifier failure is never a turn failure; the
//! engine logs it and applies a zero delta.

use kindred_core::error::AffinityError;
use kindred_core::persona::{AffinityState, SentimentDelta};
use tracing::{debug, warn};

/// Maps one user utterance to a sentiment delta.
pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, utterance: &str) -> Result<SentimentDelta, AffinityError>;
}

/// Keyword-cue classifier. Deterministic, no I/O, case-insensitive.
///
/// Mixed signals (both positive and negative cues present) read as neutral
/// rather than guessing a direction.
pub struct LexicalClassifier;

const STRONG_POSITIVE: &[&str] = &[
    "thank you so much",
    "you're the best",
    "you are the best",
    "i love you",
    "love talking to you",
    "amazing",
    "lifesaver",
];

const MILD_POSITIVE: &[&str] = &[
    "thanks",
    "thank you",
    "nice",
    "great",
    "awesome",
    "well done",
    "good job",
    "appreciate",
    "helpful",
];

const STRONG_NEGATIVE: &[&str] = &[
    "i hate you",
    "shut up",
    "you're useless",
    "you are useless",
    "worst",
    "stupid bot",
];

const MILD_NEGATIVE: &[&str] = &[
    "annoying",
    "boring",
    "disappointing",
    "useless",
    "not helpful",
    "whatever",
];

fn contains_any(text: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| text.contains(cue))
}

impl SentimentClassifier for LexicalClassifier {
    fn classify(&self, utterance: &str) -> Result<SentimentDelta, AffinityError> {
        let text = utterance.to_lowercase();
        if text.trim().is_empty() {
            return Err(AffinityError::ClassificationUnavailable(
                "empty utterance".into(),
            ));
        }

        let strong_pos = contains_any(&text, STRONG_POSITIVE);
        let strong_neg = contains_any(&text, STRONG_NEGATIVE);
        let mild_pos = contains_any(&text, MILD_POSITIVE);
        let mild_neg = contains_any(&text, MILD_NEGATIVE);

        let positive = strong_pos || mild_pos;
        let negative = strong_neg || mild_neg;

        Ok(match (positive, negative) {
            (true, true) | (false, false) => SentimentDelta::Neutral,
            (true, false) if strong_pos => SentimentDelta::StrongPositive,
            (true, false) => SentimentDelta::MildPositive,
            (false, true) if strong_neg => SentimentDelta::StrongNegative,
            (false, true) => SentimentDelta::MildNegative,
        })
    }
}

/// Applies classified sentiment to the affinity score, once per turn.
pub struct AffinityEngine {
    classifier: Box<dyn SentimentClassifier>,
}

impl AffinityEngine {
    pub fn new() -> Self {
        Self {
            classifier: Box::new(LexicalClassifier),
        }
    }

    pub fn with_classifier(classifier: Box<dyn SentimentClassifier>) -> Self {
        Self { classifier }
    }

    /// Classify the utterance and mutate the score in place. Returns the
    /// applied delta. Classification failure degrades to a zero delta.
    pub fn update(&self, state: &mut AffinityState, utterance: &str) -> SentimentDelta {
        let delta = match self.classifier.classify(utterance) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "sentiment classification unavailable, applying zero delta");
                SentimentDelta::Neutral
            }
        };
        let before = state.score;
        state.apply(delta.value());
        debug!(
            before,
            after = state.score,
            delta = delta.value(),
            "affinity updated"
        );
        delta
    }
}

impl Default for AffinityEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingClassifier;

    impl SentimentClassifier for FailingClassifier {
        fn classify(&self, _utterance: &str) -> Result<SentimentDelta, AffinityError> {
            Err(AffinityError::ClassificationUnavailable("down".into()))
        }
    }

    #[test]
    fn gratitude_bumps_score_without_tier_jump() {
        let engine = AffinityEngine::new();
        let mut state = AffinityState::new(45);
        let band_before = state.score_band();

        let delta = engine.update(&mut state, "thank you so much, that helped!");
        assert_eq!(delta, SentimentDelta::StrongPositive);
        assert_eq!(state.score, 48);
        assert_eq!(state.score_band(), band_before);
    }

    #[test]
    fn hostility_lowers_score() {
        let engine = AffinityEngine::new();
        let mut state = AffinityState::new(50);
        let delta = engine.update(&mut state, "honestly you are useless, shut up");
        assert_eq!(delta, SentimentDelta::StrongNegative);
        assert_eq!(state.score, 47);
    }

    #[test]
    fn mixed_signals_read_neutral() {
        let engine = AffinityEngine::new();
        let mut state = AffinityState::new(50);
        let delta = engine.update(&mut state, "thanks, but that was disappointing");
        assert_eq!(delta, SentimentDelta::Neutral);
        assert_eq!(state.score, 50);
    }

    #[test]
    fn classifier_failure_is_zero_delta() {
        let engine = AffinityEngine::with_classifier(Box::new(FailingClassifier));
        let mut state = AffinityState::new(50);
        let delta = engine.update(&mut state, "anything");
        assert_eq!(delta, SentimentDelta::Neutral);
        assert_eq!(state.score, 50);
    }

    #[test]
    fn score_saturates_at_bounds() {
        let engine = AffinityEngine::new();
        let mut state = AffinityState::new(99);
        engine.update(&mut state, "thank you so much!!");
        assert_eq!(state.score, 100);

        let mut low = AffinityState::new(1);
        engine.update(&mut low, "i hate you");
        assert_eq!(low.score, 0);
    }

    #[test]
    fn neutral_question_leaves_score_alone() {
        let engine = AffinityEngine::new();
        let mut state = AffinityState::new(33);
        engine.update(&mut state, "what's the weather tomorrow?");
        assert_eq!(state.score, 33);
    }
}
