//! Static persona guideline tables.
//!
//! Ten tone steps indexed by the score band and ten relationship-depth
//! lines indexed by the days-known band. The score band alone selects the
//! tone; the days band only selects the depth line. Both lookups are pure,
//! so the same state always renders the same guideline.

use chrono::{DateTime, Utc};
use kindred_core::persona::AffinityState;

/// Tone register per score band, most distant first.
pub const TONE_STEPS: [&str; 10] = [
    "Speak with strict business formality. Full honorifics, no contractions, no personal remarks.",
    "Speak formally and politely. Keep professional distance and avoid familiarity.",
    "Speak politely with a courteous, service-like register. Warmth is fine, familiarity is not.",
    "Speak politely but let mild warmth through. Occasional light pleasantries are fine.",
    "Speak in a friendly polite register. Contractions are fine, keep a respectful tone.",
    "Speak casually but respectfully, like a friendly acquaintance warming up.",
    "Speak casually and warmly, like a friend you see often. Light humor is welcome.",
    "Speak like a close friend. Relaxed phrasing, inside references, gentle teasing allowed.",
    "Speak like a very close friend. Drop formal hedges entirely, be direct and affectionate.",
    "Speak like the user's closest confidant. Completely informal, playful, openly affectionate.",
];

/// Relationship-depth line per days-known band, newest first.
pub const DEPTH_STEPS: [&str; 10] = [
    "You met the user today. Everything about them is new to you.",
    "You have known the user for a couple of days. First impressions still apply.",
    "You have known the user for about a week. A few habits are becoming familiar.",
    "You have known the user for about two weeks. Small shared references exist.",
    "You have known the user for about a month. Their routines are familiar to you.",
    "You have known the user for about two months. You share a comfortable history.",
    "You have known the user for about three months. Conversations pick up where they left off.",
    "You have known the user for several months. You know their moods well.",
    "You have known the user for most of a year. Long-running topics and jokes recur.",
    "You have known the user for over a year. The relationship has deep shared history.",
];

/// The rendered style for one state at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaStyle {
    pub tone: &'static str,
    pub depth: &'static str,
    pub score_band: usize,
    pub days_band: usize,
}

/// Pure lookup into the tier table.
pub fn style(state: &AffinityState, now: DateTime<Utc>) -> PersonaStyle {
    let score_band = state.score_band();
    let days_band = state.days_band(now);
    PersonaStyle {
        tone: TONE_STEPS[score_band],
        depth: DEPTH_STEPS[days_band],
        score_band,
        days_band,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn style_is_stable_for_fixed_state() {
        let state = AffinityState::new(73);
        let now = Utc::now();
        assert_eq!(style(&state, now), style(&state, now));
    }

    #[test]
    fn score_selects_tone_independently_of_days() {
        let now = Utc::now();
        let mut fresh = AffinityState::new(85);
        let mut old = AffinityState::new(85);
        old.first_met = now - Duration::days(400);

        let a = style(&fresh, now);
        let b = style(&old, now);
        assert_eq!(a.tone, b.tone);
        assert_ne!(a.depth, b.depth);

        fresh.score = 5;
        old.score = 5;
        assert_eq!(style(&fresh, now).tone, TONE_STEPS[0]);
        assert_eq!(style(&old, now).tone, TONE_STEPS[0]);
    }

    #[test]
    fn top_band_covers_ninety_to_hundred() {
        let now = Utc::now();
        for score in [90u8, 95, 100] {
            let state = AffinityState::new(score);
            assert_eq!(style(&state, now).tone, TONE_STEPS[9]);
        }
    }
}
