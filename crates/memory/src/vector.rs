//! Vector similarity and blended retrieval scoring.
//!
//! Pure functions only. The blended score weights similarity far above
//! recency, so recency effectively acts as a tie-break between records the
//! query cannot distinguish.

use chrono::{DateTime, Utc};
use kindred_core::memory::MemoryRecord;

/// Similarity weight in the blended score. Recency gets the remainder.
pub const SIMILARITY_WEIGHT: f32 = 0.8;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal.
/// Returns 0.0 if either vector is zero-length or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Normalized recency in [0, 1] relative to a window: the newest record in
/// the window scores 1, the oldest 0. A degenerate window scores 1.
pub fn recency_score(
    created_at: DateTime<Utc>,
    oldest: DateTime<Utc>,
    newest: DateTime<Utc>,
) -> f32 {
    let span = (newest - oldest).num_milliseconds();
    if span <= 0 {
        return 1.0;
    }
    let offset = (created_at - oldest).num_milliseconds().clamp(0, span);
    offset as f32 / span as f32
}

/// Blend similarity and recency, similarity dominant.
pub fn blended_score(similarity: f32, recency: f32) -> f32 {
    SIMILARITY_WEIGHT * similarity + (1.0 - SIMILARITY_WEIGHT) * recency
}

/// Score candidates against an optional query embedding and sort them by
/// descending blended score. With no query embedding (retrieval degraded)
/// every similarity is zero and ranking collapses to pure recency.
///
/// Ties break by record id so identical inputs always rank identically.
pub fn rank(records: &mut Vec<MemoryRecord>, query_embedding: Option<&[f32]>) {
    if records.is_empty() {
        return;
    }
    let oldest = records.iter().map(|r| r.created_at).min().unwrap_or_else(Utc::now);
    let newest = records.iter().map(|r| r.created_at).max().unwrap_or_else(Utc::now);

    for record in records.iter_mut() {
        let similarity = match (query_embedding, record.embedding.as_deref()) {
            (Some(q), Some(e)) => cosine_similarity(q, e).max(0.0),
            _ => 0.0,
        };
        let recency = recency_score(record.created_at, oldest, newest);
        record.salience = blended_score(similarity, recency);
    }

    records.sort_by(|a, b| {
        b.salience
            .partial_cmp(&a.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kindred_core::conversation::{ConversationId, Speaker};
    use kindred_core::memory::MemoryTier;

    fn record(id: &str, embedding: Option<Vec<f32>>, age_mins: i64) -> MemoryRecord {
        MemoryRecord {
            id: id.into(),
            conversation: ConversationId::from("c1"),
            tier: MemoryTier::Long,
            speaker: Speaker::User,
            content: format!("content for {id}"),
            created_at: Utc::now() - Duration::minutes(age_mins),
            embedding,
            source_ids: vec![],
            salience: 0.0,
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_or_empty_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn similarity_dominates_recency() {
        let mut records = vec![
            record("old_relevant", Some(vec![1.0, 0.0]), 600),
            record("new_irrelevant", Some(vec![0.0, 1.0]), 1),
        ];
        rank(&mut records, Some(&[1.0, 0.0]));
        assert_eq!(records[0].id, "old_relevant");
    }

    #[test]
    fn recency_breaks_similarity_ties() {
        let mut records = vec![
            record("older", Some(vec![1.0, 0.0]), 100),
            record("newer", Some(vec![1.0, 0.0]), 1),
        ];
        rank(&mut records, Some(&[1.0, 0.0]));
        assert_eq!(records[0].id, "newer");
    }

    #[test]
    fn no_query_embedding_means_recency_order() {
        let mut records = vec![
            record("old", Some(vec![1.0, 0.0]), 100),
            record("new", None, 1),
        ];
        rank(&mut records, None);
        assert_eq!(records[0].id, "new");
        assert_eq!(records[1].id, "old");
    }

    #[test]
    fn ranking_is_deterministic() {
        let make = || {
            vec![
                record("a", Some(vec![0.5, 0.5]), 10),
                record("b", Some(vec![0.5, 0.5]), 10),
            ]
        };
        let mut first = make();
        let mut second = make();
        // Same created_at spread is not guaranteed between the two builds,
        // so copy timestamps across.
        second[0].created_at = first[0].created_at;
        second[1].created_at = first[1].created_at;
        rank(&mut first, Some(&[1.0, 0.0]));
        rank(&mut second, Some(&[1.0, 0.0]));
        let ids_a: Vec<_> = first.iter().map(|r| r.id.clone()).collect();
        let ids_b: Vec<_> = second.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
