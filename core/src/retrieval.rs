//! Reciprocal-rank fusion and the additive relevance boosts layered on top
//! of it. Pure functions over id lists and small per-candidate inputs so
//! the ranking math is testable without a database: the three token-pattern
//! queries (exact phrase, proximity window, any-of) live in the storage
//! layer and hand their ranked id lists here.

use std::collections::HashMap;

pub const OUTCOME_BOOST: f64 = 0.05;
pub const FREQUENCY_BOOST: f64 = 0.02;
const RECENCY_WINDOW_DAYS: f64 = 30.0;

/// Per-candidate facts the fusion step needs beyond its rank: how old it is,
/// how it has performed historically, and how often it has been used.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalInput {
    pub id: i64,
    pub age_days: f64,
    pub outcome_score: Option<f64>,
    pub usage_count: i64,
}

/// A scored row, decomposed so callers (and UIs) can see what produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub id: i64,
    pub relevance: f64,
    pub bm25_score: f64,
    pub recency_score: f64,
}

/// `max(0, 1 - ageDays / 30)`. Items older than the window contribute zero
/// regardless of `recency_weight`.
pub fn recency_score(age_days: f64) -> f64 {
    (1.0 - age_days / RECENCY_WINDOW_DAYS).max(0.0)
}

/// Reciprocal rank fusion over any number of ranked id lists (1-indexed
/// internally). `k` is the standard RRF damping constant; 60 is the usual
/// default and works well for small per-query result sets.
pub fn reciprocal_rank_fusion(rank_lists: &[Vec<i64>], k: f64) -> HashMap<i64, f64> {
    let mut scores: HashMap<i64, f64> = HashMap::new();
    for list in rank_lists {
        for (idx, id) in list.iter().enumerate() {
            let rank = (idx + 1) as f64;
            *scores.entry(*id).or_insert(0.0) += 1.0 / (k + rank);
        }
    }
    scores
}

/// Normalizes raw RRF scores into `[0, 1]` by dividing by the maximum.
/// An empty or all-zero input returns every candidate at zero rather than
/// dividing by zero.
pub fn normalize_rrf(scores: HashMap<i64, f64>) -> HashMap<i64, f64> {
    let max = scores.values().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return scores.into_iter().map(|(id, _)| (id, 0.0)).collect();
    }
    scores.into_iter().map(|(id, v)| (id, v / max)).collect()
}

/// Small, strictly decreasing bonus for the top few fused ranks, per the
/// spec's "0.05/0.02/…" example. Bounded so it can never dominate relevance.
pub fn position_bonus(rank: usize) -> f64 {
    match rank {
        0 => 0.05,
        1 => 0.02,
        2 => 0.01,
        _ => 0.0,
    }
}

/// Additive relevance per §4.9. `rank` is 0-indexed position in the fused
/// RRF ordering (used only for `position_bonus`).
pub fn relevance(
    rrf_normalized: f64,
    recency_weight: f64,
    recency_score: f64,
    outcome_score: Option<f64>,
    usage_count: i64,
    rank: usize,
) -> f64 {
    rrf_normalized
        + recency_weight * recency_score
        + OUTCOME_BOOST * outcome_score.unwrap_or(0.0).max(0.0)
        + FREQUENCY_BOOST * (1.0 + usage_count as f64).ln()
        + position_bonus(rank)
}

/// Fuses the ranked lists, then scores every candidate present in `inputs`.
/// Candidates absent from every rank list (no id overlap at all) are
/// dropped rather than scored at zero relevance. Output is not sorted; the
/// caller sorts by `relevance` after joining back to full `Learning` rows.
pub fn fuse_and_score(rank_lists: &[Vec<i64>], k: f64, recency_weight: f64, inputs: &[RetrievalInput]) -> Vec<ScoredCandidate> {
    let raw = reciprocal_rank_fusion(rank_lists, k);
    let normalized = normalize_rrf(raw);

    let mut fused: Vec<(i64, f64)> = normalized.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let rank_of: HashMap<i64, usize> = fused.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();
    let scores_of: HashMap<i64, f64> = fused.into_iter().collect();

    inputs
        .iter()
        .filter_map(|input| {
            let rrf = *scores_of.get(&input.id)?;
            let rec = recency_score(input.age_days);
            let rank = *rank_of.get(&input.id).unwrap_or(&usize::MAX);
            Some(ScoredCandidate {
                id: input.id,
                relevance: relevance(rrf, recency_weight, rec, input.outcome_score, input.usage_count, rank),
                bm25_score: rrf,
                recency_score: rec,
            })
        })
        .collect()
}
