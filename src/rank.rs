//! Ranking: combines relevance, importance, decay, and confidence into one
//! final score per candidate memory, with a per-component breakdown for
//! explainability.

use std::collections::HashSet;

use crate::config::RankerConfig;
use crate::decay::DecayExplanation;
use crate::types::{EntityId, Memory};

#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
    pub relevance: f32,
    pub importance: f32,
    pub decay: f32,
    pub confidence: f32,
    pub final_score: f32,
}

/// Entity-overlap and keyword-overlap relevance, per SPEC_FULL.md §4.8.
pub fn relevance(
    prompt_entity_ids: &HashSet<EntityId>,
    memory_entity_ids: &HashSet<EntityId>,
    prompt_keywords: &HashSet<String>,
    memory_keywords: &HashSet<String>,
) -> f32 {
    let entity_overlap = prompt_entity_ids.intersection(memory_entity_ids).count() as f32;
    let entity_term = entity_overlap / prompt_entity_ids.len().max(1) as f32;

    let keyword_overlap = prompt_keywords.intersection(memory_keywords).count() as f32;
    let keyword_term = 0.3 * keyword_overlap / prompt_keywords.len().max(1) as f32;

    (entity_term + keyword_term).clamp(0.0, 1.0)
}

/// Combines the four components into a final score. `decay` comes from
/// `decay::temporal_score(..).score`; the caller is responsible for scoring
/// decay before calling this.
pub fn score(
    relevance: f32,
    importance: f32,
    decay: f32,
    confidence: f32,
    weights: &RankerConfig,
) -> ScoreBreakdown {
    // effective_w_d = w_d * (1 - (1 - decay))^2 = w_d * decay^2; the decay
    // term then applies that weight to `decay` itself, so very old memories
    // (decay near the type's floor) contribute roughly w_d * decay^3 rather
    // than w_d * decay.
    let effective_w_d = weights.decay * decay.powi(2);
    let decay_term = effective_w_d * decay;

    let final_score = weights.relevance * relevance
        + weights.importance * importance
        + decay_term
        + weights.confidence * confidence;

    ScoreBreakdown {
        relevance,
        importance,
        decay,
        confidence,
        final_score: final_score.clamp(0.0, 1.0),
    }
}

/// A scored candidate, ready for top-K selection with the tie-break from
/// SPEC_FULL.md §4.6 (higher importance, then more recent, then smaller id).
#[derive(Debug, Clone)]
pub struct RankedMemory {
    pub memory: Memory,
    pub breakdown: ScoreBreakdown,
}

pub fn sort_and_truncate(mut ranked: Vec<RankedMemory>, limit: usize, min_relevance: f32) -> Vec<RankedMemory> {
    ranked.retain(|r| r.breakdown.final_score >= min_relevance);
    ranked.sort_by(|a, b| {
        b.breakdown
            .final_score
            .partial_cmp(&a.breakdown.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.memory
                    .importance
                    .partial_cmp(&a.memory.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
    ranked.truncate(limit);
    ranked
}

/// Convenience used by `recall` to go from a raw decay explanation straight
/// to a breakdown.
pub fn score_from_decay(
    relevance_value: f32,
    importance: f32,
    decay_explanation: &DecayExplanation,
    confidence: f32,
    weights: &RankerConfig,
) -> ScoreBreakdown {
    score(relevance_value, importance, decay_explanation.score, confidence, weights)
}
