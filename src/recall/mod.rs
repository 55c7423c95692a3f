//! Recall coordinator: turns a prompt into a ranked, decayed set of
//! memories. Strategy selection follows the same match-on-enum dispatch
//! this codebase's hybrid search uses to pick between keyword, semantic,
//! and combined search; here the strategies are entity-anchored,
//! time-anchored, full-text, or an automatic choice between them.

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;

use crate::config::EngineConfig;
use crate::decay::temporal_score;
use crate::error::Result;
use crate::extract;
use crate::rank::{self, RankedMemory};
use crate::storage::connection::StoragePool;
use crate::storage::entity_store::{entity_ids_for_memory, find_entity};
use crate::storage::store::{get_project_last_activity, query_candidates, touch};
use crate::types::{EntityId, Memory, MemoryFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Entity,
    Temporal,
    FullText,
    Auto,
}

#[derive(Debug, Clone)]
pub struct RecallRequest {
    pub prompt: String,
    pub limit: usize,
    pub strategy: Strategy,
    pub min_relevance: Option<f32>,
}

impl Default for RecallRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            limit: 10,
            strategy: Strategy::Auto,
            min_relevance: None,
        }
    }
}

fn entity_candidates(pool: &StoragePool, prompt_entity_ids: &[EntityId]) -> Result<Vec<Memory>> {
    let filter = MemoryFilter {
        entity_ids: prompt_entity_ids.to_vec(),
        ..Default::default()
    };
    query_candidates(pool, &filter, Utc::now())
}

fn fulltext_candidates(pool: &StoragePool, prompt: &str) -> Result<Vec<Memory>> {
    let filter = MemoryFilter {
        content_like: Some(prompt.to_string()),
        limit: Some(200),
        ..Default::default()
    };
    query_candidates(pool, &filter, Utc::now())
}

/// `Auto` is the union of `Entity` and `FullText`, deduplicated by id
/// (SPEC_FULL.md §4.6) — not a choice between the two. `Temporal` is never
/// auto-selected; it stays opt-in since "most recent" is rarely what a bare
/// prompt means.
fn gather_candidates(pool: &StoragePool, strategy: Strategy, prompt_entity_ids: &[EntityId], prompt: &str) -> Result<Vec<Memory>> {
    match strategy {
        Strategy::Entity => entity_candidates(pool, prompt_entity_ids),
        Strategy::Temporal => {
            let filter = MemoryFilter {
                limit: Some(200),
                ..Default::default()
            };
            query_candidates(pool, &filter, Utc::now())
        }
        Strategy::FullText => fulltext_candidates(pool, prompt),
        Strategy::Auto => {
            let mut seen = HashSet::new();
            let mut union = Vec::new();
            if !prompt_entity_ids.is_empty() {
                for memory in entity_candidates(pool, prompt_entity_ids)? {
                    if seen.insert(memory.id) {
                        union.push(memory);
                    }
                }
            }
            for memory in fulltext_candidates(pool, prompt)? {
                if seen.insert(memory.id) {
                    union.push(memory);
                }
            }
            Ok(union)
        }
    }
}

/// What `recall` produced, and whether it ran to completion or was cut off
/// by `deadline`. `memories` holds whatever was scored before the cutoff —
/// the caller (`Engine::attach_memories`) discards it in favor of the
/// verbatim-prompt timeout context on `timed_out`, but the pipeline itself
/// stops doing work the moment the budget is spent rather than running to
/// completion and only checking afterward.
pub struct RecallOutcome {
    pub memories: Vec<RankedMemory>,
    pub timed_out: bool,
}

/// Runs the full recall pipeline: entity-lift the prompt, gather candidates
/// with the resolved strategy, score each with the ranker, sort and
/// truncate to `request.limit`, then best-effort `touch` every returned
/// memory. A `touch` failure is logged and ignored — recall must not fail
/// because its side-effect bookkeeping did.
///
/// `deadline` is observed at every suspension point (entity lookup,
/// candidate gather, and once per candidate in the scoring loop — the same
/// points SPEC_FULL.md §5 names as where a cooperative cancellation check
/// belongs) so a deadline that has already passed stops the pipeline
/// immediately instead of letting it run to completion before the caller
/// notices.
pub fn recall(pool: &StoragePool, config: &EngineConfig, request: &RecallRequest, deadline: Instant) -> Result<RecallOutcome> {
    let now = Utc::now();
    let timed_out = |memories: Vec<RankedMemory>| RecallOutcome { memories, timed_out: true };

    let prompt_entities = extract::extract(&request.prompt);
    let prompt_entity_ids: Vec<EntityId> = pool.with_connection(|conn| {
        let mut ids = Vec::new();
        for entity_ref in &prompt_entities {
            if let Some(entity) = find_entity(conn, &entity_ref.normalized_name, entity_ref.entity_type)? {
                ids.push(entity.id);
            }
        }
        Ok(ids)
    })?;
    if Instant::now() >= deadline {
        return Ok(timed_out(Vec::new()));
    }

    let candidates = gather_candidates(pool, request.strategy, &prompt_entity_ids, &request.prompt)?;
    if Instant::now() >= deadline {
        return Ok(timed_out(Vec::new()));
    }

    let project_last_activity = config
        .decay
        .project_last_activity
        .or(get_project_last_activity(pool)?);

    let prompt_entity_set: HashSet<EntityId> = prompt_entity_ids.into_iter().collect();
    let prompt_keywords: HashSet<String> = crate::classify::classify(&request.prompt)
        .keywords
        .into_iter()
        .collect();

    let mut ranked = Vec::with_capacity(candidates.len());
    for memory in candidates {
        if Instant::now() >= deadline {
            return Ok(timed_out(ranked));
        }

        let memory_entity_ids: HashSet<EntityId> = pool
            .with_connection(|conn| entity_ids_for_memory(conn, memory.id))?
            .into_iter()
            .collect();
        let memory_keywords: HashSet<String> = crate::classify::classify(&memory.content).keywords.into_iter().collect();

        let relevance = rank::relevance(&prompt_entity_set, &memory_entity_ids, &prompt_keywords, &memory_keywords);
        let decay_explanation = temporal_score(memory.memory_type, memory.created_at, now, project_last_activity);
        let breakdown = rank::score_from_decay(relevance, memory.importance, &decay_explanation, memory.confidence, &config.ranker);

        ranked.push(RankedMemory { memory, breakdown });
    }

    if Instant::now() >= deadline {
        return Ok(timed_out(ranked));
    }

    let min_relevance = request.min_relevance.unwrap_or(config.ranker.min_relevance);
    let truncated = rank::sort_and_truncate(ranked, request.limit, min_relevance);

    for entry in &truncated {
        let _ = touch(pool, entry.memory.id, now);
    }

    Ok(RecallOutcome { memories: truncated, timed_out: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateMemory, MemoryType, UpsertOutcome};
    use std::collections::HashMap;

    fn store_one(pool: &StoragePool, content: &str, memory_type: MemoryType) {
        let candidate = CandidateMemory {
            content: content.to_string(),
            memory_type,
            importance: 0.7,
            confidence: 0.9,
            source_type: "test".into(),
            agent_id: None,
            user_id: None,
            session_id: None,
            valid_to: None,
            metadata: HashMap::new(),
            entities: extract::extract(content),
        };
        crate::storage::store::upsert_memory(pool, candidate, Utc::now()).unwrap();
    }

    #[test]
    fn recall_returns_relevant_memories_above_threshold() {
        let pool = StoragePool::open_in_memory().unwrap();
        store_one(&pool, "We use Rust and PostgreSQL for the backend", MemoryType::Semantic);
        store_one(&pool, "The weather was nice yesterday", MemoryType::Episodic);

        let config = EngineConfig::new(":memory:");
        let request = RecallRequest {
            prompt: "What database do we use with Rust?".into(),
            limit: 5,
            strategy: Strategy::Auto,
            min_relevance: Some(0.0),
        };

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        let outcome = recall(&pool, &config, &request, deadline).unwrap();
        assert!(!outcome.timed_out);
        assert!(!outcome.memories.is_empty());
    }

    #[test]
    fn recall_stops_early_once_the_deadline_has_passed() {
        let pool = StoragePool::open_in_memory().unwrap();
        store_one(&pool, "We use Rust and PostgreSQL for the backend", MemoryType::Semantic);

        let config = EngineConfig::new(":memory:");
        let request = RecallRequest {
            prompt: "What database do we use with Rust?".into(),
            limit: 5,
            strategy: Strategy::Auto,
            min_relevance: Some(0.0),
        };

        let already_expired = Instant::now() - std::time::Duration::from_millis(1);
        let outcome = recall(&pool, &config, &request, already_expired).unwrap();
        assert!(outcome.timed_out);
    }

    #[test]
    fn auto_strategy_unions_entity_and_fulltext_candidates_deduplicated() {
        let pool = StoragePool::open_in_memory().unwrap();
        store_one(&pool, "We use Rust and PostgreSQL for the backend", MemoryType::Semantic);
        store_one(&pool, "Rust tooling notes for the deployment pipeline", MemoryType::Procedural);
        store_one(&pool, "The weather was nice yesterday", MemoryType::Episodic);

        let entity_ids = pool
            .with_connection(|conn| {
                let rust = find_entity(conn, "rust", crate::types::EntityType::Technology)?;
                Ok(rust.map(|e| vec![e.id]).unwrap_or_default())
            })
            .unwrap();

        let expected: HashSet<_> = entity_candidates(&pool, &entity_ids)
            .unwrap()
            .into_iter()
            .chain(fulltext_candidates(&pool, "Rust").unwrap())
            .map(|m| m.id)
            .collect();

        let union = gather_candidates(&pool, Strategy::Auto, &entity_ids, "Rust").unwrap();
        let mut union_ids: Vec<_> = union.iter().map(|m| m.id).collect();
        let unique_count = union_ids.len();
        union_ids.sort_unstable();
        union_ids.dedup();
        assert_eq!(union_ids.len(), unique_count, "auto strategy must not return duplicate ids");

        let actual: HashSet<_> = union.iter().map(|m| m.id).collect();
        assert_eq!(actual, expected, "auto strategy must be exactly entity ∪ fulltext");
        assert!(actual.len() >= 2);
    }
}
