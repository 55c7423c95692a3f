//! End-to-end scenario tests driven through the public `Engine` facade.
//!
//! These cover the concrete scenarios and cross-cutting universal properties
//! from the memory engine's testable-properties section that genuinely need
//! a live store and, in a few cases, a running async runtime — the finer
//! grained invariants already live as unit tests alongside the modules that
//! own them.
//!
//! Run with: cargo test --test scenario_tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use memgraph::config::EngineConfig;
use memgraph::context::{ContextFormat, RecallReason};
use memgraph::engine::{Engine, GenerateOutcome};
use memgraph::recall::Strategy;
use memgraph::types::{CandidateMemory, MemoryFilter, MemoryType};

fn engine() -> Engine {
    Engine::init_in_memory(EngineConfig::new(":memory:")).unwrap()
}

/// S1. Dedup: the same fact reported from two different source types
/// collapses to one memory with `access_count = 2`.
#[test]
fn s1_dedup_collapses_to_one_memory_with_access_count_two() {
    let engine = engine();

    let first = engine
        .generate_memories("We use PostgreSQL", "docs", None, None, true)
        .unwrap();
    let id = match first {
        GenerateOutcome::Stored(memories) => memories[0].id,
        other => panic!("expected Stored, got {other:?}"),
    };

    let second = engine
        .generate_memories("we  use postgresql", "chat", None, None, true)
        .unwrap();
    assert!(matches!(second, GenerateOutcome::Duplicate(existing) if existing == id));

    let all = engine.query_memories(&MemoryFilter::default()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].access_count, 2);
}

/// S2. Type inference: an episodic-signal sentence is stored as Episodic and
/// surfaces the technology it names as an entity.
#[test]
fn s2_type_inference_tags_episodic_and_extracts_entity() {
    let engine = engine();
    let outcome = engine
        .generate_memories("Yesterday we decided to use FastAPI", "chat", None, None, true)
        .unwrap();

    let memory = match outcome {
        GenerateOutcome::Stored(memories) => memories[0].clone(),
        other => panic!("expected Stored, got {other:?}"),
    };
    assert_eq!(memory.memory_type, MemoryType::Episodic);

    let recalled = engine
        .attach_memories("Did we pick FastAPI for the service?", 5, 0.0, Strategy::Entity, ContextFormat::Json)
        .unwrap();
    assert!(recalled.memories.iter().any(|m| m.memory_id == memory.id));
}

/// S6. Expired exclusion: a Working memory whose `valid_to` is already in
/// the past never comes back from `query_memories`, and a retention sweep
/// removes it.
#[test]
fn s6_expired_working_memory_excluded_then_swept() {
    let pool_backed = memgraph::storage::connection::StoragePool::open_in_memory().unwrap();
    let mut expired = CandidateMemory {
        content: "scratch note for right now".into(),
        memory_type: MemoryType::Working,
        importance: 0.5,
        confidence: 0.9,
        source_type: "test".into(),
        agent_id: None,
        user_id: None,
        session_id: None,
        valid_to: Some(Utc::now() - chrono::Duration::hours(1)),
        metadata: HashMap::new(),
        entities: Vec::new(),
    };
    expired.entities = memgraph::extract::extract(&expired.content);
    memgraph::storage::store::upsert_memory(&pool_backed, expired, Utc::now()).unwrap();

    let active = memgraph::storage::store::query_candidates(&pool_backed, &MemoryFilter::default(), Utc::now()).unwrap();
    assert!(active.is_empty());

    let deleted = memgraph::storage::store::retention_sweep(&pool_backed, 100, Utc::now()).unwrap();
    assert_eq!(deleted, 1);
}

/// S5 / Property 8. Async ordering: enqueuing learn tasks and immediately
/// recalling MAY miss them, but after the worker drains the queue they
/// become visible.
#[tokio::test]
async fn s5_async_enqueue_eventually_visible() {
    let engine = Arc::new(engine());
    engine.spawn_worker();

    for i in 0..10 {
        let content = format!("Yesterday we decided to use service number {i} for the deployment pipeline");
        engine
            .generate_memories(&content, "chat", None, None, false)
            .unwrap();
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let stored = engine.query_memories(&MemoryFilter::default()).unwrap();
        if stored.len() == 10 {
            break;
        }
        if std::time::Instant::now() > deadline {
            panic!("background tasks did not become visible within 2s (saw {})", stored.len());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Property 4: `attach_memories` never returns more than `limit` memories,
/// every returned memory clears `min_relevance`, and every returned memory
/// is active.
#[test]
fn property_attach_memories_respects_limit_and_min_relevance() {
    let engine = engine();
    for i in 0..20 {
        engine
            .generate_memories(
                &format!("Yesterday we decided to use Rust for service number {i}"),
                "chat",
                None,
                None,
                true,
            )
            .unwrap();
    }

    let ctx = engine
        .attach_memories("Did we decide to use Rust for our services?", 5, 0.4, Strategy::Auto, ContextFormat::Plain)
        .unwrap();

    assert!(ctx.memories.len() <= 5);
    for m in &ctx.memories {
        assert!(m.final_score >= 0.4);
    }
}

/// Property 5: a retention sweep never deletes a memory whose `valid_to` is
/// `None`, no matter how far `now` is advanced.
#[test]
fn property_retention_sweep_never_deletes_permanent_memories() {
    let engine = engine();
    engine
        .generate_memories("My name is Priya and I lead the platform team", "docs", None, None, true)
        .unwrap();

    let deleted = engine.cleanup(1000).unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(engine.query_memories(&MemoryFilter::default()).unwrap().len(), 1);
}

/// S4. Recall budget: with an impossibly tight `query_timeout_ms`, an
/// `attach_memories` call takes its `metadata.reason = Timeout` path rather
/// than erroring, and the prompt comes back unmodified.
#[test]
fn s4_recall_timeout_echoes_prompt_and_flags_reason() {
    let mut config = EngineConfig::new(":memory:");
    config.performance.query_timeout_ms = 0;
    let engine = Engine::init_in_memory(config).unwrap();
    engine
        .generate_memories("Yesterday we decided to use Rust for the backend", "chat", None, None, true)
        .unwrap();

    let ctx = engine
        .attach_memories("What did we decide?", 5, 0.0, Strategy::Auto, ContextFormat::Markdown)
        .unwrap();

    assert_eq!(ctx.metadata.reason, RecallReason::Timeout);
    assert_eq!(ctx.enhanced_prompt, "What did we decide?");
}

/// Property 7: exporting then importing into an empty store reproduces the
/// same set of active memories.
#[test]
fn property_export_import_round_trips_active_memories() {
    let source = engine();
    source
        .generate_memories("We decided to use PostgreSQL and Rust for the backend", "docs", None, None, true)
        .unwrap();
    source
        .generate_memories("I always prefer tabs over spaces", "chat", None, None, true)
        .unwrap();

    let mut buf = Vec::new();
    let exported = source.export(&mut buf).unwrap();
    assert_eq!(exported, 2);

    let target = engine();
    let imported = target.import(buf.as_slice()).unwrap();
    assert_eq!(imported, 2);

    let source_contents: std::collections::HashSet<String> = source
        .query_memories(&MemoryFilter::default())
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    let target_contents: std::collections::HashSet<String> = target
        .query_memories(&MemoryFilter::default())
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(source_contents, target_contents);
}
