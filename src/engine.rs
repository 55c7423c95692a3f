//! The public facade. Two operations carry the engine's contract —
//! `generate_memories` (write path) and `attach_memories` (read path) — plus
//! the surrounding lifecycle and diagnostics operations from SPEC_FULL.md
//! §6.

use std::io::{BufRead, Write as _};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cache::{recall_cache_key, EngineCaches};
use crate::classify::classify;
use crate::config::EngineConfig;
use crate::context::{build_context, timeout_context, ContextFormat, MemoryContext};
use crate::decay::params_for;
use crate::error::{EngineError, Result};
use crate::extract;
use crate::queue::{LearnQueue, TaskId, TaskStatus};
use crate::recall::{self, RecallRequest, Strategy};
use crate::stats::{EngineStats, MemoryCounts, QueueStats};
use crate::storage::connection::StoragePool;
use crate::storage::entity_store::mentions_for_memory;
use crate::storage::store;
use crate::types::{CandidateMemory, Memory, MemoryFilter, UpsertOutcome};

const MAX_CONTENT_CHARS: usize = 100_000;
const GENERATION_SYNC_HARD_CEILING: Duration = Duration::from_secs(2);

pub struct Engine {
    pool: Arc<StoragePool>,
    config: EngineConfig,
    queue: Arc<LearnQueue>,
    caches: EngineCaches<MemoryContext, (), ()>,
}

impl Engine {
    /// `init(db_path, config)`: opens (or creates) the store, running
    /// migrations, and validates the config before anything else touches it.
    #[instrument(skip(config))]
    pub fn init(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(StoragePool::open(&config)?);
        let queue = Arc::new(LearnQueue::new(config.async_queue.clone()));
        Ok(Self {
            pool,
            config,
            queue,
            caches: EngineCaches::new(),
        })
    }

    pub fn init_in_memory(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(StoragePool::open_in_memory()?);
        let queue = Arc::new(LearnQueue::new(config.async_queue.clone()));
        Ok(Self {
            pool,
            config,
            queue,
            caches: EngineCaches::new(),
        })
    }

    /// Spawns the background learn-queue worker. Call once per process on a
    /// `tokio` runtime; the returned handle never completes on its own.
    pub fn spawn_worker(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let pool = self.pool.clone();
        tokio::spawn(async move {
            queue
                .run(move |candidate| {
                    let pool = pool.clone();
                    async move { store::upsert_memory(&pool, candidate, Utc::now()).map(|_| ()) }
                })
                .await;
        })
    }

    /// `generate_memories`: classify, extract, and either persist inline
    /// (`sync = true`) or hand off to the learn queue (`sync = false`).
    #[instrument(skip(self, content))]
    pub fn generate_memories(
        &self,
        content: &str,
        source_type: &str,
        agent_id: Option<String>,
        session_id: Option<String>,
        sync: bool,
    ) -> Result<GenerateOutcome> {
        if content.trim().is_empty() {
            return Err(EngineError::InvalidInput("content must not be empty".into()));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(EngineError::InvalidInput(format!(
                "content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }

        let classification = classify(content);
        if classification.confidence < 0.6 {
            return Ok(GenerateOutcome::Rejected);
        }

        let entities = extract::extract(content);
        let importance = classification.memory_type.default_importance();
        let decay_params = params_for(classification.memory_type);
        let valid_to = self
            .config
            .retention
            .custom_retention
            .get(classification.memory_type.as_str())
            .cloned()
            .unwrap_or_else(|| Some(decay_params.half_life_days.round() as u64 * 4))
            .map(|days| Utc::now() + chrono::Duration::days(days as i64));

        let candidate = CandidateMemory {
            content: content.to_string(),
            memory_type: classification.memory_type,
            importance,
            confidence: classification.confidence,
            source_type: source_type.to_string(),
            agent_id,
            user_id: None,
            session_id,
            valid_to,
            metadata: Default::default(),
            entities,
        };

        if sync {
            let started = Instant::now();
            let outcome = store::upsert_memory(&self.pool, candidate, Utc::now());
            if started.elapsed() > GENERATION_SYNC_HARD_CEILING {
                return Err(EngineError::Timeout);
            }
            self.caches.invalidate_recall();
            match outcome? {
                UpsertOutcome::Stored(memory) => Ok(GenerateOutcome::Stored(vec![memory])),
                UpsertOutcome::Duplicate(id) => Ok(GenerateOutcome::Duplicate(id)),
            }
        } else {
            match self.queue.enqueue(candidate) {
                Ok(task_id) => Ok(GenerateOutcome::Enqueued(task_id)),
                Err(EngineError::QueueFull(capacity)) => Err(EngineError::QueueFull(capacity)),
                Err(other) => Err(other),
            }
        }
    }

    /// `attach_memories`: runs the recall coordinator under the
    /// `query_timeout_ms` soft deadline and formats the result.
    #[instrument(skip(self, prompt))]
    pub fn attach_memories(
        &self,
        prompt: &str,
        limit: usize,
        min_importance: f32,
        strategy: Strategy,
        format: ContextFormat,
    ) -> Result<MemoryContext> {
        if prompt.trim().is_empty() {
            return Err(EngineError::InvalidInput("prompt must not be empty".into()));
        }

        let cache_key = recall_cache_key(prompt, limit, min_importance, &format!("{strategy:?}"), &format!("{format:?}"));
        if let Some(cached) = self.caches.recall.get(&cache_key) {
            return Ok(cached);
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.performance.query_timeout_ms);

        let request = RecallRequest {
            prompt: prompt.to_string(),
            limit,
            strategy,
            min_relevance: Some(min_importance),
        };

        let outcome = recall::recall(&self.pool, &self.config, &request, deadline)?;
        if outcome.timed_out {
            return Ok(timeout_context(prompt));
        }

        let context = build_context(prompt, &outcome.memories, format, 8000);
        self.caches.recall.insert(cache_key, context.clone());
        Ok(context)
    }

    pub fn query_memories(&self, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        store::query_candidates(&self.pool, filter, Utc::now())
    }

    #[instrument(skip(self))]
    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            storage: self.pool.stats(),
            queue: QueueStats {
                depth: self.queue.depth(),
                enqueued_total: self.queue.enqueued_total(),
            },
            recall_cache: self.caches.recall.stats(),
            entity_cache: self.caches.entity_normalization.stats(),
            memories: self.memory_counts()?,
        })
    }

    fn memory_counts(&self) -> Result<MemoryCounts> {
        store::memory_counts(&self.pool, Utc::now())
    }

    /// `cleanup(policy)`: runs a retention sweep. The only policy today is
    /// "sweep everything past `valid_to`"; `batch_size` bounds per-call work.
    pub fn cleanup(&self, batch_size: usize) -> Result<usize> {
        let deleted = store::retention_sweep(&self.pool, batch_size, Utc::now())?;
        if deleted > 0 {
            self.caches.invalidate_recall();
        }
        Ok(deleted)
    }

    /// Writes every active memory as newline-delimited JSON, each line
    /// carrying the memory's fields plus its MENTIONS.
    pub fn export(&self, writer: &mut impl Write) -> Result<usize> {
        let memories = store::query_candidates(&self.pool, &MemoryFilter::default(), Utc::now())?;
        let mut count = 0;
        for memory in memories {
            let mentions = self.pool.with_connection(|conn| mentions_for_memory(conn, memory.id))?;
            let record = ExportRecord { memory, mentions };
            let line = serde_json::to_string(&record)?;
            writeln!(writer, "{line}").map_err(EngineError::Io)?;
            count += 1;
        }
        Ok(count)
    }

    /// Reads newline-delimited export records and restores each memory with
    /// its original fields intact (`store::restore_memory`, not
    /// `generate_memories`) so a round trip doesn't silently rewrite
    /// timestamps or access counts. `memory_type` is read as a loose string
    /// so a legacy document's old type names (`IDENTITY`, `DECISION`, …)
    /// resolve through `legacy_alias::resolve` instead of failing to parse;
    /// this store's own exports already use the six canonical names, which
    /// `resolve` passes through unchanged.
    pub fn import(&self, reader: impl BufRead) -> Result<usize> {
        let mut count = 0;
        for line in reader.lines() {
            let line = line.map_err(EngineError::Io)?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ImportRecord = serde_json::from_str(&line)?;
            let memory_type = crate::legacy_alias::resolve(&record.memory.memory_type).ok_or_else(|| {
                EngineError::InvalidInput(format!("unknown memory_type: {}", record.memory.memory_type))
            })?;
            let memory = Memory {
                id: record.memory.id,
                content: record.memory.content,
                content_hash: record.memory.content_hash,
                memory_type,
                importance: record.memory.importance,
                confidence: record.memory.confidence,
                created_at: record.memory.created_at,
                valid_from: record.memory.valid_from,
                valid_to: record.memory.valid_to,
                accessed_at: record.memory.accessed_at,
                access_count: record.memory.access_count,
                source_type: record.memory.source_type,
                agent_id: record.memory.agent_id,
                user_id: record.memory.user_id,
                session_id: record.memory.session_id,
                metadata: record.memory.metadata,
            };
            store::restore_memory(&self.pool, &memory, Utc::now())?;
            count += 1;
        }
        self.caches.invalidate_recall();
        Ok(count)
    }

    pub fn queue_status(&self) -> QueueStats {
        QueueStats {
            depth: self.queue.depth(),
            enqueued_total: self.queue.enqueued_total(),
        }
    }

    pub fn task_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.queue.status(task_id)
    }

    pub fn cancel_task(&self, task_id: TaskId) {
        self.queue.cancel(task_id)
    }
}

#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    Stored(Vec<Memory>),
    Duplicate(i64),
    Enqueued(TaskId),
    Rejected,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportRecord {
    memory: Memory,
    mentions: Vec<crate::types::Mention>,
}

/// Mirrors `ExportRecord`'s wire shape but reads `memory_type` as a bare
/// string instead of the closed `MemoryType` enum, so legacy documents that
/// predate the six canonical type names still deserialize; `legacy_alias`
/// resolves the string afterward.
#[derive(Debug, Deserialize)]
struct ImportMemory {
    id: crate::types::MemoryId,
    content: String,
    content_hash: String,
    memory_type: String,
    importance: f32,
    confidence: f32,
    created_at: chrono::DateTime<Utc>,
    valid_from: chrono::DateTime<Utc>,
    valid_to: Option<chrono::DateTime<Utc>>,
    accessed_at: chrono::DateTime<Utc>,
    access_count: i64,
    source_type: String,
    agent_id: Option<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ImportRecord {
    memory: ImportMemory,
    #[allow(dead_code)]
    #[serde(default)]
    mentions: Vec<crate::types::Mention>,
}
