//! Observability: aggregates per-component counters into one diagnostics
//! snapshot, the shape an external doctor tool polls.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::queue::TaskState;
use crate::storage::connection::StorageStats;

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    pub enqueued_total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryCounts {
    pub total_active: i64,
    pub by_type: std::collections::HashMap<String, i64>,
    pub pending_expiry: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub storage: StorageStats,
    pub queue: QueueStats,
    pub recall_cache: CacheStats,
    pub entity_cache: CacheStats,
    pub memories: MemoryCounts,
}

/// Human-readable summary of a queue task's terminal state, for export and
/// for logs — callers outside this crate never need `TaskState` itself.
pub fn task_state_label(state: &TaskState) -> &'static str {
    match state {
        TaskState::Queued => "queued",
        TaskState::Running => "running",
        TaskState::Completed => "completed",
        TaskState::FailedRetryable => "failed_retryable",
        TaskState::FailedPermanent => "failed_permanent",
        TaskState::Expired => "expired",
        TaskState::Cancelled => "cancelled",
    }
}
