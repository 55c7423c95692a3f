//! Async learning queue: decouples `generate_memories` from the write path
//! so ingestion latency never blocks on classification, extraction, and
//! storage. Grounded on the bounded `async_channel` + `tokio::select!`
//! batch/timeout worker loop this codebase already uses for background
//! embedding work, generalized from one fixed stage to a retrying task
//! pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::interval;
use uuid::Uuid;

use crate::config::AsyncQueueConfig;
use crate::error::{EngineError, Result};
use crate::types::CandidateMemory;

pub type TaskId = Uuid;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    FailedRetryable,
    FailedPermanent,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub id: TaskId,
    pub state: TaskState,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

struct LearnTask {
    id: TaskId,
    candidate: CandidateMemory,
    enqueued_at: DateTime<Utc>,
    attempts: u32,
}

/// Shared status table, read by `status()`/`cancel()` and written by the
/// worker loop. A `DashMap` would also fit here; `Mutex<HashMap>` matches
/// this codebase's preference for a single lock around small control-plane
/// state rather than a lock-free map when contention is low.
type StatusTable = Arc<Mutex<HashMap<TaskId, TaskStatus>>>;

pub struct LearnQueue {
    sender: Sender<LearnTask>,
    receiver: Receiver<LearnTask>,
    statuses: StatusTable,
    cancelled: Arc<Mutex<std::collections::HashSet<TaskId>>>,
    config: AsyncQueueConfig,
    enqueued_total: AtomicU64,
}

impl LearnQueue {
    pub fn new(config: AsyncQueueConfig) -> Self {
        let (sender, receiver) = bounded(config.max_queue_size);
        Self {
            sender,
            receiver,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            cancelled: Arc::new(Mutex::new(std::collections::HashSet::new())),
            config,
            enqueued_total: AtomicU64::new(0),
        }
    }

    /// Enqueues a candidate for background persistence. Returns
    /// `QueueFull` immediately rather than blocking when the channel's
    /// capacity is exhausted (SPEC_FULL.md §4.9's backpressure contract).
    pub fn enqueue(&self, candidate: CandidateMemory) -> Result<TaskId> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let task = LearnTask {
            id,
            candidate,
            enqueued_at: now,
            attempts: 0,
        };

        self.sender
            .try_send(task)
            .map_err(|_| EngineError::QueueFull(self.config.max_queue_size))?;

        self.statuses.lock().insert(
            id,
            TaskStatus {
                id,
                state: TaskState::Queued,
                attempts: 0,
                enqueued_at: now,
                last_error: None,
            },
        );
        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.statuses.lock().get(&id).cloned()
    }

    /// Marks a still-queued task cancelled. The worker checks this flag
    /// before running a task and skips it if set; a task already `Running`
    /// finishes its current attempt.
    pub fn cancel(&self, id: TaskId) {
        self.cancelled.lock().insert(id);
        if let Some(status) = self.statuses.lock().get_mut(&id) {
            if status.state == TaskState::Queued {
                status.state = TaskState::Cancelled;
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.receiver.len()
    }

    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total.load(Ordering::Relaxed)
    }

    fn set_state(&self, id: TaskId, state: TaskState, attempts: u32, error: Option<String>) {
        if let Some(status) = self.statuses.lock().get_mut(&id) {
            status.state = state;
            status.attempts = attempts;
            status.last_error = error;
        }
    }

    /// Background worker loop: batches queued tasks up to `batch_size` or
    /// `batch_timeout`, whichever comes first, then persists each via
    /// `persist`. Failures are retried with exponential backoff
    /// (100ms * 2^n, up to `MAX_RETRIES`); exhausting retries marks the task
    /// `FailedPermanent` for a non-retryable error or after the retry budget
    /// for a retryable one.
    pub async fn run<F, Fut>(self: Arc<Self>, persist: F)
    where
        F: Fn(CandidateMemory) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        let batch_size = 16usize;
        let mut batch: Vec<LearnTask> = Vec::with_capacity(batch_size);
        let mut ticker = interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                Ok(task) = self.receiver.recv() => {
                    batch.push(task);
                    if batch.len() >= batch_size {
                        self.process_batch(&mut batch, &persist).await;
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.process_batch(&mut batch, &persist).await;
                    }
                }
            }
        }
    }

    async fn process_batch<F, Fut>(&self, batch: &mut Vec<LearnTask>, persist: &F)
    where
        F: Fn(CandidateMemory) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        for mut task in batch.drain(..) {
            if self.cancelled.lock().contains(&task.id) {
                continue;
            }
            self.set_state(task.id, TaskState::Running, task.attempts, None);

            let ttl_elapsed = (Utc::now() - task.enqueued_at).num_seconds() as u64 > self.config.task_ttl_seconds;
            if ttl_elapsed {
                self.set_state(task.id, TaskState::Expired, task.attempts, None);
                continue;
            }

            let content = task.candidate.clone();
            match persist(content).await {
                Ok(()) => self.set_state(task.id, TaskState::Completed, task.attempts + 1, None),
                Err(err) => {
                    task.attempts += 1;
                    if err.is_retryable() && task.attempts <= MAX_RETRIES {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(task.attempts - 1));
                        tokio::time::sleep(backoff).await;
                        self.set_state(task.id, TaskState::Queued, task.attempts, Some(err.to_string()));
                        let _ = self.sender.try_send(task);
                    } else {
                        let state = if err.is_retryable() {
                            TaskState::FailedRetryable
                        } else {
                            TaskState::FailedPermanent
                        };
                        self.set_state(task.id, state, task.attempts, Some(err.to_string()));
                    }
                }
            }
        }
    }
}
