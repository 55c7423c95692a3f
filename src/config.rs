//! Layered engine configuration.
//!
//! The engine only accepts an already-built `EngineConfig`; parsing a config
//! *file* (TOML, JSON, whatever the host prefers) is the caller's job. Every
//! field has a `Default` matching the documented default, and
//! `EngineConfig::validate()` rejects out-of-range values before `init`
//! builds anything on top of them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::MemoryType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub database_path: String,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default, rename = "async")]
    pub async_queue: AsyncQueueConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
    #[serde(default)]
    pub decay: DecayConfig,
}

impl EngineConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            performance: PerformanceConfig::default(),
            async_queue: AsyncQueueConfig::default(),
            retention: RetentionConfig::default(),
            ranker: RankerConfig::default(),
            decay: DecayConfig::default(),
        }
    }

    /// Checks range invariants. Called by `Engine::init` before anything
    /// else touches the store.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "database_path must not be empty".into(),
            ));
        }
        if self.performance.connection_pool_size == 0 {
            return Err(EngineError::InvalidInput(
                "performance.connection_pool_size must be > 0".into(),
            ));
        }
        if self.async_queue.max_workers == 0 {
            return Err(EngineError::InvalidInput(
                "async.max_workers must be > 0".into(),
            ));
        }
        self.ranker.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceConfig {
    pub query_timeout_ms: u64,
    pub cache_size: usize,
    pub connection_pool_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 100,
            cache_size: 1000,
            connection_pool_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AsyncQueueConfig {
    pub max_workers: usize,
    pub max_queue_size: usize,
    pub task_ttl_seconds: u64,
}

impl Default for AsyncQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            max_queue_size: 100,
            task_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    pub enable_auto_cleanup: bool,
    pub cleanup_interval_hours: u64,
    /// Override days per type; `None` for a type = never expire. Missing
    /// entries fall back to the per-type default in `decay::PARAMS`.
    pub custom_retention: HashMap<String, Option<u64>>,
    pub max_total_memories: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let mut custom_retention = HashMap::new();
        // The resolved value for the Episodic 30d-vs-7d ambiguity (see
        // SPEC_FULL.md §9): 7 days, surfaced here rather than hardcoded
        // past this layer.
        custom_retention.insert(MemoryType::Episodic.as_str().to_string(), Some(7));
        Self {
            enable_auto_cleanup: true,
            cleanup_interval_hours: 24,
            custom_retention,
            max_total_memories: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankerConfig {
    pub relevance: f32,
    pub importance: f32,
    pub decay: f32,
    pub confidence: f32,
    pub min_relevance: f32,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            relevance: 0.45,
            importance: 0.2,
            decay: 0.25,
            confidence: 0.1,
            min_relevance: 0.3,
        }
    }
}

impl RankerConfig {
    pub fn validate(&self) -> Result<()> {
        let sum = self.relevance + self.importance + self.decay + self.confidence;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EngineError::InvalidInput(format!(
                "ranker.weights must sum to 1.0 (got {sum})"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecayConfig {
    /// Pins `project_last_activity` instead of auto-detecting it from the
    /// store. Mainly useful for deterministic tests (see S3).
    pub project_last_activity: Option<chrono::DateTime<chrono::Utc>>,
}
