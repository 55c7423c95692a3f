//! Error types for the memory engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error taxonomy shared by every component. Kinds, not mechanisms: a
/// `StorageError` might originate from rusqlite, a pool timeout, or a
/// filesystem failure, but callers only need to know it is a storage
/// problem and whether it is worth retrying.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("engine not initialized")]
    NotInitialized,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("pool timeout after {0:?}")]
    PoolTimeout(std::time::Duration),

    #[error("query timeout after {0:?}")]
    QueryTimeout(std::time::Duration),

    #[error("schema mismatch: store is at version {found}, binary understands up to {max_known}")]
    SchemaMismatch { found: i64, max_known: i64 },

    #[error("learn queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("learn queue has shut down")]
    QueueShutdown,

    #[error("operation timed out")]
    Timeout,

    #[error("operation was cancelled")]
    Cancelled,

    #[error("duplicate memory (existing_id={existing_id})")]
    Duplicate { existing_id: i64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether an async worker may retry the operation that produced this error.
    /// `InvalidInput` and `SchemaMismatch` are never retryable — retrying them
    /// wastes a worker slot on an error that cannot resolve itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StorageError(_)
                | EngineError::PoolTimeout(_)
                | EngineError::QueryTimeout(_)
                | EngineError::Database(_)
                | EngineError::Io(_)
        )
    }

    /// Stable string code for diagnostics and exports.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::NotInitialized => "not_initialized",
            EngineError::StorageError(_) => "storage_error",
            EngineError::PoolTimeout(_) => "pool_timeout",
            EngineError::QueryTimeout(_) => "query_timeout",
            EngineError::SchemaMismatch { .. } => "schema_mismatch",
            EngineError::QueueFull(_) => "queue_full",
            EngineError::QueueShutdown => "queue_shutdown",
            EngineError::Timeout => "timeout",
            EngineError::Cancelled => "cancelled",
            EngineError::Duplicate { .. } => "duplicate",
            EngineError::NotFound(_) => "not_found",
            EngineError::Database(_) => "storage_error",
            EngineError::Serialization(_) => "invalid_input",
            EngineError::Io(_) => "storage_error",
        }
    }
}
