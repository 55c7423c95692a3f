//! A project-local memory engine for AI assistants.
//!
//! Ingests free-form text, classifies and extracts it into typed memory
//! facts with entities (`classify`, `extract`), persists them in an
//! embedded graph store realized over SQLite (`storage`), and recalls a
//! ranked, decayed subset to enrich a prompt within a latency budget
//! (`recall`, `decay`, `rank`, `context`). Writes go through `engine`
//! either inline or via the background `queue`, so the recall path never
//! blocks on ingestion.
//!
//! See `Engine` for the public entry point.

pub mod cache;
pub mod classify;
pub mod config;
pub mod context;
pub mod decay;
pub mod engine;
pub mod error;
pub mod extract;
pub mod legacy_alias;
pub mod queue;
pub mod rank;
pub mod recall;
pub mod stats;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Engine, GenerateOutcome};
pub use error::{EngineError, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
