//! The embedded graph store: a connection pool over SQLite (`connection`),
//! versioned schema creation (`migrations`), the content-hash-deduplicated
//! memory repository (`store`), and entity/relationship persistence
//! (`entity_store`).

pub mod connection;
pub mod entity_store;
pub mod migrations;
pub mod store;

pub use connection::{StoragePool, StorageStats};
