//! Schema creation and versioned migrations.
//!
//! `SchemaVersion` is a singleton row rather than a full migration history
//! table; opening a store written by a schema newer than this binary knows
//! about fails hard with `SchemaMismatch` (see DESIGN.md for the exact
//! resolution of the two conflicting source statements on this point).
//! Opening an older store runs whichever `migrate_vN` functions are needed
//! to bring it forward in place.

use rusqlite::Connection;

use crate::error::{EngineError, Result};

/// The schema version this binary understands. Bump alongside a new
/// `migrate_vN` function whenever the schema changes.
pub const SCHEMA_VERSION: i64 = 1;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;

    let current: Option<i64> = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .ok();

    let current = match current {
        Some(v) => v,
        None => {
            conn.execute(
                "INSERT INTO schema_version (id, version, created_at) VALUES (1, 0, ?)",
                [chrono::Utc::now().to_rfc3339()],
            )?;
            0
        }
    };

    if current > SCHEMA_VERSION {
        return Err(EngineError::SchemaMismatch {
            found: current,
            max_known: SCHEMA_VERSION,
        });
    }

    if current < 1 {
        migrate_v1(conn)?;
    }

    conn.execute(
        "UPDATE schema_version SET version = ? WHERE id = 1",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

/// Foundational schema: memories, entities, sessions, and the four edge
/// kinds from the data model (MENTIONS, RELATES_TO, CO_OCCURS_WITH;
/// BELONGS_TO_SESSION is realized as the `session_id` column on `memories`,
/// which already satisfies its "one edge per memory" invariant).
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE memories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            memory_type TEXT NOT NULL,
            importance REAL NOT NULL,
            confidence REAL NOT NULL,
            created_at TEXT NOT NULL,
            valid_from TEXT NOT NULL,
            valid_to TEXT,
            accessed_at TEXT NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            source_type TEXT NOT NULL,
            agent_id TEXT,
            user_id TEXT,
            session_id TEXT,
            metadata TEXT NOT NULL DEFAULT '{}'
        );

        -- Exact-hash dedup is scoped to non-expired memories only (a memory
        -- may be re-learned once its predecessor has expired).
        CREATE UNIQUE INDEX idx_memories_content_hash_active
            ON memories (content_hash) WHERE valid_to IS NULL;
        CREATE INDEX idx_memories_valid_to ON memories (valid_to);
        CREATE INDEX idx_memories_memory_type ON memories (memory_type);
        CREATE INDEX idx_memories_session_id ON memories (session_id);
        CREATE INDEX idx_memories_created_at ON memories (created_at);

        CREATE TABLE entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            mention_count INTEGER NOT NULL DEFAULT 0,
            confidence REAL NOT NULL DEFAULT 0.5,
            UNIQUE (normalized_name, entity_type)
        );

        CREATE TABLE mentions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            confidence REAL NOT NULL,
            position_start INTEGER NOT NULL,
            position_end INTEGER NOT NULL,
            extraction_method TEXT NOT NULL,
            UNIQUE (memory_id, entity_id, position_start)
        );
        CREATE INDEX idx_mentions_memory_id ON mentions (memory_id);
        CREATE INDEX idx_mentions_entity_id ON mentions (entity_id);

        CREATE TABLE relates_to (
            from_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            to_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            relationship_type TEXT NOT NULL,
            strength REAL NOT NULL,
            PRIMARY KEY (from_id, to_id, relationship_type)
        );

        CREATE TABLE co_occurs_with (
            entity_a_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            entity_b_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            co_occurrence_count INTEGER NOT NULL DEFAULT 1,
            last_co_occurrence TEXT NOT NULL,
            PRIMARY KEY (entity_a_id, entity_b_id),
            CHECK (entity_a_id < entity_b_id)
        );

        CREATE TABLE sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            agent_id TEXT,
            created_at TEXT NOT NULL,
            last_activity TEXT NOT NULL,
            memory_count INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn newer_store_refuses_to_open() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "UPDATE schema_version SET version = ? WHERE id = 1",
            [SCHEMA_VERSION + 1],
        )
        .unwrap();
        let err = run_migrations(&conn).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }
}
