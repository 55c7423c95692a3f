//! The memory store: content-hash deduplicated upserts, filtered reads, and
//! retention sweeps. One transaction per write so a memory and its entity
//! graph either land together or not at all.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use sha2::{Digest, Sha256};

use super::connection::StoragePool;
use super::entity_store::{link_entity_to_memory, record_co_occurrence, upsert_entity};
use crate::error::Result;
use crate::types::{CandidateMemory, Memory, MemoryFilter, MemoryId, MemoryType, UpsertOutcome};

/// `sha256:<hex>` over the lowercased, whitespace-collapsed content, so
/// trivial formatting differences don't defeat deduplication.
pub fn compute_content_hash(content: &str) -> String {
    let normalized = content.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}

fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let memory_type_str: String = row.get("memory_type")?;
    let metadata_str: String = row.get("metadata")?;
    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        content_hash: row.get("content_hash")?,
        memory_type: memory_type_str.parse().unwrap_or(MemoryType::Working),
        importance: row.get("importance")?,
        confidence: row.get("confidence")?,
        created_at: parse_ts(row.get::<_, String>("created_at")?),
        valid_from: parse_ts(row.get::<_, String>("valid_from")?),
        valid_to: row
            .get::<_, Option<String>>("valid_to")?
            .map(parse_ts),
        accessed_at: parse_ts(row.get::<_, String>("accessed_at")?),
        access_count: row.get("access_count")?,
        source_type: row.get("source_type")?,
        agent_id: row.get("agent_id")?,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
    })
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Looks up a still-active memory by content hash. "Active" mirrors the
/// predicate `query_candidates` enforces everywhere else: `valid_to IS NULL
/// OR valid_to > now`. Matching only `IS NULL` here would let two memories
/// of any type with a finite `valid_to` (the common case — see
/// `generate_memories`'s per-type expiry policy) both insert instead of
/// deduplicating, breaking the "content_hash is unique among non-expired
/// memories" invariant (SPEC_FULL.md §3).
fn find_by_content_hash(conn: &Connection, content_hash: &str, now: DateTime<Utc>) -> Result<Option<MemoryId>> {
    conn.query_row(
        "SELECT id FROM memories WHERE content_hash = ? AND (valid_to IS NULL OR valid_to > ?)",
        params![content_hash, now.to_rfc3339()],
        |row| row.get(0),
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other.into()),
    })
}

/// `upsert_memory`: in one transaction, dedup by content hash among active
/// memories, else insert the memory and its entity graph (MENTIONS plus
/// CO_OCCURS_WITH for every pair of distinct entities found together).
pub fn upsert_memory(pool: &StoragePool, candidate: CandidateMemory, now: DateTime<Utc>) -> Result<UpsertOutcome> {
    let content_hash = compute_content_hash(&candidate.content);

    pool.with_transaction(|conn| {
        if let Some(existing_id) = find_by_content_hash(conn, &content_hash, now)? {
            conn.execute(
                "UPDATE memories SET access_count = access_count + 1, accessed_at = ? WHERE id = ?",
                params![now.to_rfc3339(), existing_id],
            )?;
            return Ok(UpsertOutcome::Duplicate(existing_id));
        }

        let now_str = now.to_rfc3339();
        let metadata_json = serde_json::to_string(&candidate.metadata)?;
        let valid_to_str = candidate.valid_to.map(|t| t.to_rfc3339());

        conn.execute(
            "INSERT INTO memories
                (content, content_hash, memory_type, importance, confidence, created_at,
                 valid_from, valid_to, accessed_at, access_count, source_type, agent_id,
                 user_id, session_id, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?)",
            params![
                candidate.content,
                content_hash,
                candidate.memory_type.as_str(),
                candidate.importance,
                candidate.confidence,
                now_str,
                now_str,
                valid_to_str,
                now_str,
                candidate.source_type,
                candidate.agent_id,
                candidate.user_id,
                candidate.session_id,
                metadata_json,
            ],
        )?;
        let memory_id = conn.last_insert_rowid();

        let mut entity_ids = Vec::with_capacity(candidate.entities.len());
        for entity_ref in &candidate.entities {
            let entity_id = upsert_entity(conn, entity_ref)?;
            link_entity_to_memory(conn, memory_id, entity_id, entity_ref)?;
            entity_ids.push(entity_id);
        }
        for i in 0..entity_ids.len() {
            for j in (i + 1)..entity_ids.len() {
                if entity_ids[i] != entity_ids[j] {
                    record_co_occurrence(conn, entity_ids[i], entity_ids[j])?;
                }
            }
        }

        let memory = conn.query_row(
            "SELECT * FROM memories WHERE id = ?",
            params![memory_id],
            memory_from_row,
        )?;
        Ok(UpsertOutcome::Stored(memory))
    })
}

/// Re-inserts a memory with its original fields intact — `created_at`,
/// `valid_from`, `valid_to`, `accessed_at`, `access_count`, `confidence`,
/// and `importance` all come from `memory`, not from the call time. Used
/// only by `Engine::import`: the normal write path (`upsert_memory`) always
/// stamps a freshly observed memory with the current time, but reproducing
/// an export must not silently rewrite the fields it carried, or
/// export→import→export would never converge to the same bytes.
pub fn restore_memory(pool: &StoragePool, memory: &Memory, now: DateTime<Utc>) -> Result<UpsertOutcome> {
    let content_hash = compute_content_hash(&memory.content);

    pool.with_transaction(|conn| {
        if let Some(existing_id) = find_by_content_hash(conn, &content_hash, now)? {
            conn.execute(
                "UPDATE memories SET access_count = access_count + ?, accessed_at = ? WHERE id = ?",
                params![memory.access_count.max(1), memory.accessed_at.to_rfc3339(), existing_id],
            )?;
            return Ok(UpsertOutcome::Duplicate(existing_id));
        }

        let metadata_json = serde_json::to_string(&memory.metadata)?;
        conn.execute(
            "INSERT INTO memories
                (content, content_hash, memory_type, importance, confidence, created_at,
                 valid_from, valid_to, accessed_at, access_count, source_type, agent_id,
                 user_id, session_id, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                memory.content,
                content_hash,
                memory.memory_type.as_str(),
                memory.importance,
                memory.confidence,
                memory.created_at.to_rfc3339(),
                memory.valid_from.to_rfc3339(),
                memory.valid_to.map(|t| t.to_rfc3339()),
                memory.accessed_at.to_rfc3339(),
                memory.access_count,
                memory.source_type,
                memory.agent_id,
                memory.user_id,
                memory.session_id,
                metadata_json,
            ],
        )?;
        let memory_id = conn.last_insert_rowid();
        let restored = conn.query_row(
            "SELECT * FROM memories WHERE id = ?",
            params![memory_id],
            memory_from_row,
        )?;
        Ok(UpsertOutcome::Stored(restored))
    })
}

/// `query_candidates`: the store always enforces the active-memory
/// predicate (`valid_to IS NULL OR valid_to > now`) regardless of what the
/// filter asks for.
pub fn query_candidates(pool: &StoragePool, filter: &MemoryFilter, now: DateTime<Utc>) -> Result<Vec<Memory>> {
    pool.with_connection(|conn| {
        let mut sql = String::from(
            "SELECT DISTINCT m.* FROM memories m",
        );
        if !filter.entity_ids.is_empty() {
            sql.push_str(" JOIN mentions mn ON mn.memory_id = m.id");
        }
        sql.push_str(" WHERE (m.valid_to IS NULL OR m.valid_to > ?)");

        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now.to_rfc3339())];

        if !filter.entity_ids.is_empty() {
            let placeholders = filter.entity_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND mn.entity_id IN ({placeholders})"));
            for id in &filter.entity_ids {
                bound.push(Box::new(*id));
            }
        }
        if !filter.memory_types.is_empty() {
            let placeholders = filter.memory_types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND m.memory_type IN ({placeholders})"));
            for t in &filter.memory_types {
                bound.push(Box::new(t.as_str().to_string()));
            }
        }
        if let Some(after) = filter.created_after {
            sql.push_str(" AND m.created_at > ?");
            bound.push(Box::new(after.to_rfc3339()));
        }
        if let Some(before) = filter.created_before {
            sql.push_str(" AND m.created_at < ?");
            bound.push(Box::new(before.to_rfc3339()));
        }
        if let Some(min_importance) = filter.min_importance {
            sql.push_str(" AND m.importance >= ?");
            bound.push(Box::new(min_importance));
        }
        if let Some(like) = &filter.content_like {
            sql.push_str(" AND m.content LIKE ?");
            bound.push(Box::new(format!("%{like}%")));
        }
        sql.push_str(" ORDER BY m.created_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), memory_from_row)?;
        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    })
}

pub fn touch(pool: &StoragePool, id: MemoryId, now: DateTime<Utc>) -> Result<()> {
    pool.with_connection(|conn| {
        conn.execute(
            "UPDATE memories SET access_count = access_count + 1, accessed_at = ? WHERE id = ?",
            params![now.to_rfc3339(), id],
        )?;
        Ok(())
    })
}

/// Deletes expired memories in batches of `batch_size`, returning the total
/// deleted. Never touches a row with `valid_to IS NULL`.
pub fn retention_sweep(pool: &StoragePool, batch_size: usize, now: DateTime<Utc>) -> Result<usize> {
    let mut total = 0;
    loop {
        let deleted = pool.with_connection(|conn| {
            let ids: Vec<MemoryId> = {
                let mut stmt = conn.prepare(
                    "SELECT id FROM memories WHERE valid_to IS NOT NULL AND valid_to < ? LIMIT ?",
                )?;
                let rows = stmt.query_map(params![now.to_rfc3339(), batch_size as i64], |row| row.get(0))?;
                rows.filter_map(|r| r.ok()).collect()
            };
            if ids.is_empty() {
                return Ok(0);
            }
            let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("DELETE FROM memories WHERE id IN ({placeholders})");
            let bound: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
            conn.execute(&sql, bound.as_slice())?;
            Ok(ids.len())
        })?;
        total += deleted;
        if deleted < batch_size {
            break;
        }
    }
    Ok(total)
}

/// `get_project_last_activity`: the max `created_at` across all memories,
/// used by `decay::temporal_score` to pick activity-aware vs. absolute mode.
pub fn get_project_last_activity(pool: &StoragePool) -> Result<Option<DateTime<Utc>>> {
    pool.with_connection(|conn| {
        let max_created: Option<String> =
            conn.query_row("SELECT MAX(created_at) FROM memories", [], |row| row.get(0))?;
        Ok(max_created.map(parse_ts))
    })
}

/// Active-memory counts by type, plus how many are past `valid_to` but not
/// yet swept, for the observability snapshot.
pub fn memory_counts(pool: &StoragePool, now: DateTime<Utc>) -> Result<crate::stats::MemoryCounts> {
    pool.with_connection(|conn| {
        let total_active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE valid_to IS NULL OR valid_to > ?",
            params![now.to_rfc3339()],
            |row| row.get(0),
        )?;

        let mut by_type = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT memory_type, COUNT(*) FROM memories WHERE valid_to IS NULL OR valid_to > ? GROUP BY memory_type",
            )?;
            let rows = stmt.query_map(params![now.to_rfc3339()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (memory_type, count) = row?;
                by_type.insert(memory_type, count);
            }
        }

        let pending_expiry: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE valid_to IS NOT NULL AND valid_to <= ?",
            params![now.to_rfc3339()],
            |row| row.get(0),
        )?;

        Ok(crate::stats::MemoryCounts {
            total_active,
            by_type,
            pending_expiry,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate(content: &str) -> CandidateMemory {
        CandidateMemory {
            content: content.to_string(),
            memory_type: MemoryType::Semantic,
            importance: 0.8,
            confidence: 0.9,
            source_type: "test".into(),
            agent_id: None,
            user_id: None,
            session_id: None,
            valid_to: None,
            metadata: HashMap::new(),
            entities: Vec::new(),
        }
    }

    #[test]
    fn second_upsert_of_identical_content_is_a_duplicate() {
        let pool = StoragePool::open_in_memory().unwrap();
        let now = Utc::now();

        let first = upsert_memory(&pool, sample_candidate("Rust uses ownership"), now).unwrap();
        let id = match first {
            UpsertOutcome::Stored(m) => m.id,
            UpsertOutcome::Duplicate(_) => panic!("expected Stored on first insert"),
        };

        let second = upsert_memory(&pool, sample_candidate("  RUST   USES ownership "), now).unwrap();
        assert!(matches!(second, UpsertOutcome::Duplicate(existing) if existing == id));
    }

    #[test]
    fn retention_sweep_never_deletes_memories_with_no_valid_to() {
        let pool = StoragePool::open_in_memory().unwrap();
        let now = Utc::now();
        upsert_memory(&pool, sample_candidate("never expires"), now).unwrap();

        let deleted = retention_sweep(&pool, 100, now + chrono::Duration::days(365)).unwrap();
        assert_eq!(deleted, 0);

        let filter = MemoryFilter::default();
        let remaining = query_candidates(&pool, &filter, now).unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn retention_sweep_deletes_only_past_expired_memories() {
        let pool = StoragePool::open_in_memory().unwrap();
        let now = Utc::now();
        let mut expiring = sample_candidate("will expire");
        expiring.valid_to = Some(now - chrono::Duration::days(1));
        upsert_memory(&pool, expiring, now).unwrap();

        let deleted = retention_sweep(&pool, 100, now).unwrap();
        assert_eq!(deleted, 1);
    }

    #[test]
    fn query_candidates_excludes_expired_memories() {
        let pool = StoragePool::open_in_memory().unwrap();
        let now = Utc::now();
        let mut expired = sample_candidate("old fact");
        expired.valid_to = Some(now - chrono::Duration::days(1));
        upsert_memory(&pool, expired, now).unwrap();
        upsert_memory(&pool, sample_candidate("current fact"), now).unwrap();

        let results = query_candidates(&pool, &MemoryFilter::default(), now).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "current fact");
    }

    #[test]
    fn touch_increments_access_count() {
        let pool = StoragePool::open_in_memory().unwrap();
        let now = Utc::now();
        let stored = upsert_memory(&pool, sample_candidate("touch me"), now).unwrap();
        let id = match stored {
            UpsertOutcome::Stored(m) => m.id,
            _ => unreachable!(),
        };
        touch(&pool, id, now).unwrap();
        let results = query_candidates(&pool, &MemoryFilter::default(), now).unwrap();
        assert_eq!(results[0].access_count, 2);
    }

    #[test]
    fn project_last_activity_tracks_latest_creation() {
        let pool = StoragePool::open_in_memory().unwrap();
        let now = Utc::now();
        upsert_memory(&pool, sample_candidate("first"), now - chrono::Duration::days(5)).unwrap();
        upsert_memory(&pool, sample_candidate("second"), now).unwrap();

        let last_activity = get_project_last_activity(&pool).unwrap().unwrap();
        assert!((last_activity - now).num_seconds().abs() < 2);
    }
}
