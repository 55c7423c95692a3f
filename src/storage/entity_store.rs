//! Entity and relationship persistence: upserting entities, linking them to
//! memories via MENTIONS, and maintaining CO_OCCURS_WITH counters.
//!
//! Grounded on the same upsert-by-normalized-key shape the rest of the
//! store uses: look up first, update counters on hit, insert on miss.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::extract::EntityRef;
use crate::types::{Entity, EntityId, EntityType, MemoryId};

fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    let entity_type_str: String = row.get("entity_type")?;
    Ok(Entity {
        id: row.get("id")?,
        name: row.get("name")?,
        normalized_name: row.get("normalized_name")?,
        entity_type: entity_type_str.parse().unwrap_or(EntityType::Other),
        first_seen: parse_ts(row.get::<_, String>("first_seen")?),
        last_seen: parse_ts(row.get::<_, String>("last_seen")?),
        mention_count: row.get("mention_count")?,
        confidence: row.get("confidence")?,
    })
}

fn parse_ts(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Creates the entity if it doesn't already exist under this
/// `(normalized_name, entity_type)` key, otherwise bumps `last_seen`.
/// `mention_count` is driven by `link_entity_to_memory`, not by this call,
/// so calling this alone does not increment it.
pub fn upsert_entity(conn: &Connection, extracted: &EntityRef) -> Result<EntityId> {
    let now = Utc::now().to_rfc3339();

    let existing: Option<EntityId> = conn
        .query_row(
            "SELECT id FROM entities WHERE normalized_name = ? AND entity_type = ?",
            params![extracted.normalized_name, extracted.entity_type.as_str()],
            |row| row.get(0),
        )
        .ok();

    if let Some(id) = existing {
        conn.execute(
            "UPDATE entities SET last_seen = ? WHERE id = ?",
            params![now, id],
        )?;
        Ok(id)
    } else {
        conn.execute(
            "INSERT INTO entities (name, normalized_name, entity_type, first_seen, last_seen, mention_count, confidence)
             VALUES (?, ?, ?, ?, ?, 0, ?)",
            params![
                extracted.name,
                extracted.normalized_name,
                extracted.entity_type.as_str(),
                now,
                now,
                extracted.confidence,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// Inserts a MENTIONS edge and bumps the entity's `mention_count`. A
/// duplicate edge (same memory, entity, and start offset) is ignored rather
/// than inserted twice, so replaying the same extraction is idempotent.
pub fn link_entity_to_memory(
    conn: &Connection,
    memory_id: MemoryId,
    entity_id: EntityId,
    entity_ref: &EntityRef,
) -> Result<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO mentions (memory_id, entity_id, confidence, position_start, position_end, extraction_method)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            memory_id,
            entity_id,
            entity_ref.confidence,
            entity_ref.start as i64,
            entity_ref.end as i64,
            entity_ref.method,
        ],
    )? > 0;

    if inserted {
        conn.execute(
            "UPDATE entities SET mention_count = mention_count + 1 WHERE id = ?",
            params![entity_id],
        )?;
    }
    Ok(())
}

/// Upserts the undirected CO_OCCURS_WITH counter for a pair of entities
/// mentioned in the same memory. Always stored canonically with the lower
/// id first so the pair never gets two rows.
pub fn record_co_occurrence(conn: &Connection, a: EntityId, b: EntityId) -> Result<()> {
    if a == b {
        return Ok(());
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO co_occurs_with (entity_a_id, entity_b_id, co_occurrence_count, last_co_occurrence)
         VALUES (?, ?, 1, ?)
         ON CONFLICT(entity_a_id, entity_b_id) DO UPDATE SET
            co_occurrence_count = co_occurrence_count + 1,
            last_co_occurrence = excluded.last_co_occurrence",
        params![lo, hi, now],
    )?;
    Ok(())
}

pub fn get_entity(conn: &Connection, id: EntityId) -> Result<Option<Entity>> {
    conn.query_row(
        "SELECT id, name, normalized_name, entity_type, first_seen, last_seen, mention_count, confidence
         FROM entities WHERE id = ?",
        params![id],
        entity_from_row,
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other.into()),
    })
}

pub fn find_entity(
    conn: &Connection,
    normalized_name: &str,
    entity_type: EntityType,
) -> Result<Option<Entity>> {
    conn.query_row(
        "SELECT id, name, normalized_name, entity_type, first_seen, last_seen, mention_count, confidence
         FROM entities WHERE normalized_name = ? AND entity_type = ?",
        params![normalized_name, entity_type.as_str()],
        entity_from_row,
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other.into()),
    })
}

/// Entity ids mentioned by a memory, used by `recall` to widen a strategy
/// from a prompt's entities to memories sharing those entities.
pub fn entity_ids_for_memory(conn: &Connection, memory_id: MemoryId) -> Result<Vec<EntityId>> {
    let mut stmt = conn.prepare_cached("SELECT entity_id FROM mentions WHERE memory_id = ?")?;
    let ids = stmt
        .query_map(params![memory_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(ids)
}

/// Full MENTIONS rows for a memory, used by export to carry each memory's
/// entity links alongside its fields.
pub fn mentions_for_memory(conn: &Connection, memory_id: MemoryId) -> Result<Vec<crate::types::Mention>> {
    let mut stmt = conn.prepare_cached(
        "SELECT memory_id, entity_id, confidence, position_start, position_end, extraction_method
         FROM mentions WHERE memory_id = ?",
    )?;
    let mentions = stmt
        .query_map(params![memory_id], |row| {
            Ok(crate::types::Mention {
                memory_id: row.get(0)?,
                entity_id: row.get(1)?,
                confidence: row.get(2)?,
                position_start: row.get::<_, i64>(3)? as usize,
                position_end: row.get::<_, i64>(4)? as usize,
                extraction_method: row.get(5)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(mentions)
}
