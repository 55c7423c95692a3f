//! Core data model: Memory, Entity, Session, and the edges between them.
//!
//! The graph is realized relationally (see `storage::migrations`) but every
//! type here is graph-shaped: ids are opaque handles, edges carry their own
//! attributes, and nothing holds a back-pointer into another node.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MemoryId = i64;
pub type EntityId = i64;
pub type SessionId = String;

/// The six cognitive types this engine stores. Legacy names from older
/// documents (`Identity`, `Decision`, `Pattern`, `Solution`, `Status`,
/// `Context`) are resolved to one of these at the import/migration edge only —
/// see `legacy_alias`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Semantic,
    Procedural,
    Preference,
    Episodic,
    Working,
    Sensory,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Preference => "preference",
            MemoryType::Episodic => "episodic",
            MemoryType::Working => "working",
            MemoryType::Sensory => "sensory",
        }
    }

    /// Default importance assigned at generation time when neither an
    /// explicit override nor a classifier-provided value is available.
    pub fn default_importance(&self) -> f32 {
        match self {
            MemoryType::Semantic => 1.0,
            MemoryType::Procedural | MemoryType::Preference => 0.9,
            MemoryType::Episodic => 0.7,
            MemoryType::Working => 0.5,
            MemoryType::Sensory => 0.3,
        }
    }

    pub fn all() -> [MemoryType; 6] {
        [
            MemoryType::Semantic,
            MemoryType::Procedural,
            MemoryType::Preference,
            MemoryType::Episodic,
            MemoryType::Working,
            MemoryType::Sensory,
        ]
    }
}

impl FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semantic" => Ok(MemoryType::Semantic),
            "procedural" => Ok(MemoryType::Procedural),
            "preference" => Ok(MemoryType::Preference),
            "episodic" => Ok(MemoryType::Episodic),
            "working" => Ok(MemoryType::Working),
            "sensory" => Ok(MemoryType::Sensory),
            other => Err(format!("unknown memory_type: {other}")),
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single durable fact extracted from ingested text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub content: String,
    pub content_hash: String,
    pub memory_type: MemoryType,
    pub importance: f32,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: i64,
    pub source_type: String,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Memory {
    /// Whether this memory is currently in its active window.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.valid_to {
            None => true,
            Some(valid_to) => valid_to > now,
        }
    }
}

/// A normalized real-world or technical concept mentioned in memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Technology,
    Project,
    Date,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Technology => "technology",
            EntityType::Project => "project",
            EntityType::Date => "date",
            EntityType::Other => "other",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(EntityType::Person),
            "organization" => Ok(EntityType::Organization),
            "location" => Ok(EntityType::Location),
            "technology" => Ok(EntityType::Technology),
            "project" => Ok(EntityType::Project),
            "date" => Ok(EntityType::Date),
            _ => Ok(EntityType::Other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub normalized_name: String,
    pub entity_type: EntityType,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: i64,
    pub confidence: f32,
}

/// Optional conversational grouping for memories created in one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub memory_count: i64,
}

/// Memory→Entity edge. Multi-edges allowed: one per occurrence in the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub memory_id: MemoryId,
    pub entity_id: EntityId,
    pub confidence: f32,
    pub position_start: usize,
    pub position_end: usize,
    pub extraction_method: String,
}

/// Memory→Memory edge. `relationship_type` is treated as an opaque string;
/// recall logic must never branch on its value (see SPEC_FULL.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatesTo {
    pub from_id: MemoryId,
    pub to_id: MemoryId,
    pub relationship_type: String,
    pub strength: f32,
}

/// Entity→Entity edge, undirected. Always stored with `entity_a_id <
/// entity_b_id` so the same pair never gets two rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoOccursWith {
    pub entity_a_id: EntityId,
    pub entity_b_id: EntityId,
    pub co_occurrence_count: i64,
    pub last_co_occurrence: DateTime<Utc>,
}

/// Result of `upsert_memory`: either a freshly stored memory or a pointer to
/// the pre-existing one whose content hash matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Stored(Memory),
    Duplicate(MemoryId),
}

/// Candidate memory produced by the classifier + extractor, not yet
/// persisted. `upsert_memory` turns this into a `Memory` row.
#[derive(Debug, Clone)]
pub struct CandidateMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f32,
    pub confidence: f32,
    pub source_type: String,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub valid_to: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub entities: Vec<crate::extract::EntityRef>,
}

/// Filter accepted by `query_candidates`.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub entity_ids: Vec<EntityId>,
    pub memory_types: Vec<MemoryType>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub min_importance: Option<f32>,
    pub content_like: Option<String>,
    pub limit: Option<usize>,
}
