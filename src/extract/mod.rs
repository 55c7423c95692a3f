//! Entity extraction: deterministic rule tables over regex, one pattern per
//! entity type. Output is stable for identical input and never panics,
//! including on empty, whitespace-only, or adversarial byte sequences.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::EntityType;

/// Hard ceiling on entities returned per call, keeping recall-path latency
/// predictable regardless of input size.
pub const MAX_ENTITIES_PER_TEXT: usize = 100;

/// One surfaced entity mention, offsets into the original text's bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    pub name: String,
    pub normalized_name: String,
    pub entity_type: EntityType,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    pub method: &'static str,
}

static TECHNOLOGY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(Rust|Python|TypeScript|JavaScript|Go|Java|Kotlin|Swift|PostgreSQL|MySQL|SQLite|Redis|Docker|Kubernetes|React|Vue|Angular|FastAPI|Django|Flask|GraphQL|gRPC|Kafka|AWS|Azure|GCP)\b").unwrap()
});

static PROJECT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([a-zA-Z][a-zA-Z0-9_-]{1,40})").unwrap());

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{4}-\d{2}-\d{2}|yesterday|today|tomorrow|last week|next week|last month)\b").unwrap()
});

static ORGANIZATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z]+(?:\s+(?:Inc|Corp|LLC|Ltd|GmbH))\.?)\b").unwrap()
});

static LOCATION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(New York|San Francisco|London|Berlin|Tokyo|Paris|Remote)\b").unwrap()
});

/// Two or more consecutive capitalized words, the same heuristic used for
/// proper-noun detection generally: good recall for person names, at the
/// cost of occasionally matching other capitalized phrases (filtered below).
static PERSON_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)\b").unwrap());

fn is_noise_phrase(s: &str) -> bool {
    matches!(
        s,
        "New York" | "San Francisco" | "Remote Work" | "Last Week" | "Next Week"
    )
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Runs every pattern against `text`, deduplicating overlapping spans of the
/// same normalized entity and keeping the highest-confidence span. Bounded
/// to `MAX_ENTITIES_PER_TEXT`; sorted by first-occurrence position.
pub fn extract(text: &str) -> Vec<EntityRef> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut found: HashMap<(String, EntityType), EntityRef> = HashMap::new();

    let mut add = |m: regex::Match, entity_type: EntityType, confidence: f32, method: &'static str| {
        let raw = m.as_str();
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return;
        }
        let key = (normalized.clone(), entity_type);
        let candidate = EntityRef {
            name: raw.to_string(),
            normalized_name: normalized,
            entity_type,
            start: m.start(),
            end: m.end(),
            confidence,
            method,
        };
        found
            .entry(key)
            .and_modify(|existing| {
                if candidate.confidence > existing.confidence {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    };

    for m in TECHNOLOGY_PATTERN.find_iter(text) {
        add(m, EntityType::Technology, 0.9, "rule:technology");
    }
    for m in PROJECT_PATTERN.find_iter(text) {
        add(m, EntityType::Project, 0.8, "rule:project_tag");
    }
    for m in DATE_PATTERN.find_iter(text) {
        add(m, EntityType::Date, 0.85, "rule:date");
    }
    for m in ORGANIZATION_PATTERN.find_iter(text) {
        add(m, EntityType::Organization, 0.75, "rule:organization");
    }
    for m in LOCATION_PATTERN.find_iter(text) {
        add(m, EntityType::Location, 0.7, "rule:location");
    }
    for cap in PERSON_PATTERN.captures_iter(text) {
        let m = cap.get(1).unwrap();
        if is_noise_phrase(m.as_str()) {
            continue;
        }
        add(m, EntityType::Person, 0.55, "rule:person");
    }

    let mut entities: Vec<EntityRef> = found.into_values().collect();
    entities.sort_by_key(|e| e.start);
    entities.truncate(MAX_ENTITIES_PER_TEXT);
    entities
}
