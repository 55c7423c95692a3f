//! Resolves memory-type names from older export/import formats onto the six
//! cognitive types this engine stores. Only reachable from import/migration
//! code paths — never from the write path proper.

use crate::types::MemoryType;

/// Maps a legacy type name (case-insensitive) to its current equivalent.
/// Names that are already canonical pass through `MemoryType::from_str`
/// unchanged; unrecognized names are rejected by the caller.
pub fn resolve(name: &str) -> Option<MemoryType> {
    match name.to_lowercase().as_str() {
        "identity" => Some(MemoryType::Semantic),
        "decision" => Some(MemoryType::Episodic),
        "pattern" => Some(MemoryType::Procedural),
        "solution" => Some(MemoryType::Procedural),
        "status" => Some(MemoryType::Working),
        "context" => Some(MemoryType::Episodic),
        other => other.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_legacy_names() {
        assert_eq!(resolve("identity"), Some(MemoryType::Semantic));
        assert_eq!(resolve("DECISION"), Some(MemoryType::Episodic));
        assert_eq!(resolve("pattern"), Some(MemoryType::Procedural));
        assert_eq!(resolve("solution"), Some(MemoryType::Procedural));
        assert_eq!(resolve("status"), Some(MemoryType::Working));
        assert_eq!(resolve("context"), Some(MemoryType::Episodic));
    }

    #[test]
    fn passes_through_canonical_names() {
        assert_eq!(resolve("semantic"), Some(MemoryType::Semantic));
        assert_eq!(resolve("working"), Some(MemoryType::Working));
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(resolve("frobnicate"), None);
    }
}
