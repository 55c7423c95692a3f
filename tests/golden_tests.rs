//! Golden tests - fixture-based tests that lock expected behavior
//!
//! These tests use JSON fixtures to verify that the classifier and entity
//! extractor produce expected outputs. Any change in behavior will cause
//! these tests to fail, signaling a potential breaking change.
//!
//! Run with: cargo test --test golden_tests

use serde::Deserialize;
use std::fs;

// ============================================================================
// CLASSIFICATION GOLDEN TESTS
// ============================================================================

mod classification_golden {
    use super::*;
    use memgraph::classify::classify;

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: String,
        expected_type: String,
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_classification_golden() {
        let fixture_path = concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/classification_golden.json"
        );
        let content = fs::read_to_string(fixture_path)
            .expect("Failed to read classification_golden.json fixture");
        let fixture: Fixture =
            serde_json::from_str(&content).expect("Failed to parse fixture JSON");

        for case in fixture.test_cases {
            let result = classify(&case.input);
            assert_eq!(
                result.memory_type.as_str(),
                case.expected_type,
                "Case '{}': input={:?}, expected_type={}, got={}",
                case.name,
                case.input,
                case.expected_type,
                result.memory_type.as_str()
            );
        }
    }
}

// ============================================================================
// ENTITY EXTRACTION GOLDEN TESTS
// ============================================================================

mod extraction_golden {
    use super::*;
    use memgraph::extract::extract;

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: String,
        expected_entities: Vec<ExpectedEntity>,
    }

    #[derive(Debug, Deserialize)]
    struct ExpectedEntity {
        normalized_name: String,
        entity_type: String,
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_entity_extraction_golden() {
        let fixture_path = concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/entity_extraction_golden.json"
        );
        let content = fs::read_to_string(fixture_path)
            .expect("Failed to read entity_extraction_golden.json fixture");
        let fixture: Fixture =
            serde_json::from_str(&content).expect("Failed to parse fixture JSON");

        for case in fixture.test_cases {
            let entities = extract(&case.input);

            assert_eq!(
                entities.len(),
                case.expected_entities.len(),
                "Case '{}': entity count mismatch. Expected {:?}, got {:?}",
                case.name,
                case.expected_entities,
                entities.iter().map(|e| (&e.normalized_name, e.entity_type)).collect::<Vec<_>>()
            );

            for expected in &case.expected_entities {
                let found = entities.iter().any(|e| {
                    e.normalized_name == expected.normalized_name
                        && e.entity_type.as_str() == expected.entity_type
                });
                assert!(
                    found,
                    "Case '{}': expected entity {:?} not found in {:?}",
                    case.name, expected, entities
                );
            }
        }
    }
}

// ============================================================================
// MEMORY TYPE GOLDEN TESTS
// ============================================================================

mod memory_type_golden {
    use memgraph::types::MemoryType;

    #[test]
    fn test_memory_type_string_representations() {
        // Lock the six cognitive type names.
        assert_eq!(MemoryType::Semantic.as_str(), "semantic");
        assert_eq!(MemoryType::Procedural.as_str(), "procedural");
        assert_eq!(MemoryType::Preference.as_str(), "preference");
        assert_eq!(MemoryType::Episodic.as_str(), "episodic");
        assert_eq!(MemoryType::Working.as_str(), "working");
        assert_eq!(MemoryType::Sensory.as_str(), "sensory");
    }

    #[test]
    fn test_default_importance_ordering() {
        // Lock the relative importance ordering from SPEC_FULL.md §4.3.
        assert!(MemoryType::Semantic.default_importance() > MemoryType::Episodic.default_importance());
        assert!(MemoryType::Episodic.default_importance() > MemoryType::Working.default_importance());
        assert!(MemoryType::Working.default_importance() > MemoryType::Sensory.default_importance());
    }
}

// ============================================================================
// CONTENT HASH GOLDEN TESTS
// ============================================================================

mod content_hash_golden {
    use memgraph::storage::store::compute_content_hash;

    #[test]
    fn test_hash_is_stable_and_normalizes_whitespace_and_case() {
        let a = compute_content_hash("We use PostgreSQL");
        let b = compute_content_hash("we  use postgresql");
        let c = compute_content_hash("WE USE POSTGRESQL");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert!(a.starts_with("sha256:"));
        // 7-char prefix + 64 hex chars.
        assert_eq!(a.len(), 7 + 64);
    }

    #[test]
    fn test_hash_distinguishes_different_content() {
        let a = compute_content_hash("We use PostgreSQL");
        let b = compute_content_hash("We use MySQL");
        assert_ne!(a, b);
    }
}

// ============================================================================
// LEGACY ALIAS GOLDEN TESTS
// ============================================================================

mod legacy_alias_golden {
    use memgraph::legacy_alias::resolve;
    use memgraph::types::MemoryType;

    #[test]
    fn test_legacy_alias_table_is_locked() {
        // Lock the exact mapping from SPEC_FULL.md §9's resolved ambiguity.
        assert_eq!(resolve("identity"), Some(MemoryType::Semantic));
        assert_eq!(resolve("decision"), Some(MemoryType::Episodic));
        assert_eq!(resolve("pattern"), Some(MemoryType::Procedural));
        assert_eq!(resolve("solution"), Some(MemoryType::Procedural));
        assert_eq!(resolve("status"), Some(MemoryType::Working));
        assert_eq!(resolve("context"), Some(MemoryType::Episodic));
        assert_eq!(resolve("not_a_real_legacy_name"), None);
    }
}
