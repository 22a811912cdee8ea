//! Property-based tests for sacred-reader
//!
//! Following ruchy/trueno/aprender pattern:
//! - Test ordering and lookup invariants
//! - Run with ProptestConfig::with_cases(32) (each case touches the filesystem)

mod common;

use std::collections::BTreeSet;

use common::{run_json, ResultsDir};
use proptest::prelude::*;
use sacred_reader::document::Document;
use sacred_reader::experiment::RunIndex;
use serde_json::{json, Value};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: keys are exactly the numeric run directories, in numeric order
    #[test]
    fn prop_keys_numerically_sorted(runs in proptest::collection::btree_set(0u32..100_000, 0..20)) {
        let results = ResultsDir::new();
        for run in &runs {
            results.add_run(&run.to_string(), &run_json("prop", &[]));
        }

        let index = RunIndex::open(results.path()).unwrap();
        let keys: Vec<u32> = index.keys().iter().map(|k| k.parse().unwrap()).collect();
        let expected: Vec<u32> = runs.iter().copied().collect();

        prop_assert_eq!(keys, expected);
    }

    /// Property: update() with no filesystem change is idempotent
    #[test]
    fn prop_update_idempotent(runs in proptest::collection::btree_set(1u32..1_000, 1..10)) {
        let results = ResultsDir::new();
        for run in &runs {
            results.add_run(&run.to_string(), &run_json("prop", &[]));
        }

        let mut index = RunIndex::open(results.path()).unwrap();
        let before = index.keys().to_vec();
        index.update().unwrap();
        prop_assert_eq!(before, index.keys().to_vec());
    }

    /// Property: every key of a flat object resolves to its value
    #[test]
    fn prop_document_top_level_lookup(
        entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..16)
    ) {
        let value: Value = entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect::<serde_json::Map<_, _>>().into();
        let doc = Document::new(value);

        let keys: BTreeSet<&str> = doc.keys().into_iter().collect();
        prop_assert_eq!(keys.len(), entries.len());
        for (k, v) in &entries {
            prop_assert_eq!(doc.get(k).and_then(Value::as_i64), Some(*v));
            let missing = format!("{k}.deeper");
            prop_assert!(doc.get(&missing).is_none());
        }
    }

    /// Property: nested paths resolve through objects and arrays
    #[test]
    fn prop_document_nested_lookup(outer in "[a-z]{1,6}", inner in "[a-z]{1,6}", items in proptest::collection::vec(any::<bool>(), 1..8)) {
        let mut inner_map = serde_json::Map::new();
        inner_map.insert(inner.clone(), json!(items));
        let mut outer_map = serde_json::Map::new();
        outer_map.insert(outer.clone(), Value::Object(inner_map));
        let doc = Document::new(Value::Object(outer_map));
        for (i, item) in items.iter().enumerate() {
            let path = format!("{outer}.{inner}.{i}");
            prop_assert_eq!(doc.get_bool(&path), Some(*item));
        }
        let past_end = format!("{outer}.{inner}.{}", items.len());
        prop_assert!(doc.get(&past_end).is_none());
    }
}
