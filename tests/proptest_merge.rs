//! Property-based tests for the reconciler and the document decoder.
//!
//! ```bash
//! PROPTEST_CASES=10000 cargo test --test proptest_merge
//! ```

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::Value;

use progression_sync::reconcile::{merge, reconcile};
use progression_sync::{schema, ExtraValue, PlayerRecord, Stamp};

// =============================================================================
// Strategies
// =============================================================================

fn mission_key() -> impl Strategy<Value = String> {
    prop_oneof![Just("mission_1"), Just("mission_2"), Just("mission_3"), Just("mission_4")]
        .prop_map(String::from)
}

fn extra_value() -> impl Strategy<Value = ExtraValue> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(ExtraValue::Int),
        any::<bool>().prop_map(ExtraValue::Bool),
        "[a-z]{0,8}".prop_map(ExtraValue::Str),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(ExtraValue::Map)
    })
}

fn record_strategy() -> impl Strategy<Value = PlayerRecord> {
    (
        0u32..1_000,
        0i64..10_000,
        prop::collection::btree_map(mission_key(), 0i64..500, 0..4),
        prop::collection::btree_map("[a-c]", extra_value(), 0..3),
    )
        .prop_map(|(level, last_seen_at, progress, extra)| PlayerRecord {
            id: "p1".into(),
            display_name: "Alex".into(),
            level,
            last_seen_at,
            progress,
            extra,
            stamp: Stamp::default(),
        })
}

/// Arbitrary JSON, including shapes no decoder accepts.
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        any::<f64>().prop_map(|f| serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)),
        ".*".prop_map(Value::String),
        // Field names the decoders look for
        prop_oneof![
            Just("data"), Just("stamp"), Just("schema"), Just("metadata"), Just("uuid"), Just("level")
        ]
        .prop_map(|s| Value::String(s.to_string())),
    ];

    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::hash_map(
                prop_oneof![
                    Just("data".to_string()),
                    Just("stamp".to_string()),
                    Just("schema".to_string()),
                    Just("metadata".to_string()),
                    Just("progress".to_string()),
                    Just("missionProgress".to_string()),
                    Just("level".to_string()),
                    ".*".prop_map(String::from),
                ],
                inner,
                0..6
            )
            .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

// =============================================================================
// Merge properties
// =============================================================================

proptest! {
    #[test]
    fn merge_is_idempotent(a in record_strategy(), b in record_strategy()) {
        let ab = merge(&a, &b);
        prop_assert_eq!(merge(&ab, &b), ab);
    }

    #[test]
    fn merge_is_deterministic(a in record_strategy(), b in record_strategy()) {
        prop_assert_eq!(merge(&a, &b), merge(&a, &b));
    }

    #[test]
    fn merge_takes_max_of_monotonic_fields(a in record_strategy(), b in record_strategy()) {
        let merged = merge(&a, &b);
        prop_assert_eq!(merged.level, a.level.max(b.level));
        prop_assert_eq!(merged.last_seen_at, a.last_seen_at.max(b.last_seen_at));

        let keys: std::collections::BTreeSet<&String> = a.progress.keys().chain(b.progress.keys()).collect();
        prop_assert_eq!(merged.progress.len(), keys.len());
        for key in keys {
            prop_assert_eq!(merged.progress_of(key), a.progress_of(key).max(b.progress_of(key)));
        }
    }

    #[test]
    fn merge_monotonic_fields_commute(a in record_strategy(), b in record_strategy()) {
        let ab = merge(&a, &b);
        let ba = merge(&b, &a);
        prop_assert_eq!(ab.level, ba.level);
        prop_assert_eq!(ab.last_seen_at, ba.last_seen_at);
        prop_assert_eq!(ab.progress, ba.progress);
    }

    #[test]
    fn merge_extra_prefers_remote(a in record_strategy(), b in record_strategy()) {
        let merged = merge(&a, &b);
        for (key, value) in &b.extra {
            prop_assert_eq!(merged.extra.get(key), Some(value));
        }
        for (key, value) in &a.extra {
            if !b.extra.contains_key(key) {
                prop_assert_eq!(merged.extra.get(key), Some(value));
            }
        }
    }

    #[test]
    fn reconcile_with_self_changes_nothing(a in record_strategy()) {
        let result = reconcile(&a, &a);
        prop_assert!(!result.changed);
        prop_assert!(result.merged.same_content(&a));
    }
}

// =============================================================================
// Decoder robustness
// =============================================================================

proptest! {
    #[test]
    fn decode_never_panics_on_arbitrary_json(doc in arbitrary_json_strategy()) {
        let raw = doc.to_string();
        let _ = schema::decode("p1", &raw);
    }

    #[test]
    fn decode_never_panics_on_arbitrary_text(raw in ".*") {
        let _ = schema::decode("p1", &raw);
    }

    #[test]
    fn decoded_records_respect_invariants(doc in arbitrary_json_strategy()) {
        if let Ok(record) = schema::decode_value("p1", &doc) {
            prop_assert!(!record.stamp.writer_id.is_empty());
            prop_assert!(!record.id.is_empty());
        }
    }

    #[test]
    fn encoded_records_decode_to_same_content(a in record_strategy()) {
        let decoded = schema::decode("p1", &schema::encode_string(&a)).unwrap();
        prop_assert!(decoded.same_content(&a));
    }
}

#[test]
fn decode_accepts_sparse_current_document() {
    let record = schema::decode("p1", r#"{"data": {}}"#).unwrap();
    assert_eq!(record.id, "p1");
    assert_eq!(record.level, 0);
    assert_eq!(record.progress, BTreeMap::new());
    assert_eq!(record.stamp.writer_id, "unknown");
}
