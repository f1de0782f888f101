// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Versioned document schema for persisted player records.
//!
//! One document per player, stored under `player_<id>`:
//!
//! ```json
//! {
//!   "id": "069a79f4",
//!   "data": {
//!     "id": "069a79f4",
//!     "displayName": "Notch",
//!     "level": 3,
//!     "lastSeenAt": 1767084657058,
//!     "progress": {"mission_4": 10},
//!     "extra": {"rank": "gold"}
//!   },
//!   "writtenAt": 1767084657058,
//!   "stamp": {"writerId": "survival-1", "writtenAt": 1767084657058, "version": 1767084657058},
//!   "schema": 1
//! }
//! ```
//!
//! Decoding is lenient on field level (missing fields take defaults,
//! non-numeric progress entries are skipped) and strict on shape: a payload
//! that is not JSON, or has no `data` object, is a [`DecodeError`].
//! Documents written before the schema tag existed are routed to the
//! [`legacy`] decoder.
//!
//! # Example
//!
//! ```
//! use progression_sync::{schema, PlayerRecord};
//!
//! let mut record = PlayerRecord::new("p1", "Alex");
//! record.level = 7;
//!
//! let raw = schema::encode_string(&record);
//! let decoded = schema::decode("p1", &raw).unwrap();
//! assert_eq!(decoded, record);
//! ```

pub mod legacy;

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::DecodeError;
use crate::record::{ExtraValue, PlayerRecord, Stamp, UNKNOWN_WRITER};

/// Schema tag written by [`encode`].
pub const SCHEMA_VERSION: u64 = 1;

/// Longest document prefix included in diagnostics.
const PREVIEW_CHARS: usize = 256;

/// Build the stored document for a record.
pub fn encode(record: &PlayerRecord) -> Value {
    let extra: Map<String, Value> = record
        .extra
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();

    json!({
        "id": record.id,
        "data": {
            "id": record.id,
            "displayName": record.display_name,
            "level": record.level,
            "lastSeenAt": record.last_seen_at,
            "progress": record.progress,
            "extra": Value::Object(extra),
        },
        "writtenAt": record.stamp.written_at,
        "stamp": {
            "writerId": record.stamp.writer_id,
            "writtenAt": record.stamp.written_at,
            "version": record.stamp.version,
        },
        "schema": SCHEMA_VERSION,
    })
}

/// Serialized form of [`encode`].
pub fn encode_string(record: &PlayerRecord) -> String {
    encode(record).to_string()
}

/// Decode raw document text. `fallback_id` is used when the document omits the id.
pub fn decode(fallback_id: &str, raw: &str) -> Result<PlayerRecord, DecodeError> {
    let doc: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    decode_value(fallback_id, &doc)
}

/// Decode an already-parsed document.
pub fn decode_value(fallback_id: &str, doc: &Value) -> Result<PlayerRecord, DecodeError> {
    let root = doc.as_object().ok_or(DecodeError::NotAnObject)?;

    match root.get("schema").and_then(Value::as_u64) {
        Some(0) => legacy::decode(fallback_id, root),
        Some(SCHEMA_VERSION) => decode_current(fallback_id, root),
        Some(other) => Err(DecodeError::UnsupportedSchema(other)),
        None if legacy::looks_legacy(root) => legacy::decode(fallback_id, root),
        None => decode_current(fallback_id, root),
    }
}

fn decode_current(fallback_id: &str, root: &Map<String, Value>) -> Result<PlayerRecord, DecodeError> {
    let data = root
        .get("data")
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingData)?;

    let id = str_of(data.get("id"))
        .or_else(|| str_of(root.get("id")))
        .unwrap_or(fallback_id)
        .to_string();

    let stamp = match root.get("stamp").and_then(Value::as_object) {
        Some(stamp) => Stamp {
            writer_id: str_of(stamp.get("writerId"))
                .unwrap_or(UNKNOWN_WRITER)
                .to_string(),
            written_at: int_of(stamp.get("writtenAt"))
                .or_else(|| int_of(root.get("writtenAt")))
                .unwrap_or(0),
            version: int_of(stamp.get("version")).unwrap_or(0),
        },
        None => Stamp {
            written_at: int_of(root.get("writtenAt")).unwrap_or(0),
            ..Stamp::default()
        },
    };

    Ok(PlayerRecord {
        id,
        display_name: str_of(data.get("displayName")).unwrap_or_default().to_string(),
        level: level_of(data.get("level")),
        last_seen_at: int_of(data.get("lastSeenAt")).unwrap_or(0),
        progress: progress_of(data.get("progress")),
        extra: extra_of(data.get("extra")),
        stamp,
    })
}

/// First characters of a raw document, for log lines.
pub fn preview(raw: &str) -> &str {
    match raw.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

/// Non-blank string field.
pub(crate) fn str_of(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Integer view of a JSON number; floats truncate, out-of-range saturates.
pub(crate) fn int_of(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|_| i64::MAX))
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

pub(crate) fn level_of(value: Option<&Value>) -> u32 {
    int_of(value)
        .map(|level| level.clamp(0, i64::from(u32::MAX)) as u32)
        .unwrap_or(0)
}

pub(crate) fn progress_of(value: Option<&Value>) -> BTreeMap<String, i64> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter(|(_, v)| v.is_number())
                .filter_map(|(k, v)| int_of(Some(v)).map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn extra_of(value: Option<&Value>) -> BTreeMap<String, ExtraValue> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| ExtraValue::from_json(v).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(record: PlayerRecord) -> PlayerRecord {
        PlayerRecord {
            stamp: Stamp {
                writer_id: "survival-1".into(),
                written_at: 1_700_000_000_000,
                version: 1_700_000_000_000,
            },
            ..record
        }
    }

    #[test]
    fn test_encode_shape() {
        let mut record = stamped(PlayerRecord::new("p1", "Alex"));
        record.progress.insert("mission_4".into(), 10);
        record.extra.insert("rank".into(), ExtraValue::from("gold"));

        let doc = encode(&record);
        assert_eq!(doc["id"], "p1");
        assert_eq!(doc["data"]["displayName"], "Alex");
        assert_eq!(doc["data"]["progress"]["mission_4"], 10);
        assert_eq!(doc["data"]["extra"]["rank"], "gold");
        assert_eq!(doc["stamp"]["writerId"], "survival-1");
        assert_eq!(doc["writtenAt"], 1_700_000_000_000i64);
        assert_eq!(doc["schema"], SCHEMA_VERSION);
    }

    #[test]
    fn test_decode_current_with_extra_and_stamp() {
        let mut record = stamped(PlayerRecord::new("p1", "Alex"));
        record.level = 12;
        record.extra.insert("vip".into(), ExtraValue::Bool(true));

        let decoded = decode("ignored", &encode_string(&record)).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let decoded = decode("p9", r#"{"data": {}}"#).unwrap();
        assert_eq!(decoded.id, "p9");
        assert_eq!(decoded.display_name, "");
        assert_eq!(decoded.level, 0);
        assert!(decoded.progress.is_empty());
        assert!(decoded.extra.is_empty());
        assert_eq!(decoded.stamp.writer_id, UNKNOWN_WRITER);
    }

    #[test]
    fn test_non_numeric_progress_is_skipped() {
        let raw = r#"{"data": {"progress": {"mission_1": 5, "mission_2": "lots", "mission_3": null, "mission_4": 2.9}}, "schema": 1}"#;
        let decoded = decode("p1", raw).unwrap();
        assert_eq!(decoded.progress.len(), 2);
        assert_eq!(decoded.progress_of("mission_1"), 5);
        assert_eq!(decoded.progress_of("mission_4"), 2);
    }

    #[test]
    fn test_negative_level_clamps_to_zero() {
        let decoded = decode("p1", r#"{"data": {"level": -4}}"#).unwrap();
        assert_eq!(decoded.level, 0);
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(decode("p1", "not json"), Err(DecodeError::InvalidJson(_))));
        assert_eq!(decode("p1", "[1, 2]"), Err(DecodeError::NotAnObject));
        assert_eq!(decode("p1", r#"{"id": "p1"}"#), Err(DecodeError::MissingData));
        assert_eq!(decode("p1", r#"{"data": 5, "schema": 1}"#), Err(DecodeError::MissingData));
        assert_eq!(
            decode("p1", r#"{"data": {}, "schema": 9}"#),
            Err(DecodeError::UnsupportedSchema(9))
        );
    }

    #[test]
    fn test_stamp_falls_back_to_top_level_written_at() {
        let decoded = decode("p1", r#"{"data": {}, "writtenAt": 55}"#).unwrap();
        assert_eq!(decoded.stamp.written_at, 55);
        assert_eq!(decoded.stamp.writer_id, UNKNOWN_WRITER);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let raw = "é".repeat(400);
        let p = preview(&raw);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
