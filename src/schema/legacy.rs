//! Decoder for documents written before the schema tag was introduced.
//!
//! ```json
//! {
//!   "_id": "player_069a79f4",
//!   "data": {"uuid": "069a79f4", "name": "Notch", "level": 3, "lastSeen": 1700000000000,
//!            "missionProgress": {"mission_4": 10}, "customData": {}},
//!   "lastUpdated": 1700000000000,
//!   "metadata": {"lastModified": 1700000000000, "lastModifiedBy": "survival-1", "version": 1}
//! }
//! ```

use serde_json::{Map, Value};

use super::{extra_of, int_of, level_of, progress_of, str_of};
use crate::cache::PLAYER_NAMESPACE;
use crate::error::DecodeError;
use crate::record::{PlayerRecord, Stamp, UNKNOWN_WRITER};

/// Heuristic used when a document carries no schema tag.
pub(crate) fn looks_legacy(root: &Map<String, Value>) -> bool {
    if root.contains_key("metadata") || root.contains_key("lastUpdated") {
        return true;
    }
    root.get("data")
        .and_then(Value::as_object)
        .is_some_and(|data| data.contains_key("uuid") || data.contains_key("missionProgress"))
}

pub(crate) fn decode(fallback_id: &str, root: &Map<String, Value>) -> Result<PlayerRecord, DecodeError> {
    let data = root
        .get("data")
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingData)?;

    let keyed_id = str_of(root.get("_id")).map(|key| {
        key.strip_prefix(PLAYER_NAMESPACE)
            .and_then(|rest| rest.strip_prefix('_'))
            .unwrap_or(key)
    })
    .filter(|id| !id.is_empty());
    let id = str_of(data.get("uuid"))
        .or(keyed_id)
        .unwrap_or(fallback_id)
        .to_string();

    let metadata = root.get("metadata").and_then(Value::as_object);
    let written_at = metadata
        .and_then(|m| int_of(m.get("lastModified")))
        .or_else(|| int_of(root.get("lastUpdated")))
        .unwrap_or(0);

    let stamp = Stamp {
        writer_id: metadata
            .and_then(|m| str_of(m.get("lastModifiedBy")))
            .unwrap_or(UNKNOWN_WRITER)
            .to_string(),
        written_at,
        version: metadata
            .and_then(|m| int_of(m.get("version")))
            .unwrap_or(written_at),
    };

    Ok(PlayerRecord {
        id,
        display_name: str_of(data.get("name")).unwrap_or_default().to_string(),
        level: level_of(data.get("level")),
        last_seen_at: int_of(data.get("lastSeen")).unwrap_or(0),
        progress: progress_of(data.get("missionProgress")),
        extra: extra_of(data.get("customData")),
        stamp,
    })
}
