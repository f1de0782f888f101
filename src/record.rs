//! Player record data structure.
//!
//! A [`PlayerRecord`] is the unit that flows between the cache, the document
//! store and the reconciler. Each record carries a [`Stamp`] naming the
//! instance that last wrote it.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

/// Writer id assumed for records stored without a stamp.
pub const UNKNOWN_WRITER: &str = "unknown";

/// Current time as epoch millis.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Synchronization metadata attached to every persisted version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    /// Instance that wrote this version
    pub writer_id: String,
    /// Write time (epoch millis)
    pub written_at: i64,
    /// Strictly increasing per writer
    pub version: i64,
}

impl Default for Stamp {
    fn default() -> Self {
        Self {
            writer_id: UNKNOWN_WRITER.to_string(),
            written_at: 0,
            version: 0,
        }
    }
}

impl Stamp {
    #[must_use]
    pub fn is_from(&self, instance_id: &str) -> bool {
        self.writer_id == instance_id
    }
}

/// Opaque auxiliary value stored under [`PlayerRecord::extra`].
///
/// JSON `null` has no representation: conversions drop it.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    List(Vec<ExtraValue>),
    Map(BTreeMap<String, ExtraValue>),
}

impl ExtraValue {
    /// Convert a JSON value. Returns `None` for `null`.
    ///
    /// ```
    /// use progression_sync::ExtraValue;
    /// use serde_json::json;
    ///
    /// let v = ExtraValue::from_json(&json!({"rank": "gold", "streak": 4, "gone": null})).unwrap();
    /// match v {
    ///     ExtraValue::Map(m) => {
    ///         assert_eq!(m.get("streak"), Some(&ExtraValue::Int(4)));
    ///         assert!(!m.contains_key("gone"));
    ///     }
    ///     _ => unreachable!(),
    /// }
    /// assert_eq!(ExtraValue::from_json(&json!(null)), None);
    /// ```
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Array(items) => Some(Self::List(items.iter().filter_map(Self::from_json).collect())),
            Value::Object(map) => Some(Self::Map(
                map.iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// Convert back to JSON. Non-finite floats become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::Number((*i).into()),
            Self::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Self::Str(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<i64> for ExtraValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for ExtraValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<bool> for ExtraValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Per-player persisted progression state.
///
/// # Example
///
/// ```
/// use progression_sync::PlayerRecord;
///
/// let record = PlayerRecord::new("069a79f4", "Notch");
/// assert_eq!(record.level, 0);
/// assert!(record.progress.is_empty());
/// assert_eq!(record.stamp.writer_id, "unknown");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    /// Stable player identifier
    pub id: String,
    /// Last known name
    pub display_name: String,
    /// Never merged downward
    pub level: u32,
    /// Last activity (epoch millis)
    pub last_seen_at: i64,
    /// Mission key → progress count
    pub progress: BTreeMap<String, i64>,
    /// Auxiliary state
    pub extra: BTreeMap<String, ExtraValue>,
    pub stamp: Stamp,
}

impl PlayerRecord {
    /// First-contact record: level 0, empty maps, seen now.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            level: 0,
            last_seen_at: now_millis(),
            progress: BTreeMap::new(),
            extra: BTreeMap::new(),
            stamp: Stamp::default(),
        }
    }

    /// Equal on every field except the stamp.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.display_name == other.display_name
            && self.level == other.level
            && self.last_seen_at == other.last_seen_at
            && self.progress == other.progress
            && self.extra == other.extra
    }

    /// Progress for a mission key, zero if absent.
    #[must_use]
    pub fn progress_of(&self, key: &str) -> i64 {
        self.progress.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extra_value_numbers() {
        assert_eq!(ExtraValue::from_json(&json!(7)), Some(ExtraValue::Int(7)));
        assert_eq!(ExtraValue::from_json(&json!(1.5)), Some(ExtraValue::Float(1.5)));
        // Beyond i64 range falls back to a float
        assert!(matches!(
            ExtraValue::from_json(&json!(u64::MAX)),
            Some(ExtraValue::Float(_))
        ));
    }

    #[test]
    fn test_extra_value_drops_nulls_in_lists() {
        let v = ExtraValue::from_json(&json!([1, null, "a"])).unwrap();
        assert_eq!(v, ExtraValue::List(vec![ExtraValue::Int(1), ExtraValue::Str("a".into())]));
    }

    #[test]
    fn test_extra_value_nested_to_json() {
        let source = json!({"pet": {"name": "Rex", "age": 3}, "vip": true});
        let v = ExtraValue::from_json(&source).unwrap();
        assert_eq!(v.to_json(), source);
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert_eq!(ExtraValue::Float(f64::NAN).to_json(), Value::Null);
    }

    #[test]
    fn test_same_content_ignores_stamp() {
        let a = PlayerRecord::new("p1", "Alex");
        let mut b = a.clone();
        b.stamp = Stamp {
            writer_id: "lobby-1".into(),
            written_at: 42,
            version: 42,
        };
        assert!(a.same_content(&b));
        assert_ne!(a, b);

        b.level = 1;
        assert!(!a.same_content(&b));
    }

    #[test]
    fn test_progress_of_defaults_to_zero() {
        let mut r = PlayerRecord::new("p1", "Alex");
        r.progress.insert("mission_1".into(), 12);
        assert_eq!(r.progress_of("mission_1"), 12);
        assert_eq!(r.progress_of("mission_2"), 0);
    }

    #[test]
    fn test_stamp_is_from() {
        let stamp = Stamp {
            writer_id: "survival-2".into(),
            ..Default::default()
        };
        assert!(stamp.is_from("survival-2"));
        assert!(!stamp.is_from("survival-1"));
    }
}
