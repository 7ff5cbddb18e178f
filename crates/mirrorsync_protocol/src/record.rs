//! Entity records.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding the record identity.
pub const ID_FIELD: &str = "id";
/// Field holding the last-modified timestamp.
pub const UPDATED_AT_FIELD: &str = "updatedAt";
/// Snake-case spelling of [`UPDATED_AT_FIELD`] accepted from row-level feeds.
const UPDATED_AT_ALIAS: &str = "updated_at";

/// A mirrored entity: a JSON object with a stable `id`, an optional
/// `updatedAt` and arbitrary domain fields.
///
/// The record is kept as the object it arrived as, so persisting and
/// reloading it is verbatim. Domain fields are never interpreted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord(Map<String, Value>);

impl EntityRecord {
    /// Creates a record with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(ID_FIELD.into(), Value::String(id.into()));
        Self(fields)
    }

    /// Wraps a JSON value. Returns `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Sets a field, builder style.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Sets `updatedAt` as an RFC 3339 string, builder style.
    pub fn with_updated_at(self, at: DateTime<Utc>) -> Self {
        let text = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_field(UPDATED_AT_FIELD, text)
    }

    /// Returns the record id.
    ///
    /// String and integer ids are accepted; anything else (including an
    /// empty string) means the record has no usable identity.
    pub fn id(&self) -> Option<String> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Returns the parsed `updatedAt`, if present and well-formed.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get(UPDATED_AT_FIELD)
            .or_else(|| self.0.get(UPDATED_AT_ALIAS))
            .and_then(parse_timestamp)
    }

    /// Returns a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns all fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Shallow-merges `incoming` over `self`.
    ///
    /// Fields present in `incoming` overwrite; fields absent from it are kept.
    pub fn merge_from(&mut self, incoming: &EntityRecord) {
        for (name, value) in &incoming.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Converts back into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for EntityRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Parses a timestamp field.
///
/// Accepts RFC 3339 strings, zone-less ISO strings (read as UTC) and epoch
/// milliseconds. Fractional milliseconds are truncated. Anything else is
/// `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|at| at.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_accepts_strings_and_numbers() {
        assert_eq!(EntityRecord::new("a1").id(), Some("a1".into()));

        let numeric = EntityRecord::from_value(json!({"id": 42})).unwrap();
        assert_eq!(numeric.id(), Some("42".into()));

        let empty = EntityRecord::from_value(json!({"id": ""})).unwrap();
        assert_eq!(empty.id(), None);

        let missing = EntityRecord::from_value(json!({"x": 1})).unwrap();
        assert_eq!(missing.id(), None);
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(EntityRecord::from_value(json!([1, 2])).is_none());
        assert!(EntityRecord::from_value(Value::Null).is_none());
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(parse_timestamp(&json!("2024-01-01T00:00:00Z")), Some(expected));
        assert_eq!(
            parse_timestamp(&json!("2024-01-01T02:00:00+02:00")),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("2024-01-01T00:00:00.000")), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_704_067_200_000_i64)), Some(expected));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn fractional_epoch_millis_are_truncated() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(parse_timestamp(&json!(1_704_067_200_000.0_f64)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_704_067_200_000.9_f64)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1e300_f64)), None);

        let stored = EntityRecord::new("a1").with_field("updatedAt", json!(1_704_067_200_000.0_f64));
        assert!(stored.updated_at().is_some());
    }

    #[test]
    fn updated_at_accepts_snake_case() {
        let record = EntityRecord::from_value(json!({
            "id": "a1",
            "updated_at": "2024-03-01T12:00:00Z"
        }))
        .unwrap();
        assert!(record.updated_at().is_some());
    }

    #[test]
    fn shallow_merge_preserves_absent_fields() {
        let mut existing = EntityRecord::new("a1")
            .with_field("title", "draft")
            .with_field("size", 10);
        let incoming = EntityRecord::new("a1").with_field("title", "final");

        existing.merge_from(&incoming);

        assert_eq!(existing.get("title"), Some(&json!("final")));
        assert_eq!(existing.get("size"), Some(&json!(10)));
    }

    #[test]
    fn serializes_as_plain_object() {
        let record = EntityRecord::new("a1").with_field("x", 1);
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"id":"a1","x":1}"#);
        let back: EntityRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
