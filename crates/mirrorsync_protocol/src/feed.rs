//! Change feed events.

use crate::record::EntityRecord;
use serde_json::Value;

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEventType {
    /// Row was inserted.
    Insert,
    /// Row was updated.
    Update,
    /// Row was deleted.
    Delete,
}

impl FeedEventType {
    /// Parses an event type name, case-insensitively.
    ///
    /// Anything that is not recognised as a delete or insert is treated as
    /// an update, so unexpected types still converge through the merge rule.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("delete") {
            FeedEventType::Delete
        } else if name.eq_ignore_ascii_case("insert") {
            FeedEventType::Insert
        } else {
            FeedEventType::Update
        }
    }
}

/// A normalized row-level change from the change feed.
///
/// `new` is set for inserts and updates, `old` for deletes. Feeds that send
/// an empty object for the missing side normalize to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    /// Type of change.
    pub event_type: FeedEventType,
    /// Row after the change.
    pub new: Option<EntityRecord>,
    /// Row before the change.
    pub old: Option<EntityRecord>,
}

impl FeedEvent {
    /// Creates an insert event.
    pub fn insert(record: EntityRecord) -> Self {
        Self {
            event_type: FeedEventType::Insert,
            new: Some(record),
            old: None,
        }
    }

    /// Creates an update event.
    pub fn update(record: EntityRecord) -> Self {
        Self {
            event_type: FeedEventType::Update,
            new: Some(record),
            old: None,
        }
    }

    /// Creates a delete event.
    pub fn delete(old: EntityRecord) -> Self {
        Self {
            event_type: FeedEventType::Delete,
            new: None,
            old: Some(old),
        }
    }

    /// Normalizes a raw feed payload.
    ///
    /// Accepts `{eventType, new, old}` as well as the `{type, record,
    /// old_record}` spelling. Returns `None` if the payload is not an object.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        let field = |names: &[&str]| names.iter().find_map(|name| object.get(*name));

        let event_type = field(&["eventType", "event_type", "type"])
            .and_then(Value::as_str)
            .map(FeedEventType::from_name)
            .unwrap_or(FeedEventType::Update);

        Some(Self {
            event_type,
            new: field(&["new", "record"]).and_then(non_empty_record),
            old: field(&["old", "old_record"]).and_then(non_empty_record),
        })
    }

    /// Returns the id of the row this event targets.
    pub fn target_id(&self) -> Option<String> {
        match self.event_type {
            FeedEventType::Delete => self.old.as_ref().and_then(EntityRecord::id),
            FeedEventType::Insert | FeedEventType::Update => {
                self.new.as_ref().and_then(EntityRecord::id)
            }
        }
    }
}

fn non_empty_record(value: &Value) -> Option<EntityRecord> {
    match value {
        Value::Object(fields) if !fields.is_empty() => Some(EntityRecord::from(fields.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_delete() {
        let event = FeedEvent::from_payload(&json!({
            "eventType": "DELETE",
            "new": {},
            "old": {"id": "a1"}
        }))
        .unwrap();

        assert_eq!(event.event_type, FeedEventType::Delete);
        assert!(event.new.is_none());
        assert_eq!(event.target_id(), Some("a1".into()));
    }

    #[test]
    fn normalizes_insert_with_alternate_spelling() {
        let event = FeedEvent::from_payload(&json!({
            "type": "INSERT",
            "record": {"id": "j1", "state": "queued"},
            "old_record": null
        }))
        .unwrap();

        assert_eq!(event.event_type, FeedEventType::Insert);
        assert_eq!(event.target_id(), Some("j1".into()));
        assert!(event.old.is_none());
    }

    #[test]
    fn unknown_type_is_update() {
        let event = FeedEvent::from_payload(&json!({
            "eventType": "UPSERT",
            "new": {"id": "a1"}
        }))
        .unwrap();
        assert_eq!(event.event_type, FeedEventType::Update);
    }

    #[test]
    fn missing_type_is_update() {
        let event = FeedEvent::from_payload(&json!({"new": {"id": "a1"}})).unwrap();
        assert_eq!(event.event_type, FeedEventType::Update);
    }

    #[test]
    fn non_object_payload() {
        assert!(FeedEvent::from_payload(&json!("DELETE")).is_none());
    }

    #[test]
    fn constructors() {
        let event = FeedEvent::delete(EntityRecord::new("a1"));
        assert_eq!(event.target_id(), Some("a1".into()));

        let event = FeedEvent::update(EntityRecord::new("a2"));
        assert_eq!(event.target_id(), Some("a2".into()));
    }
}
