//! Pending mutations for the replay queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A request to replay against the Remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Path relative to the API base URL, e.g. `/api/assets/a1`.
    pub path: String,
    /// HTTP method, e.g. `PATCH`.
    pub method: String,
    /// JSON body, sent encoded when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl MutationRequest {
    /// Creates a request. The method is upper-cased.
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            path: path.into(),
            method: method.into().to_ascii_uppercase(),
            body,
        }
    }

    /// Returns true if the request can be replayed: a non-empty method and
    /// a path rooted at `/`.
    pub fn is_well_formed(&self) -> bool {
        !self.method.trim().is_empty() && self.path.starts_with('/')
    }
}

/// A local write that has not been confirmed by the Remote API.
///
/// Entries are created by callers, persisted immediately, replayed in
/// insertion order and removed only on confirmed success.
///
/// # Serialization
///
/// A `request` that cannot be decoded (for example a hand-edited or older
/// persisted queue) loads as `None` rather than failing the whole queue.
/// Such entries stay queued and are skipped by replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Unique id.
    pub id: String,
    /// The request to replay.
    #[serde(default, deserialize_with = "lenient_request")]
    pub request: Option<MutationRequest>,
    /// When the mutation was registered.
    pub created_at: DateTime<Utc>,
}

impl PendingMutation {
    /// Creates a mutation with a fresh v4 id, stamped now.
    pub fn new(request: MutationRequest) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), request)
    }

    /// Creates a mutation with a caller-chosen id, stamped now.
    pub fn with_id(id: impl Into<String>, request: MutationRequest) -> Self {
        Self {
            id: id.into(),
            request: Some(request),
            created_at: Utc::now(),
        }
    }

    /// Returns the request if it can be replayed.
    pub fn replayable_request(&self) -> Option<&MutationRequest> {
        self.request.as_ref().filter(|r| r.is_well_formed())
    }
}

fn lenient_request<'de, D>(deserializer: D) -> Result<Option<MutationRequest>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_assigns_unique_ids() {
        let request = MutationRequest::new("patch", "/api/assets/a1", None);
        let a = PendingMutation::new(request.clone());
        let b = PendingMutation::new(request);
        assert_ne!(a.id, b.id);
        assert_eq!(a.request.as_ref().unwrap().method, "PATCH");
    }

    #[test]
    fn well_formed_requests() {
        assert!(MutationRequest::new("DELETE", "/api/assets/a1", None).is_well_formed());
        assert!(!MutationRequest::new("", "/api/assets/a1", None).is_well_formed());
        assert!(!MutationRequest::new("POST", "api/assets", None).is_well_formed());
    }

    #[test]
    fn serializes_camel_case() {
        let mutation = PendingMutation::with_id(
            "m1",
            MutationRequest::new("POST", "/api/assets", Some(json!({"title": "x"}))),
        );
        let value = serde_json::to_value(&mutation).unwrap();
        assert_eq!(value["id"], "m1");
        assert_eq!(value["request"]["method"], "POST");
        assert_eq!(value["request"]["body"]["title"], "x");
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn malformed_request_loads_as_none() {
        let value = json!([
            {"id": "m1", "request": "garbage", "createdAt": "2024-01-01T00:00:00Z"},
            {"id": "m2", "request": {"path": "/x", "method": "PUT"}, "createdAt": "2024-01-01T00:00:00Z"},
            {"id": "m3", "createdAt": "2024-01-01T00:00:00Z"}
        ]);
        let queue: Vec<PendingMutation> = serde_json::from_value(value).unwrap();

        assert_eq!(queue.len(), 3);
        assert!(queue[0].request.is_none());
        assert!(queue[0].replayable_request().is_none());
        assert!(queue[1].replayable_request().is_some());
        assert!(queue[2].request.is_none());
    }
}
