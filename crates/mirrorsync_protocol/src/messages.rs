//! Remote API request and response shapes.

use crate::record::EntityRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A paginated list query against the Remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// List endpoint path, e.g. `/api/assets`.
    pub path: String,
    /// Page number (1-based).
    pub page: u32,
    /// Maximum number of items per page.
    pub page_size: u32,
}

impl ListQuery {
    /// Creates a query for the first page.
    pub fn first_page(path: impl Into<String>, page_size: u32) -> Self {
        Self {
            path: path.into(),
            page: 1,
            page_size,
        }
    }

    /// Returns the query string pairs.
    pub fn query_pairs(&self) -> [(&'static str, String); 2] {
        [
            ("page", self.page.to_string()),
            ("pageSize", self.page_size.to_string()),
        ]
    }

    /// Renders `path?page=<n>&pageSize=<n>`.
    pub fn to_path_and_query(&self) -> String {
        format!(
            "{}?page={}&pageSize={}",
            self.path, self.page, self.page_size
        )
    }
}

/// A list response: `{ items: [...] }`.
///
/// Items are kept as raw JSON so malformed entries can be skipped one by one
/// instead of failing the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Returned rows.
    #[serde(default)]
    pub items: Vec<Value>,
}

impl ListResponse {
    /// Creates a response from records.
    pub fn from_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        Self {
            items: records.into_iter().map(EntityRecord::into_value).collect(),
        }
    }

    /// Returns the items that are JSON objects.
    pub fn records(&self) -> impl Iterator<Item = EntityRecord> + '_ {
        self.items
            .iter()
            .filter_map(|item| EntityRecord::from_value(item.clone()))
    }
}

/// The outcome of replaying one mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded body, if it was JSON.
    pub body: Option<Value>,
}

impl RemoteResponse {
    /// Creates a response with no body.
    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_query_rendering() {
        let query = ListQuery::first_page("/api/assets", 50);
        assert_eq!(query.to_path_and_query(), "/api/assets?page=1&pageSize=50");
        assert_eq!(query.query_pairs()[1], ("pageSize", "50".to_string()));
    }

    #[test]
    fn list_response_skips_non_objects() {
        let response: ListResponse =
            serde_json::from_value(json!({"items": [{"id": "a1"}, 7, {"id": "a2"}]})).unwrap();
        let ids: Vec<_> = response.records().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[test]
    fn list_response_missing_items() {
        let response: ListResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.items.is_empty());
    }

    #[test]
    fn remote_response_success_range() {
        assert!(RemoteResponse::status(200).is_success());
        assert!(RemoteResponse::status(204).is_success());
        assert!(!RemoteResponse::status(409).is_success());
        assert!(!RemoteResponse::status(500).is_success());
    }
}
