//! Configuration for the sync engine.

use mirrorsync_protocol::{EntityKind, ListQuery};
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Namespace prefixed to persisted keys and feed channel names.
    pub namespace: String,
    /// Persisted state format version, part of every storage key.
    pub storage_version: u32,
    /// Remote API base URL.
    pub api_base_url: String,
    /// List endpoint path for the primary kind.
    pub list_path: String,
    /// Page size of the authoritative list fetch.
    pub page_size: u32,
    /// Kind fetched by `sync()` and replaced wholesale.
    pub primary_kind: EntityKind,
    /// Kind of the record embedded on primary records.
    pub nested_kind: EntityKind,
    /// Field on primary records holding the embedded record.
    pub nested_field: String,
    /// Request timeout for the Remote API.
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            namespace: "mirrorsync".into(),
            storage_version: 1,
            api_base_url: api_base_url.into(),
            list_path: "/api/assets".into(),
            page_size: 50,
            primary_kind: EntityKind::Asset,
            nested_kind: EntityKind::Job,
            nested_field: "latestJob".into(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the persisted state format version.
    pub fn with_storage_version(mut self, version: u32) -> Self {
        self.storage_version = version;
        self
    }

    /// Sets the list endpoint path.
    pub fn with_list_path(mut self, path: impl Into<String>) -> Self {
        self.list_path = path.into();
        self
    }

    /// Sets the page size. Zero is raised to one.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the embedded record field and its kind.
    pub fn with_nested(mut self, field: impl Into<String>, kind: EntityKind) -> Self {
        self.nested_field = field.into();
        self.nested_kind = kind;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns `<namespace>:v<version>:<suffix>`.
    pub fn storage_key(&self, suffix: &str) -> String {
        format!("{}:v{}:{}", self.namespace, self.storage_version, suffix)
    }

    /// Returns the persisted key of a kind's collection.
    pub fn collection_key(&self, kind: EntityKind) -> String {
        self.storage_key(kind.storage_suffix())
    }

    /// Returns the persisted key of the mutation queue.
    pub fn mutations_key(&self) -> String {
        self.storage_key("mutations")
    }

    /// Returns every persisted key.
    pub fn all_storage_keys(&self) -> Vec<String> {
        EntityKind::ALL
            .iter()
            .map(|kind| self.collection_key(*kind))
            .chain(std::iter::once(self.mutations_key()))
            .collect()
    }

    /// Returns the feed channel name of a kind: `<namespace>:<Kind>`.
    pub fn channel_name(&self, kind: EntityKind) -> String {
        format!("{}:{}", self.namespace, kind.name())
    }

    /// Returns the authoritative list query.
    pub fn list_query(&self) -> ListQuery {
        ListQuery::first_page(self.list_path.clone(), self.page_size)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}
