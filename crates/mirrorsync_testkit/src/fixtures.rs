//! Test fixtures and engine helpers.

use crate::feed::ChannelFeed;
use crate::remote::ScriptedRemote;
use chrono::{DateTime, TimeZone, Utc};
use mirrorsync_engine::{Credential, SyncConfig, SyncEngine};
use mirrorsync_protocol::{EntityRecord, MutationRequest, PendingMutation};
use mirrorsync_storage::{FileStore, InMemoryStore, KeyValueStore};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Namespace used by harness engines.
pub const TEST_NAMESPACE: &str = "test";

/// Returns a UTC timestamp `secs` seconds after 2024-01-01T00:00:00Z.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_704_067_200 + secs, 0)
        .single()
        .expect("timestamp in range")
}

/// Creates a record with an id, an `updatedAt` and extra fields.
pub fn record(id: &str, secs: i64, fields: Value) -> EntityRecord {
    let mut record = EntityRecord::new(id).with_updated_at(ts(secs));
    if let Value::Object(map) = fields {
        for (name, value) in map {
            record = record.with_field(name, value);
        }
    }
    record
}

/// Creates an asset record embedding a job under `latestJob`.
pub fn asset_with_job(id: &str, secs: i64, job: EntityRecord) -> EntityRecord {
    EntityRecord::new(id)
        .with_updated_at(ts(secs))
        .with_field("latestJob", job.into_value())
}

/// Creates a pending mutation with a fixed id.
pub fn mutation(id: &str, method: &str, path: &str) -> PendingMutation {
    PendingMutation::with_id(id, MutationRequest::new(method, path, Some(json!({"source": id}))))
}

/// Ids of a snapshot, in order.
pub fn ids(records: &[EntityRecord]) -> Vec<String> {
    records.iter().filter_map(EntityRecord::id).collect()
}

/// Harness configuration.
pub fn test_config() -> SyncConfig {
    SyncConfig::new("http://remote.test").with_namespace(TEST_NAMESPACE)
}

/// An engine wired to scripted collaborators.
pub struct TestHarness {
    /// The engine under test.
    pub engine: SyncEngine,
    /// Remote API double.
    pub remote: Arc<ScriptedRemote>,
    /// Change feed double, if the engine has one.
    pub feed: Option<Arc<ChannelFeed>>,
    /// Backing key-value store.
    pub storage: Arc<dyn KeyValueStore>,
    /// Temporary directory of a file-backed store.
    _temp_dir: Option<TempDir>,
}

impl TestHarness {
    /// Engine with a feed over an in-memory store.
    pub fn new() -> Self {
        Self::build(Arc::new(InMemoryStore::new()), true, None)
    }

    /// Engine without a feed over an in-memory store.
    pub fn without_feed() -> Self {
        Self::build(Arc::new(InMemoryStore::new()), false, None)
    }

    /// Engine with a feed over an existing store.
    pub fn with_storage(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::build(storage, true, None)
    }

    /// Engine with a feed over a file store in a temporary directory.
    pub fn file_backed() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Failed to open file store");
        Self::build(Arc::new(store), true, Some(temp_dir))
    }

    fn build(storage: Arc<dyn KeyValueStore>, with_feed: bool, temp_dir: Option<TempDir>) -> Self {
        let remote = Arc::new(ScriptedRemote::new());
        let feed = with_feed.then(|| Arc::new(ChannelFeed::new()));
        let engine = SyncEngine::new(
            test_config(),
            remote.clone(),
            storage.clone(),
            feed.clone().map(|f| f as Arc<dyn mirrorsync_engine::ChangeFeedClient>),
        );
        Self {
            engine,
            remote,
            feed,
            storage,
            _temp_dir: temp_dir,
        }
    }

    /// Opens a second engine over the same store, as after a restart.
    ///
    /// A file-backed harness must be dropped first; the store directory is
    /// locked while open.
    pub fn restart(&self) -> SyncEngine {
        SyncEngine::new(test_config(), self.remote.clone(), self.storage.clone(), None)
    }

    /// Sets a credential on the engine.
    pub fn sign_in(&self) {
        self.engine.set_credential(Some(Credential::new("test-token")));
    }

    /// The feed double. Panics for a harness without a feed.
    pub fn feed(&self) -> &ChannelFeed {
        self.feed.as_deref().expect("harness has no feed")
    }

    /// Feed channel name of a kind.
    pub fn channel(&self, kind: mirrorsync_protocol::EntityKind) -> String {
        self.engine.config().channel_name(kind)
    }

    /// Reads a persisted key as JSON.
    pub fn persisted(&self, suffix: &str) -> Option<Value> {
        let key = self.engine.config().storage_key(suffix);
        self.storage
            .get(&key)
            .expect("storage read")
            .map(|bytes| serde_json::from_slice(&bytes).expect("persisted JSON"))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Awaits `future` with a five second limit.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
