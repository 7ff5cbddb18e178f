//! The sync coordinator.

use crate::config::SyncConfig;
use crate::connectivity::{ConnectionStatus, ConnectivityMonitor, StatusAction, StatusTrigger};
use crate::entity_store::EntityStore;
use crate::error::SyncResult;
use crate::feed::{ChangeFeedClient, ChangeFeedSubscriber, FeedSink, SubscriptionStatus};
use crate::http::HttpRemoteApi;
use crate::mutation_queue::{FlushReport, MutationQueue};
use crate::persistence::PersistenceAdapter;
use crate::transport::{Credential, RemoteApi};
use chrono::{DateTime, Utc};
use mirrorsync_protocol::{
    EntityKind, EntityRecord, FeedEvent, FeedEventType, ListResponse, MutationRequest,
    PendingMutation,
};
use mirrorsync_storage::KeyValueStore;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Counters describing engine activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// `sync()` calls that applied a list response.
    pub syncs_completed: u64,
    /// `sync()` calls whose list fetch failed.
    pub syncs_failed: u64,
    /// `sync()` calls skipped for lack of a credential.
    pub syncs_skipped: u64,
    /// Feed events that changed a store.
    pub events_applied: u64,
    /// Feed events that left the stores unchanged.
    pub events_ignored: u64,
    /// Mutations confirmed by the Remote API.
    pub mutations_replayed: u64,
    /// Mutations answered with a non-success status.
    pub mutations_rejected: u64,
    /// Mutations that got no answer.
    pub mutations_failed: u64,
    /// Completion time of the last successful sync.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last error observed by `sync()` or the feed.
    pub last_error: Option<String>,
}

/// Outcome of one `sync()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No credential was available.
    Skipped,
    /// The list response was applied.
    Applied {
        /// Records now held for the primary kind.
        primary: usize,
        /// Embedded records merged into the nested kind.
        nested: usize,
    },
    /// The list fetch failed; stores were left as they were.
    Failed,
}

/// Materialized views published to observers.
///
/// Every committed change produces a new value with a higher revision.
#[derive(Debug, Clone, Default)]
pub struct Snapshots {
    by_kind: BTreeMap<EntityKind, Arc<Vec<EntityRecord>>>,
    pending: Arc<Vec<PendingMutation>>,
    revision: u64,
}

impl Snapshots {
    /// Records of `kind`, newest first.
    pub fn get(&self, kind: EntityKind) -> Arc<Vec<EntityRecord>> {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }

    /// Queued mutations, oldest first.
    pub fn pending(&self) -> Arc<Vec<PendingMutation>> {
        Arc::clone(&self.pending)
    }

    /// Monotonic change counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Offline-resilient mirror of the remote entity collections.
///
/// One engine owns every [`EntityStore`] and the [`MutationQueue`] of a
/// session. Handles are cheap to clone and share the same state. Callers
/// only ever see copies: snapshots, the status value and statistics.
///
/// No public operation returns an error. Network and storage failures are
/// logged and leave the cache and queue as they were.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: SyncConfig,
    remote: Arc<dyn RemoteApi>,
    persistence: PersistenceAdapter,
    stores: Mutex<BTreeMap<EntityKind, EntityStore>>,
    queue: MutationQueue,
    feed: ChangeFeedSubscriber,
    monitor: ConnectivityMonitor,
    credential: RwLock<Option<Credential>>,
    snapshots: watch::Sender<Snapshots>,
    stats: RwLock<SyncStats>,
}

impl SyncEngine {
    /// Creates an engine and restores persisted state from `storage`.
    ///
    /// The status starts at `Connecting` when a feed client is given and
    /// `Disabled` otherwise. Nothing is fetched or subscribed until
    /// [`SyncEngine::start`].
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteApi>,
        storage: Arc<dyn KeyValueStore>,
        feed: Option<Arc<dyn ChangeFeedClient>>,
    ) -> Self {
        let persistence = PersistenceAdapter::new(storage);

        let stores: BTreeMap<EntityKind, EntityStore> = EntityKind::ALL
            .iter()
            .map(|kind| {
                let records: Vec<EntityRecord> =
                    persistence.load(&config.collection_key(*kind), Vec::new());
                (*kind, EntityStore::from_records(records))
            })
            .collect();

        let queue = MutationQueue::load(persistence.clone(), config.mutations_key());

        let initial = Snapshots {
            by_kind: stores
                .iter()
                .map(|(kind, store)| (*kind, Arc::new(store.snapshot())))
                .collect(),
            pending: Arc::new(queue.entries()),
            revision: 0,
        };
        let (snapshots, _) = watch::channel(initial);

        let monitor = ConnectivityMonitor::new(feed.is_some());

        Self {
            inner: Arc::new(EngineInner {
                config,
                remote,
                persistence,
                stores: Mutex::new(stores),
                queue,
                feed: ChangeFeedSubscriber::new(feed),
                monitor,
                credential: RwLock::new(None),
                snapshots,
                stats: RwLock::new(SyncStats::default()),
            }),
        }
    }

    /// Creates an engine talking to the Remote API over HTTP.
    pub fn with_http(
        config: SyncConfig,
        storage: Arc<dyn KeyValueStore>,
        feed: Option<Arc<dyn ChangeFeedClient>>,
    ) -> SyncResult<Self> {
        let remote = Arc::new(HttpRemoteApi::from_config(&config)?);
        Ok(Self::new(config, remote, storage, feed))
    }

    /// (Re)initializes the session.
    ///
    /// Stops any running feed channels, resets the status, opens one channel
    /// per entity kind and runs an initial [`SyncEngine::sync`].
    pub async fn start(&self) -> SyncOutcome {
        self.inner.feed.teardown();
        self.inner.apply_trigger(StatusTrigger::Reinitialized);
        self.inner.subscribe_all().await;
        self.inner.sync().await
    }

    /// Stops every feed channel. State and status are kept.
    pub fn shutdown(&self) {
        self.inner.feed.teardown();
    }

    /// Attaches a feed client to an engine that had none and subscribes.
    pub async fn attach_feed(&self, client: Arc<dyn ChangeFeedClient>) {
        self.inner.feed.set_client(client);
        self.inner.monitor.set_feed_available(true);
        self.inner.apply_trigger(StatusTrigger::FeedAvailable);
        self.inner.subscribe_all().await;
    }

    /// Fetches the authoritative page of the primary kind.
    ///
    /// The primary store is replaced wholesale; records embedded under the
    /// nested field are merged into the nested kind's store. On failure the
    /// stores are left untouched. Snapshots are refreshed, state persisted
    /// and the mutation queue flushed either way.
    ///
    /// Calls are not serialized: when two calls overlap, whichever list
    /// response resolves last determines the primary store.
    pub async fn sync(&self) -> SyncOutcome {
        self.inner.sync().await
    }

    /// Applies one change feed event to the store named by `kind_name`.
    ///
    /// Unknown kinds are ignored. Deletes are applied unconditionally;
    /// inserts and updates go through last-writer-wins. Returns true if a
    /// store changed.
    pub fn apply_server_event(&self, kind_name: &str, event: FeedEvent) -> bool {
        self.inner.apply_server_event(kind_name, event)
    }

    /// Queues a mutation for replay and persists the queue.
    pub fn register_mutation(&self, mutation: PendingMutation) {
        self.inner.queue.register(mutation);
        self.inner.publish_pending();
    }

    /// Queues a request under a fresh id and returns the id.
    pub fn queue_request(&self, request: MutationRequest) -> String {
        let mutation = PendingMutation::new(request);
        let id = mutation.id.clone();
        self.register_mutation(mutation);
        id
    }

    /// Removes a queued mutation. Returns true if it was queued.
    pub fn clear_mutation(&self, id: &str) -> bool {
        let removed = self.inner.queue.clear(id);
        self.inner.publish_pending();
        removed
    }

    /// Replays the mutation queue.
    pub async fn flush(&self) -> Option<FlushReport> {
        self.inner.flush().await
    }

    /// Sets or clears the credential used for the Remote API and the feed.
    pub fn set_credential(&self, credential: Option<Credential>) {
        let changed = {
            let mut slot = self.inner.credential.write();
            let changed = credential.is_some() && *slot != credential;
            *slot = credential;
            changed
        };
        if changed {
            let transition = self.inner.apply_trigger(StatusTrigger::CredentialChanged);
            self.inner.run_actions(transition.actions);
        }
    }

    /// Returns true if a credential is set.
    pub fn has_credential(&self) -> bool {
        self.inner.credential.read().is_some()
    }

    /// Reports a network transition.
    pub fn set_network_online(&self, online: bool) {
        let trigger = if online {
            StatusTrigger::NetworkOnline
        } else {
            StatusTrigger::NetworkOffline
        };
        let transition = self.inner.apply_trigger(trigger);
        self.inner.run_actions(transition.actions);
    }

    /// Clears every store, the queue and all persisted state.
    ///
    /// A replay pass already running stops before sending any entry the
    /// reset removed. A `sync()` already in flight is not cancelled: its
    /// response still lands in the cleared stores and is persisted. Call
    /// `set_credential(None)` first and let such syncs finish if that
    /// matters.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.monitor.status()
    }

    /// Subscribes to connection status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.monitor.subscribe()
    }

    /// Current records of `kind`, newest first.
    pub fn snapshot(&self, kind: EntityKind) -> Arc<Vec<EntityRecord>> {
        self.inner.snapshots.borrow().get(kind)
    }

    /// Current snapshots of every kind plus the pending queue.
    pub fn snapshots(&self) -> Snapshots {
        self.inner.snapshots.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Snapshots> {
        self.inner.snapshots.subscribe()
    }

    /// Queued mutations, oldest first.
    pub fn pending_mutations(&self) -> Arc<Vec<PendingMutation>> {
        self.inner.snapshots.borrow().pending()
    }

    /// Activity counters.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.read().clone()
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("namespace", &self.inner.config.namespace)
            .field("status", &self.status())
            .field("pending", &self.inner.queue.len())
            .finish()
    }
}

impl EngineInner {
    fn credential(&self) -> Option<Credential> {
        self.credential.read().clone()
    }

    async fn sync(&self) -> SyncOutcome {
        let Some(credential) = self.credential() else {
            debug!("Sync skipped: no credential");
            self.stats.write().syncs_skipped += 1;
            return SyncOutcome::Skipped;
        };

        let query = self.config.list_query();
        let outcome = match self.remote.list(&query, &credential).await {
            Ok(response) => {
                let (primary, nested) = self.apply_list(response);
                let mut stats = self.stats.write();
                stats.syncs_completed += 1;
                stats.last_sync_time = Some(Utc::now());
                debug!(primary, nested, "Sync applied");
                SyncOutcome::Applied { primary, nested }
            }
            Err(e) => {
                warn!(path = %query.path, error = %e, "Sync failed, keeping cached state");
                let mut stats = self.stats.write();
                stats.syncs_failed += 1;
                stats.last_error = Some(e.to_string());
                SyncOutcome::Failed
            }
        };

        {
            let stores = self.stores.lock();
            self.commit(&stores, &EntityKind::ALL);
        }
        self.flush().await;
        outcome
    }

    /// Replaces the primary store and merges embedded records.
    fn apply_list(&self, response: ListResponse) -> (usize, usize) {
        let primary_kind = self.config.primary_kind;
        let nested_kind = self.config.nested_kind;
        let field = self.config.nested_field.as_str();

        let records: Vec<EntityRecord> = response.records().collect();
        let embedded: Vec<EntityRecord> = records
            .iter()
            .filter_map(|record| record.get(field).cloned())
            .filter_map(EntityRecord::from_value)
            .collect();

        let mut stores = self.stores.lock();
        let primary = stores.entry(primary_kind).or_default();
        primary.replace_all(records);
        let primary_len = primary.len();

        let nested = stores.entry(nested_kind).or_default();
        let merged = embedded
            .into_iter()
            .filter(|record| nested.merge_record(record.clone()))
            .count();

        (primary_len, merged)
    }

    fn apply_server_event(&self, kind_name: &str, event: FeedEvent) -> bool {
        let Some(kind) = EntityKind::from_name(kind_name) else {
            debug!(kind = kind_name, "Ignoring event for unknown kind");
            self.stats.write().events_ignored += 1;
            return false;
        };

        let mut stores = self.stores.lock();
        let store = stores.entry(kind).or_default();
        let changed = match event.event_type {
            FeedEventType::Delete => event
                .old
                .as_ref()
                .and_then(EntityRecord::id)
                .is_some_and(|id| store.remove_record(&id)),
            FeedEventType::Insert | FeedEventType::Update => {
                event.new.is_some_and(|record| store.merge_record(record))
            }
        };

        debug!(kind = kind.name(), event = ?event.event_type, changed, "Feed event");
        if changed {
            self.commit(&stores, &[kind]);
        }
        drop(stores);

        let mut stats = self.stats.write();
        if changed {
            stats.events_applied += 1;
        } else {
            stats.events_ignored += 1;
        }
        changed
    }

    async fn flush(&self) -> Option<FlushReport> {
        let credential = self.credential();
        let report = self
            .queue
            .flush(self.remote.as_ref(), credential.as_ref())
            .await?;

        {
            let mut stats = self.stats.write();
            stats.mutations_replayed += report.replayed as u64;
            stats.mutations_rejected += report.rejected as u64;
            stats.mutations_failed += report.failed as u64;
        }
        self.publish_pending();
        Some(report)
    }

    async fn subscribe_all(self: &Arc<Self>) {
        if !self.feed.is_available() {
            return;
        }
        let credential = self.credential();
        for kind in EntityKind::ALL {
            let channel = self.config.channel_name(kind);
            let result = self
                .feed
                .subscribe(kind, &channel, credential.as_ref(), Arc::downgrade(self))
                .await;

            match result {
                Ok(()) => {}
                Err(e) if e.is_retryable() => {
                    warn!(channel = %channel, error = %e, "Feed subscribe failed, will retry on reconnect");
                }
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Feed subscribe failed");
                    self.stats.write().last_error = Some(e.to_string());
                    self.apply_trigger(StatusTrigger::SubscriptionFailed);
                }
            }
        }
    }

    fn apply_trigger(&self, trigger: StatusTrigger) -> crate::connectivity::Transition {
        self.monitor.apply(trigger)
    }

    /// Runs follow-up work on the current runtime without waiting for it.
    fn run_actions(self: &Arc<Self>, actions: Vec<StatusAction>) {
        if actions.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(?actions, "No async runtime, dropping status actions");
            return;
        };

        let inner = Arc::clone(self);
        handle.spawn(async move {
            for action in actions {
                match action {
                    StatusAction::Sync => {
                        inner.sync().await;
                    }
                }
            }
        });
    }

    fn reset(&self) {
        let mut stores = self.stores.lock();
        for store in stores.values_mut() {
            store.clear();
        }
        self.queue.reset();
        for kind in EntityKind::ALL {
            self.persistence
                .save::<[EntityRecord]>(&self.config.collection_key(kind), None);
        }

        let empty: BTreeMap<_, _> = EntityKind::ALL
            .iter()
            .map(|kind| (*kind, Arc::new(Vec::new())))
            .collect();
        self.snapshots.send_modify(|snapshots| {
            snapshots.by_kind = empty;
            snapshots.pending = Arc::new(Vec::new());
            snapshots.revision += 1;
        });
        debug!("Engine state reset");
    }

    /// Rebuilds and persists the snapshots of `kinds`, then publishes.
    ///
    /// Called with the stores lock held so persisted order matches memory.
    fn commit(&self, stores: &BTreeMap<EntityKind, EntityStore>, kinds: &[EntityKind]) {
        let fresh: Vec<(EntityKind, Arc<Vec<EntityRecord>>)> = kinds
            .iter()
            .map(|kind| {
                let records = stores.get(kind).map(EntityStore::snapshot).unwrap_or_default();
                self.persistence
                    .save(&self.config.collection_key(*kind), Some(records.as_slice()));
                (*kind, Arc::new(records))
            })
            .collect();
        let pending = Arc::new(self.queue.entries());

        self.snapshots.send_modify(|snapshots| {
            snapshots.by_kind.extend(fresh);
            snapshots.pending = pending;
            snapshots.revision += 1;
        });
    }

    fn publish_pending(&self) {
        let pending = Arc::new(self.queue.entries());
        self.snapshots.send_modify(|snapshots| {
            snapshots.pending = pending;
            snapshots.revision += 1;
        });
    }
}

impl FeedSink for EngineInner {
    fn on_event(self: Arc<Self>, kind_name: &str, event: FeedEvent) {
        self.apply_server_event(kind_name, event);
    }

    fn on_status(self: Arc<Self>, kind: EntityKind, status: &SubscriptionStatus) {
        let trigger = match status {
            SubscriptionStatus::Subscribed => StatusTrigger::SubscriptionAcknowledged,
            SubscriptionStatus::ChannelError(reason) => {
                warn!(kind = kind.name(), reason = %reason, "Feed channel error");
                self.stats.write().last_error = Some(reason.clone());
                StatusTrigger::SubscriptionFailed
            }
            SubscriptionStatus::TimedOut => {
                warn!(kind = kind.name(), "Feed channel timed out");
                StatusTrigger::SubscriptionTimedOut
            }
            SubscriptionStatus::Closed => {
                debug!(kind = kind.name(), "Feed channel closed");
                return;
            }
        };
        let transition = self.apply_trigger(trigger);
        self.run_actions(transition.actions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use mirrorsync_protocol::{ListQuery, RemoteResponse};
    use mirrorsync_storage::InMemoryStore;
    use serde_json::json;

    struct StaticRemote {
        items: Option<serde_json::Value>,
    }

    #[async_trait]
    impl RemoteApi for StaticRemote {
        async fn list(&self, _query: &ListQuery, _credential: &Credential) -> SyncResult<ListResponse> {
            match &self.items {
                Some(items) => Ok(serde_json::from_value(json!({ "items": items }))?),
                None => Err(SyncError::transport_retryable("offline")),
            }
        }

        async fn execute(
            &self,
            _request: &MutationRequest,
            _credential: &Credential,
        ) -> SyncResult<RemoteResponse> {
            Ok(RemoteResponse::status(200))
        }
    }

    fn engine(items: Option<serde_json::Value>) -> SyncEngine {
        SyncEngine::new(
            SyncConfig::default(),
            Arc::new(StaticRemote { items }),
            Arc::new(InMemoryStore::new()),
            None,
        )
    }

    #[tokio::test]
    async fn sync_without_credential_is_skipped() {
        let engine = engine(Some(json!([{"id": "a1"}])));
        assert_eq!(engine.sync().await, SyncOutcome::Skipped);
        assert!(engine.snapshot(EntityKind::Asset).is_empty());
        assert_eq!(engine.stats().syncs_skipped, 1);
    }

    #[tokio::test]
    async fn sync_replaces_primary_and_merges_nested() {
        let engine = engine(Some(json!([
            {"id": "a1", "updatedAt": "2024-01-02T00:00:00Z",
             "latestJob": {"id": "j1", "updatedAt": "2024-01-02T00:00:00Z", "state": "done"}},
            {"id": "a2", "updatedAt": "2024-01-01T00:00:00Z", "latestJob": null}
        ])));
        engine.apply_server_event(
            "Asset",
            FeedEvent::insert(EntityRecord::new("stale")),
        );
        engine.set_credential(Some(Credential::new("t")));

        let outcome = engine.sync().await;

        assert_eq!(outcome, SyncOutcome::Applied { primary: 2, nested: 1 });
        let ids: Vec<_> = engine
            .snapshot(EntityKind::Asset)
            .iter()
            .filter_map(|r| r.id())
            .collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(engine.snapshot(EntityKind::Job)[0].get("state"), Some(&json!("done")));
    }

    #[tokio::test]
    async fn failed_sync_keeps_stores() {
        let engine = engine(None);
        engine.apply_server_event("Asset", FeedEvent::insert(EntityRecord::new("a1")));
        engine.set_credential(Some(Credential::new("t")));

        assert_eq!(engine.sync().await, SyncOutcome::Failed);
        assert_eq!(engine.snapshot(EntityKind::Asset).len(), 1);
        assert_eq!(engine.stats().syncs_failed, 1);
        assert!(engine.stats().last_error.is_some());
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let engine = engine(None);
        assert!(!engine.apply_server_event("Invoice", FeedEvent::insert(EntityRecord::new("i1"))));
        assert_eq!(engine.stats().events_ignored, 1);
    }

    #[test]
    fn events_bump_snapshot_revision() {
        let engine = engine(None);
        let before = engine.snapshots().revision();
        assert!(engine.apply_server_event("Job", FeedEvent::insert(EntityRecord::new("j1"))));
        assert!(engine.snapshots().revision() > before);
        assert!(engine.apply_server_event("Job", FeedEvent::delete(EntityRecord::new("j1"))));
        assert!(engine.snapshot(EntityKind::Job).is_empty());
    }

    #[test]
    fn queue_request_publishes_pending() {
        let engine = engine(None);
        let id = engine.queue_request(MutationRequest::new("DELETE", "/api/assets/a1", None));
        assert_eq!(engine.pending_mutations()[0].id, id);
        assert!(engine.clear_mutation(&id));
        assert!(engine.pending_mutations().is_empty());
    }

    #[test]
    fn status_without_feed_starts_disabled() {
        let engine = engine(None);
        assert_eq!(engine.status(), ConnectionStatus::Disabled);
        engine.set_network_online(false);
        assert_eq!(engine.status(), ConnectionStatus::Offline);
    }
}
