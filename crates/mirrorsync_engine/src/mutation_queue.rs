//! Durable FIFO queue of local writes awaiting replay.

use crate::persistence::PersistenceAdapter;
use crate::transport::{Credential, RemoteApi};
use mirrorsync_protocol::PendingMutation;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Entries the pass looked at.
    pub attempted: usize,
    /// Entries confirmed by a 2xx answer and removed.
    pub replayed: usize,
    /// Entries answered with a non-2xx status. They stay queued.
    pub rejected: usize,
    /// Entries that got no answer. They stay queued.
    pub failed: usize,
    /// Entries without a replayable request. They stay queued.
    pub skipped: usize,
}

/// Pending mutations, persisted after every change.
///
/// Entries are only removed on a confirmed success or an explicit
/// [`MutationQueue::clear`]. At most one replay pass runs at a time.
pub struct MutationQueue {
    entries: Mutex<Vec<PendingMutation>>,
    flushing: AtomicBool,
    persistence: PersistenceAdapter,
    key: String,
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MutationQueue {
    /// Loads the queue persisted under `key`, or starts empty.
    pub fn load(persistence: PersistenceAdapter, key: impl Into<String>) -> Self {
        let key = key.into();
        let entries: Vec<PendingMutation> = persistence.load(&key, Vec::new());
        if !entries.is_empty() {
            debug!(pending = entries.len(), "Restored pending mutations");
        }
        Self {
            entries: Mutex::new(entries),
            flushing: AtomicBool::new(false),
            persistence,
            key,
        }
    }

    /// Appends an entry and persists the queue.
    pub fn register(&self, mutation: PendingMutation) {
        let mut entries = self.entries.lock();
        entries.push(mutation);
        self.persistence.save(&self.key, Some(entries.as_slice()));
    }

    /// Removes the entry with `id`. Returns true if it was queued.
    ///
    /// The queue is persisted only when an entry was removed.
    pub fn clear(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if removed {
            self.persistence.save(&self.key, Some(entries.as_slice()));
        }
        removed
    }

    /// Returns true if an entry with `id` is queued.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().iter().any(|entry| entry.id == id)
    }

    /// Returns a copy of the queued entries, oldest first.
    pub fn entries(&self) -> Vec<PendingMutation> {
        self.entries.lock().clone()
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns true while a replay pass is running.
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Drops every entry and the persisted queue.
    pub fn reset(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.persistence.save::<[PendingMutation]>(&self.key, None);
    }

    /// Replays queued entries in insertion order.
    ///
    /// Returns `None` without doing anything when the queue is empty, no
    /// credential is available, or another pass is already running. A
    /// failed entry does not stop the pass; it stays queued for the next
    /// one. Entries registered during the pass are picked up next time;
    /// entries cleared or reset away during the pass are not sent.
    pub async fn flush(
        &self,
        remote: &dyn RemoteApi,
        credential: Option<&Credential>,
    ) -> Option<FlushReport> {
        let credential = credential?;
        if self.is_empty() {
            return None;
        }
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Flush already in progress");
            return None;
        }
        let _guard = FlushGuard(&self.flushing);

        let snapshot = self.entries();
        let mut report = FlushReport {
            attempted: snapshot.len(),
            ..FlushReport::default()
        };

        for entry in snapshot {
            if !self.contains(&entry.id) {
                debug!(mutation_id = %entry.id, "Mutation left the queue during flush");
                continue;
            }
            let Some(request) = entry.replayable_request() else {
                warn!(mutation_id = %entry.id, "Skipping malformed pending mutation");
                report.skipped += 1;
                continue;
            };

            match remote.execute(request, credential).await {
                Ok(response) if response.is_success() => {
                    self.clear(&entry.id);
                    report.replayed += 1;
                }
                Ok(response) => {
                    warn!(
                        mutation_id = %entry.id,
                        method = %request.method,
                        path = %request.path,
                        status = response.status,
                        "Remote rejected mutation, keeping it queued"
                    );
                    report.rejected += 1;
                }
                Err(e) => {
                    warn!(
                        mutation_id = %entry.id,
                        method = %request.method,
                        path = %request.path,
                        error = %e,
                        "Mutation replay failed, keeping it queued"
                    );
                    report.failed += 1;
                }
            }
        }

        debug!(
            attempted = report.attempted,
            replayed = report.replayed,
            remaining = self.len(),
            "Flush finished"
        );
        Some(report)
    }
}

impl std::fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationQueue")
            .field("key", &self.key)
            .field("pending", &self.len())
            .field("flushing", &self.is_flushing())
            .finish()
    }
}
