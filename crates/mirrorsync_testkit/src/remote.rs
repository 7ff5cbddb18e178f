//! A scripted Remote API.

use async_trait::async_trait;
use mirrorsync_engine::{Credential, RemoteApi, SyncError, SyncResult};
use mirrorsync_protocol::{EntityRecord, ListQuery, ListResponse, MutationRequest, RemoteResponse};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

enum ListReply {
    Ready(SyncResult<ListResponse>),
    Gated(oneshot::Receiver<SyncResult<ListResponse>>),
}

/// Releases a gated list response.
pub struct ListGate(oneshot::Sender<SyncResult<ListResponse>>);

impl ListGate {
    /// Resolves the waiting list call with `records`.
    pub fn release(self, records: Vec<EntityRecord>) {
        let _ = self.0.send(Ok(ListResponse::from_records(records)));
    }

    /// Resolves the waiting list call with an error.
    pub fn fail(self, error: SyncError) {
        let _ = self.0.send(Err(error));
    }
}

/// Remote API double.
///
/// List calls consume queued replies in order; with nothing queued they
/// answer with the default records. Replay answers are chosen per path.
/// Every call is recorded.
#[derive(Default)]
pub struct ScriptedRemote {
    list_replies: Mutex<VecDeque<ListReply>>,
    default_records: Mutex<Vec<EntityRecord>>,
    execute_replies: Mutex<HashMap<String, Option<u16>>>,
    list_calls: Mutex<Vec<(ListQuery, String)>>,
    executed: Mutex<Vec<MutationRequest>>,
    list_called: Notify,
}

impl ScriptedRemote {
    /// Creates a remote answering every list call with no items.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the records returned when no reply is queued.
    pub fn set_records(&self, records: Vec<EntityRecord>) {
        *self.default_records.lock() = records;
    }

    /// Queues one list reply.
    pub fn push_list(&self, records: Vec<EntityRecord>) {
        self.list_replies
            .lock()
            .push_back(ListReply::Ready(Ok(ListResponse::from_records(records))));
    }

    /// Queues one failing list reply.
    pub fn push_list_error(&self, error: SyncError) {
        self.list_replies.lock().push_back(ListReply::Ready(Err(error)));
    }

    /// Queues a list reply that waits until the returned gate is released.
    pub fn push_gated_list(&self) -> ListGate {
        let (tx, rx) = oneshot::channel();
        self.list_replies.lock().push_back(ListReply::Gated(rx));
        ListGate(tx)
    }

    /// Answers replays of `path` with `status`.
    pub fn respond(&self, path: &str, status: u16) {
        self.execute_replies.lock().insert(path.to_string(), Some(status));
    }

    /// Makes replays of `path` fail without an answer.
    pub fn fail_transport(&self, path: &str) {
        self.execute_replies.lock().insert(path.to_string(), None);
    }

    /// Number of list calls so far.
    pub fn list_call_count(&self) -> usize {
        self.list_calls.lock().len()
    }

    /// Recorded list calls with the token they carried.
    pub fn list_calls(&self) -> Vec<(ListQuery, String)> {
        self.list_calls.lock().clone()
    }

    /// Replayed requests, in call order.
    pub fn executed(&self) -> Vec<MutationRequest> {
        self.executed.lock().clone()
    }

    /// Paths of replayed requests, in call order.
    pub fn executed_paths(&self) -> Vec<String> {
        self.executed.lock().iter().map(|r| r.path.clone()).collect()
    }

    /// Waits until at least `count` list calls were made.
    pub async fn wait_for_list_calls(&self, count: usize) {
        let wait = async {
            loop {
                let notified = self.list_called.notified();
                if self.list_call_count() >= count {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(5), wait).await;
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn list(&self, query: &ListQuery, credential: &Credential) -> SyncResult<ListResponse> {
        let reply = self.list_replies.lock().pop_front();
        self.list_calls
            .lock()
            .push((query.clone(), credential.token().to_string()));
        self.list_called.notify_waiters();

        match reply {
            Some(ListReply::Ready(result)) => result,
            Some(ListReply::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(SyncError::transport_retryable("gate dropped"))),
            None => Ok(ListResponse::from_records(self.default_records.lock().clone())),
        }
    }

    async fn execute(
        &self,
        request: &MutationRequest,
        _credential: &Credential,
    ) -> SyncResult<RemoteResponse> {
        self.executed.lock().push(request.clone());
        let reply = self.execute_replies.lock().get(&request.path).copied();
        match reply {
            Some(Some(status)) => Ok(RemoteResponse::status(status)),
            Some(None) => Err(SyncError::transport_retryable("connection refused")),
            None => Ok(RemoteResponse::status(200)),
        }
    }
}
