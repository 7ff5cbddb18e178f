//! Change feed subscriptions.
//!
//! A [`ChangeFeedClient`] opens one channel per entity kind and hands back a
//! receiver of [`FeedMessage`]s. The subscriber spawns a dispatch loop per
//! channel that forwards row events and status notifications to the engine.
//! Loops hold a weak reference to their sink, so a dropped engine ends them.

use crate::error::SyncResult;
use crate::transport::Credential;
use async_trait::async_trait;
use mirrorsync_protocol::{EntityKind, FeedEvent};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Status notification of a feed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// The feed acknowledged the subscription.
    Subscribed,
    /// The channel reported an error.
    ChannelError(String),
    /// The subscription timed out.
    TimedOut,
    /// The channel was closed.
    Closed,
}

/// A message on a feed channel.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Channel status changed.
    Status(SubscriptionStatus),
    /// A raw row-level change payload.
    Event(Value),
}

/// An open channel.
#[derive(Debug)]
pub struct FeedSubscription {
    /// Channel name.
    pub channel: String,
    /// Incoming messages. The channel ends when the sender is dropped.
    pub receiver: mpsc::Receiver<FeedMessage>,
}

impl FeedSubscription {
    /// Creates a subscription over a receiver.
    pub fn new(channel: impl Into<String>, receiver: mpsc::Receiver<FeedMessage>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
        }
    }

    /// Receives the next message.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.receiver.recv().await
    }
}

/// A realtime change feed.
#[async_trait]
pub trait ChangeFeedClient: Send + Sync {
    /// Opens a channel. Errors mean the channel could not be opened at all;
    /// failures after that arrive as [`FeedMessage::Status`].
    async fn subscribe(
        &self,
        channel: &str,
        credential: Option<&Credential>,
    ) -> SyncResult<FeedSubscription>;
}

/// Receiver of dispatched feed traffic.
pub(crate) trait FeedSink: Send + Sync + 'static {
    fn on_event(self: Arc<Self>, kind_name: &str, event: FeedEvent);
    fn on_status(self: Arc<Self>, kind: EntityKind, status: &SubscriptionStatus);
}

/// Owns the feed client and the running dispatch loops.
#[derive(Default)]
pub(crate) struct ChangeFeedSubscriber {
    client: RwLock<Option<Arc<dyn ChangeFeedClient>>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl ChangeFeedSubscriber {
    pub(crate) fn new(client: Option<Arc<dyn ChangeFeedClient>>) -> Self {
        Self {
            client: RwLock::new(client),
            loops: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_available(&self) -> bool {
        self.client.read().is_some()
    }

    pub(crate) fn set_client(&self, client: Arc<dyn ChangeFeedClient>) {
        *self.client.write() = Some(client);
    }

    /// Opens the channel of `kind` and starts dispatching into `sink`.
    pub(crate) async fn subscribe<S: FeedSink>(
        &self,
        kind: EntityKind,
        channel: &str,
        credential: Option<&Credential>,
        sink: Weak<S>,
    ) -> SyncResult<()> {
        let client = self.client.read().clone();
        let Some(client) = client else {
            return Ok(());
        };

        let mut subscription = client.subscribe(channel, credential).await?;
        debug!(channel, "Feed channel opened");

        let kind_name = kind.name();
        let handle = tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                let Some(sink) = sink.upgrade() else {
                    break;
                };
                match message {
                    FeedMessage::Event(payload) => match FeedEvent::from_payload(&payload) {
                        Some(event) => sink.on_event(kind_name, event),
                        None => warn!(channel = %subscription.channel, "Ignoring malformed feed payload"),
                    },
                    FeedMessage::Status(status) => sink.on_status(kind, &status),
                }
            }
            debug!(channel = %subscription.channel, "Feed channel ended");
        });

        self.loops.lock().push(handle);
        Ok(())
    }

    /// Stops every dispatch loop.
    pub(crate) fn teardown(&self) {
        let handles: Vec<_> = self.loops.lock().drain(..).collect();
        if !handles.is_empty() {
            debug!(channels = handles.len(), "Tearing down feed channels");
        }
        for handle in handles {
            handle.abort();
        }
    }

    pub(crate) fn active_channels(&self) -> usize {
        self.loops.lock().iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for ChangeFeedSubscriber {
    fn drop(&mut self) {
        for handle in self.loops.get_mut().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorsync_protocol::FeedEventType;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, FeedEventType)>>,
        statuses: Mutex<Vec<(EntityKind, SubscriptionStatus)>>,
    }

    impl FeedSink for Recorder {
        fn on_event(self: Arc<Self>, kind_name: &str, event: FeedEvent) {
            self.events.lock().push((kind_name.to_string(), event.event_type));
        }

        fn on_status(self: Arc<Self>, kind: EntityKind, status: &SubscriptionStatus) {
            self.statuses.lock().push((kind, status.clone()));
        }
    }

    struct OneShotClient {
        receiver: Mutex<Option<mpsc::Receiver<FeedMessage>>>,
    }

    #[async_trait]
    impl ChangeFeedClient for OneShotClient {
        async fn subscribe(
            &self,
            channel: &str,
            _credential: Option<&Credential>,
        ) -> SyncResult<FeedSubscription> {
            let receiver = self
                .receiver
                .lock()
                .take()
                .ok_or_else(|| crate::SyncError::Feed {
                    channel: channel.to_string(),
                    reason: "already subscribed".into(),
                })?;
            Ok(FeedSubscription::new(channel, receiver))
        }
    }

    async fn settle<F: Fn() -> bool>(done: F) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn dispatches_events_and_statuses() {
        let (tx, rx) = mpsc::channel(8);
        let client = Arc::new(OneShotClient {
            receiver: Mutex::new(Some(rx)),
        });
        let subscriber = ChangeFeedSubscriber::new(Some(client));
        let recorder = Arc::new(Recorder::default());

        subscriber
            .subscribe(EntityKind::Job, "app:Job", None, Arc::downgrade(&recorder))
            .await
            .unwrap();

        tx.send(FeedMessage::Status(SubscriptionStatus::Subscribed)).await.unwrap();
        tx.send(FeedMessage::Event(json!({"eventType": "DELETE", "old": {"id": "j1"}})))
            .await
            .unwrap();
        tx.send(FeedMessage::Event(json!(42))).await.unwrap();

        settle(|| recorder.events.lock().len() == 1 && recorder.statuses.lock().len() == 1).await;
        assert_eq!(
            *recorder.events.lock(),
            vec![("Job".to_string(), FeedEventType::Delete)]
        );
        assert_eq!(
            *recorder.statuses.lock(),
            vec![(EntityKind::Job, SubscriptionStatus::Subscribed)]
        );
    }

    #[tokio::test]
    async fn no_client_is_a_noop() {
        let subscriber = ChangeFeedSubscriber::new(None);
        let recorder = Arc::new(Recorder::default());
        assert!(!subscriber.is_available());
        subscriber
            .subscribe(EntityKind::Asset, "app:Asset", None, Arc::downgrade(&recorder))
            .await
            .unwrap();
        assert_eq!(subscriber.active_channels(), 0);
    }

    #[tokio::test]
    async fn teardown_stops_dispatch() {
        let (tx, rx) = mpsc::channel(8);
        let client = Arc::new(OneShotClient {
            receiver: Mutex::new(Some(rx)),
        });
        let subscriber = ChangeFeedSubscriber::new(Some(client));
        let recorder = Arc::new(Recorder::default());
        subscriber
            .subscribe(EntityKind::Asset, "app:Asset", None, Arc::downgrade(&recorder))
            .await
            .unwrap();

        subscriber.teardown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = tx.send(FeedMessage::Status(SubscriptionStatus::Subscribed)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(recorder.statuses.lock().is_empty());
        assert_eq!(subscriber.active_channels(), 0);
    }
}
