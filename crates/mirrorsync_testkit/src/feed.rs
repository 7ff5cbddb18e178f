//! An in-process change feed.

use async_trait::async_trait;
use mirrorsync_engine::{
    ChangeFeedClient, Credential, FeedMessage, FeedSubscription, SubscriptionStatus, SyncError,
    SyncResult,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Change feed double backed by tokio channels.
///
/// Each subscription gets a fresh channel; messages are pushed from the
/// test with [`ChannelFeed::send_event`] and [`ChannelFeed::send_status`].
#[derive(Default)]
pub struct ChannelFeed {
    senders: Mutex<HashMap<String, mpsc::Sender<FeedMessage>>>,
    subscriptions: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, bool>>,
    subscribed: Notify,
}

impl ChannelFeed {
    /// Creates a feed accepting every subscription.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subscribing to `channel` fail. A retryable failure leaves the
    /// status alone; a fatal one moves it to `Error`.
    pub fn fail_subscribe(&self, channel: &str, retryable: bool) {
        self.failures.lock().insert(channel.to_string(), retryable);
    }

    /// Channels subscribed so far, in order, including re-subscriptions.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    /// Channels with an open sender.
    pub fn open_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.senders.lock().keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Waits until at least `count` subscriptions were made.
    pub async fn wait_for_subscriptions(&self, count: usize) {
        let wait = async {
            loop {
                let notified = self.subscribed.notified();
                if self.subscriptions.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(5), wait).await;
    }

    /// Sends a status notification on `channel`. Returns false if the
    /// channel is not open.
    pub async fn send_status(&self, channel: &str, status: SubscriptionStatus) -> bool {
        self.send(channel, FeedMessage::Status(status)).await
    }

    /// Sends a raw event payload on `channel`.
    pub async fn send_event(&self, channel: &str, payload: Value) -> bool {
        self.send(channel, FeedMessage::Event(payload)).await
    }

    /// Sends an `{eventType, new, old}` payload on `channel`.
    pub async fn send_change(
        &self,
        channel: &str,
        event_type: &str,
        new: Option<Value>,
        old: Option<Value>,
    ) -> bool {
        let payload = json!({
            "eventType": event_type,
            "new": new.unwrap_or_else(|| json!({})),
            "old": old.unwrap_or_else(|| json!({})),
        });
        self.send_event(channel, payload).await
    }

    /// Acknowledges every open channel.
    pub async fn acknowledge_all(&self) {
        for channel in self.open_channels() {
            self.send_status(&channel, SubscriptionStatus::Subscribed).await;
        }
    }

    async fn send(&self, channel: &str, message: FeedMessage) -> bool {
        let sender = self.senders.lock().get(channel).cloned();
        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ChangeFeedClient for ChannelFeed {
    async fn subscribe(
        &self,
        channel: &str,
        _credential: Option<&Credential>,
    ) -> SyncResult<FeedSubscription> {
        let failure = self.failures.lock().get(channel).copied();
        if let Some(retryable) = failure {
            return Err(if retryable {
                SyncError::transport_retryable(format!("{channel} unreachable"))
            } else {
                SyncError::Feed {
                    channel: channel.to_string(),
                    reason: "subscription refused".into(),
                }
            });
        }

        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().insert(channel.to_string(), tx);
        self.subscriptions.lock().push(channel.to_string());
        self.subscribed.notify_waiters();
        Ok(FeedSubscription::new(channel, rx))
    }
}
