//! Connection status state machine.
//!
//! ```text
//!            FeedAvailable                 SubscriptionAcknowledged
//! Disabled ─────────────────► Connecting ───────────────────────► Connected
//!                                 ▲                                   │
//!                  NetworkOnline  │        NetworkOffline /           │
//!                 (sync + flush)  │        SubscriptionTimedOut       │
//!                                 └──────────── Offline ◄─────────────┘
//!
//! SubscriptionFailed: any state except Disabled ─► Error
//! Reinitialized:      any state ─► Connecting (feed) | Disabled (no feed)
//! ```
//!
//! The machine has no terminal state. `Error` is left only through
//! re-initialization or a network transition.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::info;

/// The engine's relationship to the remote services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No change feed client is available.
    Disabled,
    /// Feed channels are being opened.
    Connecting,
    /// At least one feed channel is acknowledged.
    Connected,
    /// The network or the feed is unreachable.
    Offline,
    /// A feed channel failed fatally.
    Error,
}

impl ConnectionStatus {
    /// Initial status for an engine with or without a feed client.
    pub fn initial(feed_available: bool) -> Self {
        if feed_available {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Disabled
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disabled => "disabled",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Offline => "offline",
            ConnectionStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// An input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTrigger {
    /// The network reported offline.
    NetworkOffline,
    /// The network reported online.
    NetworkOnline,
    /// A feed channel acknowledged its subscription.
    SubscriptionAcknowledged,
    /// A feed channel failed fatally.
    SubscriptionFailed,
    /// A feed channel timed out.
    SubscriptionTimedOut,
    /// A feed client was attached.
    FeedAvailable,
    /// A credential became available or changed.
    CredentialChanged,
    /// The engine was (re)started.
    Reinitialized,
}

/// Work a transition asks the engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// Run `sync()`. It replays the mutation queue when it finishes.
    Sync,
}

/// Result of applying a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status before the trigger.
    pub from: ConnectionStatus,
    /// Status after the trigger.
    pub to: ConnectionStatus,
    /// Follow-up work.
    pub actions: Vec<StatusAction>,
}

impl Transition {
    /// Returns true if the status changed.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Computes the next status and follow-up actions.
pub fn transition(
    status: ConnectionStatus,
    trigger: StatusTrigger,
    feed_available: bool,
) -> (ConnectionStatus, Vec<StatusAction>) {
    use ConnectionStatus as S;
    use StatusTrigger as T;

    match (status, trigger) {
        (_, T::NetworkOffline) => (S::Offline, vec![]),
        (S::Offline, T::NetworkOnline) => (S::initial(feed_available), vec![StatusAction::Sync]),
        (S::Connecting, T::SubscriptionAcknowledged) => (S::Connected, vec![]),
        (S::Disabled, T::SubscriptionFailed) => (S::Disabled, vec![]),
        (_, T::SubscriptionFailed) => (S::Error, vec![]),
        (_, T::SubscriptionTimedOut) => (S::Offline, vec![]),
        (S::Disabled, T::FeedAvailable) => (S::Connecting, vec![]),
        (S::Connected, T::CredentialChanged) => (S::Connected, vec![StatusAction::Sync]),
        (_, T::Reinitialized) => (S::initial(feed_available), vec![]),
        (status, _) => (status, vec![]),
    }
}

/// Holds the authoritative status and publishes changes.
pub struct ConnectivityMonitor {
    status: watch::Sender<ConnectionStatus>,
    feed_available: AtomicBool,
    apply_lock: Mutex<()>,
}

impl ConnectivityMonitor {
    /// Creates a monitor in its initial status.
    pub fn new(feed_available: bool) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::initial(feed_available));
        Self {
            status,
            feed_available: AtomicBool::new(feed_available),
            apply_lock: Mutex::new(()),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Records whether a feed client exists.
    pub fn set_feed_available(&self, available: bool) {
        self.feed_available.store(available, Ordering::Release);
    }

    /// Returns true if a feed client exists.
    pub fn feed_available(&self) -> bool {
        self.feed_available.load(Ordering::Acquire)
    }

    /// Applies a trigger and publishes the new status.
    pub fn apply(&self, trigger: StatusTrigger) -> Transition {
        let _serial = self.apply_lock.lock();
        let from = self.status();
        let (to, actions) = transition(from, trigger, self.feed_available());

        self.status.send_if_modified(|current| {
            if *current == to {
                false
            } else {
                *current = to;
                true
            }
        });

        if from != to {
            info!(from = %from, to = %to, trigger = ?trigger, "Connection status changed");
        }

        Transition { from, to, actions }
    }
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("status", &self.status())
            .field("feed_available", &self.feed_available())
            .finish()
    }
}
