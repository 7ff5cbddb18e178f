//! # mirrorsync Engine
//!
//! Offline-resilient mirror of remote entity collections.
//!
//! This crate provides:
//! - Per-kind entity stores with last-writer-wins merging
//! - A durable mutation queue with non-blocking replay
//! - Change feed subscriptions, one dispatch loop per entity kind
//! - The connection status state machine
//! - [`SyncEngine`], the coordinator owning all of the above
//!
//! ## Model
//!
//! `sync()` fetches one authoritative page of the primary kind and replaces
//! that store wholesale; records embedded on primary rows are merged into
//! their own kind. The change feed pushes row events at any time. Local
//! writes that could not be confirmed wait in the queue and are replayed in
//! insertion order after every sync and on reconnect.
//!
//! ## Key Invariants
//!
//! - At most one record per id and kind
//! - Inserts and updates of full rows converge regardless of delivery order.
//!   Rows are shallow-merged, so a partial row can keep fields an older full
//!   row left behind when it arrives after it, and not when it arrives first
//! - Deletes are unconditional
//! - Queue entries leave only on confirmed success or explicit clear
//! - Failures degrade to stale cache and queued work, never to an error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod engine;
mod entity_store;
mod error;
mod feed;
mod http;
mod mutation_queue;
mod persistence;
mod transport;

pub use config::SyncConfig;
pub use connectivity::{
    transition, ConnectionStatus, ConnectivityMonitor, StatusAction, StatusTrigger, Transition,
};
pub use engine::{Snapshots, SyncEngine, SyncOutcome, SyncStats};
pub use entity_store::EntityStore;
pub use error::{SyncError, SyncResult};
pub use feed::{ChangeFeedClient, FeedMessage, FeedSubscription, SubscriptionStatus};
pub use http::HttpRemoteApi;
pub use mutation_queue::{FlushReport, MutationQueue};
pub use persistence::PersistenceAdapter;
pub use transport::{Credential, RemoteApi};
