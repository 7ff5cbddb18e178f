//! # mirrorsync Protocol
//!
//! Data types shared by the mirrorsync engine and its collaborators.
//!
//! This crate provides:
//! - [`EntityKind`] and [`EntityRecord`] for mirrored rows
//! - Last-writer-wins resolution ([`lww`])
//! - [`PendingMutation`] for the durable replay queue
//! - [`FeedEvent`] normalization for change feed payloads
//! - List query/response shapes for the Remote API
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod feed;
mod kind;
pub mod lww;
mod messages;
mod mutation;
mod record;

pub use feed::{FeedEvent, FeedEventType};
pub use kind::EntityKind;
pub use messages::{ListQuery, ListResponse, RemoteResponse};
pub use mutation::{MutationRequest, PendingMutation};
pub use record::{parse_timestamp, EntityRecord};
