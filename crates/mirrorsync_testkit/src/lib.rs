//! # mirrorsync Testkit
//!
//! Test utilities for mirrorsync.
//!
//! This crate provides:
//! - [`ScriptedRemote`], a Remote API double with gated list replies
//! - [`ChannelFeed`], an in-process change feed
//! - [`TestHarness`] and record fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mirrorsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn sync_mirrors_remote() {
//!     let harness = TestHarness::new();
//!     harness.remote.push_list(vec![record("a1", 10, json!({}))]);
//!     harness.sign_in();
//!     harness.engine.sync().await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod feed;
pub mod fixtures;
pub mod generators;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::feed::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::remote::*;
    pub use crate::init_tracing;
}

pub use feed::*;
pub use fixtures::*;
pub use generators::*;
pub use remote::*;

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
