//! Remote API abstraction.

use crate::error::SyncResult;
use async_trait::async_trait;
use mirrorsync_protocol::{ListQuery, ListResponse, MutationRequest, RemoteResponse};
use std::fmt;
use zeroize::Zeroizing;

/// A bearer credential for the Remote API and the change feed.
///
/// The token is wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    /// Wraps an access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    /// Returns the raw token.
    pub fn token(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.token() == other.token()
    }
}

impl Eq for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// The authoritative Remote API.
///
/// This trait abstracts the network layer so the engine can run against
/// HTTP ([`crate::HttpRemoteApi`]) or a scripted double in tests.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetches one page of the primary collection.
    async fn list(&self, query: &ListQuery, credential: &Credential) -> SyncResult<ListResponse>;

    /// Replays a queued mutation.
    ///
    /// Returns `Ok` for any HTTP answer, including non-2xx statuses; `Err`
    /// only when no answer was received.
    async fn execute(
        &self,
        request: &MutationRequest,
        credential: &Credential,
    ) -> SyncResult<RemoteResponse>;
}
