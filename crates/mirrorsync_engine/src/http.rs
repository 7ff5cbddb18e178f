//! HTTP implementation of the Remote API.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{Credential, RemoteApi};
use async_trait::async_trait;
use mirrorsync_protocol::{ListQuery, ListResponse, MutationRequest, RemoteResponse};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::{debug, warn};

/// Remote API over HTTP with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    /// Base URL without a trailing slash, e.g. `https://api.example.com`.
    base_url: String,
    client: Client,
}

impl HttpRemoteApi {
    /// Creates a client with the given base URL and request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Creates a client from the sync configuration.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(config.api_base_url.clone(), config.request_timeout)
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn list(&self, query: &ListQuery, credential: &Credential) -> SyncResult<ListResponse> {
        let response = self
            .client
            .get(self.url(&query.path))
            .query(&query.query_pairs())
            .bearer_auth(credential.token())
            .send()
            .await?;

        let status = response.status();
        debug!(path = %query.path, page = query.page, status = status.as_u16(), "List fetched");

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SyncError::AuthenticationFailed(format!(
                "list {} rejected credential",
                query.path
            )));
        }
        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
            });
        }

        Ok(response.json::<ListResponse>().await?)
    }

    async fn execute(
        &self,
        request: &MutationRequest,
        credential: &Credential,
    ) -> SyncResult<RemoteResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| SyncError::Protocol(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self
            .client
            .request(method, self.url(&request.path))
            .bearer_auth(credential.token());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        debug!(
            method = %request.method,
            path = %request.path,
            status,
            "Mutation replayed"
        );

        // Once a status arrived the write is settled; a broken body is not a replay failure.
        let body = match response.text().await {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => serde_json::from_str(&text).ok(),
            Err(e) => {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    status,
                    error = %e,
                    "Failed to read mutation response body"
                );
                None
            }
        };
        Ok(RemoteResponse { status, body })
    }
}
