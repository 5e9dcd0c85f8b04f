//! Outbound calls performed by task executors.
//!
//! The dispatcher only depends on the [`Transport`] trait. [`HttpTransport`]
//! is the production implementation on top of `reqwest`; anything else that
//! can turn an [`Endpoint`] into a response body can be plugged in instead.
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Endpoint, ErrorKind, Result};

/// Default timeout in seconds for connecting and for the whole call, 10.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default user agent, `stocksync/<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("stocksync/", env!("CARGO_PKG_VERSION"));

/// Performs the network call described by an [`Endpoint`].
///
/// Implementations must not panic on failure; every problem is reported as
/// an [`ErrorKind`] so it can be attached to the task.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Execute the call and return the raw response body
    async fn call(&self, endpoint: &Endpoint) -> Result<Bytes>;
}

/// Settings for [`HttpTransport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connect and overall request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

const fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Build the `reqwest` client shared by the transport and the platform client
pub(crate) fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .connect_timeout(timeout)
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(ErrorKind::BuildClient)
}

/// [`Transport`] backed by a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with its own client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout, &config.user_agent)?,
        })
    }

    /// Create a transport that reuses an existing client
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, endpoint: &Endpoint) -> Result<Bytes> {
        let mut request = self
            .client
            .request(endpoint.method().clone(), endpoint.url().clone())
            .headers(endpoint.headers().clone());
        if !endpoint.params().is_empty() {
            request = request.query(endpoint.params());
        }
        if let Some(body) = endpoint.body_bytes() {
            request = request.body(body.clone());
        }

        let response = request.send().await.map_err(ErrorKind::NetworkRequest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ErrorKind::RejectedStatus(status));
        }
        response.bytes().await.map_err(ErrorKind::ReadResponseBody)
    }
}
