//! The fetch capability: URL in, raw page text out.
//!
//! The pipeline treats fetching as an injected capability so tests can
//! script responses without a network. [`HttpFetcher`] is the production
//! implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::warn;

use sitewatch_shared::{Result, SiteWatchError, WatchUrl};

/// User-Agent string for watch requests.
const USER_AGENT: &str = concat!("SiteWatch/", env!("CARGO_PKG_VERSION"));

/// Pluggable page fetcher.
///
/// Contract: HTTP 200 returns the body text. Any other status returns empty
/// content and no error (nothing to report, not a failure). A transport
/// error returns `Err`; the caller logs it and continues.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &WatchUrl) -> Result<String>;
}

/// HTTP fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build the fetcher with its HTTP client.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| SiteWatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &WatchUrl) -> Result<String> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| SiteWatchError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(%url, %status, "non-200 response, nothing to report");
            return Ok(String::new());
        }

        response
            .text()
            .await
            .map_err(|e| SiteWatchError::Network(format!("{url}: body read failed: {e}")))
    }
}
