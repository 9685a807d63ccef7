//! Core domain types for the SiteWatch pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// WatchUrl
// ---------------------------------------------------------------------------

/// A typed URL string for a monitored page.
///
/// Storage rows carry untyped text; the conversion happens once at the
/// adapter edge so the rest of the pipeline never handles bare strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchUrl(String);

impl WatchUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WatchUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WatchUrl {
    fn from(url: &str) -> Self {
        Self(url.to_string())
    }
}

impl From<String> for WatchUrl {
    fn from(url: String) -> Self {
        Self(url)
    }
}

// ---------------------------------------------------------------------------
// WatchTarget
// ---------------------------------------------------------------------------

/// A monitored source: one URL plus display metadata, stored in the
/// watch-list. Set membership may change between discovery ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Human-readable name.
    pub name: String,
    /// The URL to monitor.
    pub url: WatchUrl,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// FetchObservation
// ---------------------------------------------------------------------------

/// One fetch attempt's outcome for a URL at a point in time.
///
/// Produced by a worker, consumed exactly once by the sink, then folded
/// into a persisted [`PageRecord`].
#[derive(Debug, Clone)]
pub struct FetchObservation {
    /// The fetched URL.
    pub url: WatchUrl,
    /// Raw body text; empty on failure or non-200 response.
    pub content: String,
    /// When the fetch completed.
    pub observed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// PageRecord
// ---------------------------------------------------------------------------

/// A persisted observation, part of a URL's append-only history.
///
/// Invariant: for a given URL, at most one stored record has
/// `is_most_recent = true` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// Unique record identifier (UUID v7, time-sortable).
    pub id: String,
    /// The observed URL.
    pub url: WatchUrl,
    /// Raw page content at observation time.
    pub content: String,
    /// SHA-256 hex digest of `content`.
    pub content_hash: String,
    /// When the observation was made.
    pub observed_at: DateTime<Utc>,
    /// Whether this record represents the current known state of the URL.
    pub is_most_recent: bool,
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A digest subscription: which URLs one recipient cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Recipient address.
    pub user_email: String,
    /// Subscribed URLs.
    pub urls: Vec<WatchUrl>,
}

/// Compute the SHA-256 hex digest of page content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let hash = content_hash("Hello, World!");
        assert_eq!(hash.len(), 64); // SHA-256 = 64 hex chars
        assert_eq!(
            hash,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(hash, content_hash("Hello, World!"));
        assert_ne!(hash, content_hash("Hello, World! 2"));
    }

    #[test]
    fn watch_url_display_and_serde() {
        let url = WatchUrl::from("http://a.test");
        assert_eq!(url.to_string(), "http://a.test");
        assert_eq!(url.as_str(), "http://a.test");

        // Transparent serde: serializes as a bare string.
        let value = toml::Value::try_from(&url).expect("serialize WatchUrl");
        assert_eq!(value, toml::Value::String("http://a.test".into()));
    }

    #[test]
    fn page_record_toml_roundtrip() {
        let record = PageRecord {
            id: uuid::Uuid::now_v7().to_string(),
            url: WatchUrl::from("http://a.test"),
            content: "Hello, World!".into(),
            content_hash: content_hash("Hello, World!"),
            observed_at: Utc::now(),
            is_most_recent: true,
        };

        let serialized = toml::to_string(&record).expect("serialize");
        let parsed: PageRecord = toml::from_str(&serialized).expect("deserialize");
        assert_eq!(parsed.url, record.url);
        assert_eq!(parsed.content_hash, record.content_hash);
        assert!(parsed.is_most_recent);
    }
}
