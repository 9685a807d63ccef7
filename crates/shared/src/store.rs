//! Storage port consumed by the watch pipeline.
//!
//! The pipeline only ever sees this trait; the libSQL adapter in
//! `sitewatch-storage` implements it. Tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PageRecord, WatchUrl};

/// The capability set the fetch/diff pipeline needs from storage.
///
/// Implementations must be safe for concurrent use; the pipeline issues
/// independent calls per observation with no client-side locking.
#[async_trait]
pub trait WatchStore: Send + Sync {
    /// The distinct set of URLs currently subject to monitoring.
    async fn distinct_watch_urls(&self) -> Result<Vec<WatchUrl>>;

    /// Zero-or-more most-recent-first records for a URL, used for diffing.
    async fn latest_record(&self, url: &WatchUrl) -> Result<Vec<PageRecord>>;

    /// Durably append one record to the URL's history.
    async fn persist_record(&self, record: &PageRecord) -> Result<()>;
}
