//! libSQL storage layer for SiteWatch.
//!
//! The [`Storage`] struct wraps a libSQL database holding the watch-list,
//! the append-only page-record history, and digest subscriptions. It
//! implements the [`WatchStore`] port consumed by the watch pipeline.
//!
//! **Append-only rule:** page records are inserted and never deleted or
//! rewritten; the only mutation is demoting a superseded record's
//! `is_most_recent` flag, which keeps the "at most one most-recent record
//! per URL" invariant without destructively correcting history.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use sitewatch_shared::{
    PageRecord, Result, SiteWatchError, Subscription, WatchStore, WatchTarget, WatchUrl,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and run pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SiteWatchError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    SiteWatchError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Watch target operations
    // -----------------------------------------------------------------------

    /// Register a watch target, updating name/description if the URL is
    /// already registered. Idempotent so startup seeding can re-run.
    pub async fn add_watch_target(&self, target: &WatchTarget) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO watch_targets (id, name, url, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(url) DO UPDATE SET
                   name = excluded.name,
                   description = excluded.description",
                params![
                    id.as_str(),
                    target.name.as_str(),
                    target.url.as_str(),
                    target.description.as_deref(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List all registered watch targets, ordered by name.
    pub async fn list_watch_targets(&self) -> Result<Vec<WatchTarget>> {
        let mut rows = self
            .conn
            .query(
                "SELECT name, url, description FROM watch_targets ORDER BY name",
                params![],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let mut targets = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            targets.push(WatchTarget {
                name: row
                    .get::<String>(0)
                    .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
                url: WatchUrl::new(
                    row.get::<String>(1)
                        .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
                ),
                description: row.get::<String>(2).ok(),
            });
        }
        Ok(targets)
    }

    // -----------------------------------------------------------------------
    // Page record operations
    // -----------------------------------------------------------------------

    /// Full observation history for a URL, most-recent-first.
    pub async fn record_history(&self, url: &WatchUrl, limit: u32) -> Result<Vec<PageRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, content, content_hash, observed_at, is_most_recent
                 FROM page_records WHERE url = ?1
                 ORDER BY observed_at DESC LIMIT ?2",
                params![url.as_str(), i64::from(limit)],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            records.push(row_to_page_record(&row)?);
        }
        Ok(records)
    }

    /// Records currently flagged most-recent among the given URLs.
    /// Feeds the subscription digest.
    pub async fn most_recent_in(&self, urls: &[WatchUrl]) -> Result<Vec<PageRecord>> {
        let mut records = Vec::new();
        for url in urls {
            let mut rows = self
                .conn
                .query(
                    "SELECT id, url, content, content_hash, observed_at, is_most_recent
                     FROM page_records WHERE url = ?1 AND is_most_recent = 1
                     ORDER BY observed_at DESC",
                    params![url.as_str()],
                )
                .await
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

            while let Ok(Some(row)) = rows.next().await {
                records.push(row_to_page_record(&row)?);
            }
        }
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Subscription operations
    // -----------------------------------------------------------------------

    /// Register a subscription, merging URLs if the address already exists.
    pub async fn add_subscription(&self, user_email: &str, urls: &[WatchUrl]) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO subscriptions (id, user_email, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_email) DO NOTHING",
                params![id.as_str(), user_email, now.as_str()],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM subscriptions WHERE user_email = ?1",
                params![user_email],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let sub_id: String = match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
            _ => return Err(SiteWatchError::Storage("subscription insert lost".into())),
        };

        for url in urls {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO subscription_urls (subscription_id, url)
                     VALUES (?1, ?2)",
                    params![sub_id.as_str(), url.as_str()],
                )
                .await
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// All subscriptions with their URL lists.
    pub async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_email FROM subscriptions ORDER BY user_email",
                params![],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let mut heads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row
                .get(0)
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?;
            let user_email: String = row
                .get(1)
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?;
            heads.push((id, user_email));
        }

        let mut subscriptions = Vec::new();
        for (id, user_email) in heads {
            let mut url_rows = self
                .conn
                .query(
                    "SELECT url FROM subscription_urls WHERE subscription_id = ?1 ORDER BY url",
                    params![id.as_str()],
                )
                .await
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

            let mut urls = Vec::new();
            while let Ok(Some(row)) = url_rows.next().await {
                urls.push(WatchUrl::new(
                    row.get::<String>(0)
                        .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
                ));
            }
            subscriptions.push(Subscription { user_email, urls });
        }
        Ok(subscriptions)
    }
}

// ---------------------------------------------------------------------------
// WatchStore port
// ---------------------------------------------------------------------------

#[async_trait]
impl WatchStore for Storage {
    async fn distinct_watch_urls(&self) -> Result<Vec<WatchUrl>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT url FROM watch_targets ORDER BY url",
                params![],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let mut urls = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            urls.push(WatchUrl::new(
                row.get::<String>(0)
                    .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
            ));
        }
        Ok(urls)
    }

    async fn latest_record(&self, url: &WatchUrl) -> Result<Vec<PageRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, content, content_hash, observed_at, is_most_recent
                 FROM page_records WHERE url = ?1
                 ORDER BY observed_at DESC LIMIT 1",
                params![url.as_str()],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            records.push(row_to_page_record(&row)?);
        }
        Ok(records)
    }

    async fn persist_record(&self, record: &PageRecord) -> Result<()> {
        // A record flagged most-recent supersedes the URL's previous one;
        // demote it first so at most one record per URL carries the flag.
        if record.is_most_recent {
            self.conn
                .execute(
                    "UPDATE page_records SET is_most_recent = 0
                     WHERE url = ?1 AND is_most_recent = 1",
                    params![record.url.as_str()],
                )
                .await
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?;
        }

        self.conn
            .execute(
                "INSERT INTO page_records
                   (id, url, content, content_hash, observed_at, is_most_recent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.as_str(),
                    record.url.as_str(),
                    record.content.as_str(),
                    record.content_hash.as_str(),
                    record.observed_at.to_rfc3339(),
                    i64::from(record.is_most_recent),
                ],
            )
            .await
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Convert a database row to a [`PageRecord`].
fn row_to_page_record(row: &libsql::Row) -> Result<PageRecord> {
    Ok(PageRecord {
        id: row
            .get::<String>(0)
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
        url: WatchUrl::new(
            row.get::<String>(1)
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
        ),
        content: row
            .get::<String>(2)
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
        content_hash: row
            .get::<String>(3)
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?,
        observed_at: {
            let s: String = row
                .get(4)
                .map_err(|e| SiteWatchError::Storage(e.to_string()))?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| SiteWatchError::Storage(format!("invalid date: {e}")))?
        },
        is_most_recent: row
            .get::<i64>(5)
            .map_err(|e| SiteWatchError::Storage(e.to_string()))?
            != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sitewatch_shared::content_hash;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sw_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn record(url: &str, content: &str, age_hours: i64, is_most_recent: bool) -> PageRecord {
        PageRecord {
            id: Uuid::now_v7().to_string(),
            url: WatchUrl::from(url),
            content: content.into(),
            content_hash: content_hash(content),
            observed_at: Utc::now() - Duration::hours(age_hours),
            is_most_recent,
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sw_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn watch_target_upsert_and_distinct_urls() {
        let storage = test_storage().await;

        storage
            .add_watch_target(&WatchTarget {
                name: "Paul Graham".into(),
                url: WatchUrl::from("http://www.paulgraham.com/articles.html"),
                description: Some("Essays".into()),
            })
            .await
            .expect("add target");

        // Same URL again with a new name updates in place, no duplicate.
        storage
            .add_watch_target(&WatchTarget {
                name: "pg".into(),
                url: WatchUrl::from("http://www.paulgraham.com/articles.html"),
                description: None,
            })
            .await
            .expect("re-add target");

        storage
            .add_watch_target(&WatchTarget {
                name: "Joel Spolsky".into(),
                url: WatchUrl::from("https://www.joelonsoftware.com/"),
                description: None,
            })
            .await
            .expect("add second target");

        let targets = storage.list_watch_targets().await.expect("list");
        assert_eq!(targets.len(), 2);

        let urls = storage.distinct_watch_urls().await.expect("distinct urls");
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&WatchUrl::from("https://www.joelonsoftware.com/")));
    }

    #[tokio::test]
    async fn history_is_append_only_and_ordered() {
        let storage = test_storage().await;
        let url = WatchUrl::from("http://a.test");

        storage
            .persist_record(&record("http://a.test", "v1", 2, true))
            .await
            .expect("persist v1");
        storage
            .persist_record(&record("http://a.test", "v1", 1, false))
            .await
            .expect("persist v1 again");

        let history = storage.record_history(&url, 10).await.expect("history");
        assert_eq!(history.len(), 2);
        // Most-recent-first ordering
        assert!(history[0].observed_at > history[1].observed_at);
        assert_eq!(history[0].content, "v1");

        let latest = storage.latest_record(&url).await.expect("latest");
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, history[0].id);
    }

    #[tokio::test]
    async fn latest_record_empty_for_unknown_url() {
        let storage = test_storage().await;
        let latest = storage
            .latest_record(&WatchUrl::from("http://nowhere.test"))
            .await
            .expect("latest");
        assert!(latest.is_empty());
    }

    #[tokio::test]
    async fn persisting_most_recent_demotes_predecessor() {
        let storage = test_storage().await;
        let url = WatchUrl::from("http://a.test");

        storage
            .persist_record(&record("http://a.test", "v1", 3, true))
            .await
            .unwrap();
        storage
            .persist_record(&record("http://a.test", "v1", 2, false))
            .await
            .unwrap();
        storage
            .persist_record(&record("http://a.test", "v2", 1, true))
            .await
            .unwrap();

        let history = storage.record_history(&url, 10).await.expect("history");
        assert_eq!(history.len(), 3);

        let flagged: Vec<_> = history.iter().filter(|r| r.is_most_recent).collect();
        assert_eq!(flagged.len(), 1, "exactly one most-recent record per URL");
        assert_eq!(flagged[0].content, "v2");
        assert_eq!(flagged[0].id, history[0].id, "latest by observation time");
    }

    #[tokio::test]
    async fn demotion_is_scoped_to_the_record_url() {
        let storage = test_storage().await;

        storage
            .persist_record(&record("http://a.test", "a1", 2, true))
            .await
            .unwrap();
        storage
            .persist_record(&record("http://b.test", "b1", 1, true))
            .await
            .unwrap();

        let a = storage
            .record_history(&WatchUrl::from("http://a.test"), 10)
            .await
            .unwrap();
        assert!(a[0].is_most_recent, "other URLs keep their flag");
    }

    #[tokio::test]
    async fn subscriptions_roundtrip() {
        let storage = test_storage().await;

        storage
            .add_subscription(
                "reader@example.com",
                &[WatchUrl::from("http://a.test"), WatchUrl::from("http://b.test")],
            )
            .await
            .expect("add subscription");

        // Re-subscribing merges URLs instead of duplicating the address.
        storage
            .add_subscription("reader@example.com", &[WatchUrl::from("http://c.test")])
            .await
            .expect("merge subscription");

        let subs = storage.subscriptions().await.expect("subscriptions");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].user_email, "reader@example.com");
        assert_eq!(subs[0].urls.len(), 3);
    }

    #[tokio::test]
    async fn most_recent_in_filters_by_flag_and_url() {
        let storage = test_storage().await;

        storage
            .persist_record(&record("http://a.test", "a1", 3, true))
            .await
            .unwrap();
        storage
            .persist_record(&record("http://a.test", "a1", 2, false))
            .await
            .unwrap();
        storage
            .persist_record(&record("http://b.test", "b1", 1, true))
            .await
            .unwrap();

        let hits = storage
            .most_recent_in(&[WatchUrl::from("http://a.test")])
            .await
            .expect("most_recent_in");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url.as_str(), "http://a.test");
        assert!(hits[0].is_most_recent);

        let both = storage
            .most_recent_in(&[WatchUrl::from("http://a.test"), WatchUrl::from("http://b.test")])
            .await
            .expect("most_recent_in both");
        assert_eq!(both.len(), 2);
    }
}
