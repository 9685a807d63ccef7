//! SQL migration definitions for the SiteWatch database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: watch_targets, page_records, subscriptions",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- The watch-list: sources currently subject to monitoring
CREATE TABLE IF NOT EXISTS watch_targets (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    url         TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at  TEXT NOT NULL
);

-- Append-only observation history. Rows are never deleted; only the
-- is_most_recent flag moves when a newer version supersedes a record.
CREATE TABLE IF NOT EXISTS page_records (
    id             TEXT PRIMARY KEY,
    url            TEXT NOT NULL,
    content        TEXT NOT NULL,
    content_hash   TEXT NOT NULL,
    observed_at    TEXT NOT NULL,
    is_most_recent INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_page_records_url ON page_records(url);
CREATE INDEX IF NOT EXISTS idx_page_records_url_observed
    ON page_records(url, observed_at DESC);

-- Digest subscriptions
CREATE TABLE IF NOT EXISTS subscriptions (
    id         TEXT PRIMARY KEY,
    user_email TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subscription_urls (
    subscription_id TEXT NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
    url             TEXT NOT NULL,
    PRIMARY KEY (subscription_id, url)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
