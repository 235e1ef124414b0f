//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvest corpus.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl job with aggregate totals
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    seeds TEXT NOT NULL,
    allowed_hosts TEXT NOT NULL,
    max_pages INTEGER NOT NULL,
    dry_run INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    failure TEXT,
    fetched INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    bytes INTEGER NOT NULL DEFAULT 0,
    not_modified INTEGER NOT NULL DEFAULT 0,
    disallowed INTEGER NOT NULL DEFAULT 0,
    queued INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    stats TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- One row per job x URL fetch outcome
CREATE TABLE IF NOT EXISTS pages (
    job_id TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    content_length INTEGER,
    fetched_at TEXT NOT NULL,
    etag TEXT,
    last_modified TEXT,
    content BLOB,
    content_hash TEXT,
    PRIMARY KEY (job_id, url)
);

CREATE INDEX IF NOT EXISTS idx_pages_hash ON pages(content_hash);

-- One row per job x URL embedding, vector stored as a JSON array
CREATE TABLE IF NOT EXISTS embeddings (
    job_id TEXT NOT NULL,
    url TEXT NOT NULL,
    dims INTEGER NOT NULL,
    vector TEXT NOT NULL,
    PRIMARY KEY (job_id, url)
);

-- Full-text index over textual page content
CREATE VIRTUAL TABLE IF NOT EXISTS pages_fts USING fts5(
    job_id UNINDEXED,
    url UNINDEXED,
    content
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
