//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the dedup index.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Every admitted URL fingerprint, with the task that admitted it
CREATE TABLE IF NOT EXISTS urls (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    url TEXT,
    depth INTEGER NOT NULL DEFAULT 0,
    link_depth INTEGER NOT NULL DEFAULT 0,
    is_requisite INTEGER NOT NULL DEFAULT 0,
    is_offsite INTEGER NOT NULL DEFAULT 0,
    origin_host TEXT,
    redirects INTEGER NOT NULL DEFAULT 0,
    parent TEXT,
    status TEXT NOT NULL,
    status_code INTEGER,
    bytes INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    discovered_at TEXT NOT NULL,
    fetched_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_urls_status ON urls(status);

-- First archive entry of every payload digest
CREATE TABLE IF NOT EXISTS payloads (
    digest TEXT PRIMARY KEY,
    record_id TEXT NOT NULL,
    target_uri TEXT NOT NULL,
    date TEXT NOT NULL
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
