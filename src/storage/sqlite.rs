//! SQLite dedup index implementation
//!
//! This module provides a SQLite-based implementation of the DedupIndex trait.

use crate::crawler::CrawlTask;
use crate::state::UrlStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DedupIndex, StorageError, StorageResult};
use crate::storage::{IndexSummary, PayloadRecord, RunRecord, RunStatus, UrlOutcome};
use crate::url::Fingerprint;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// SQLite dedup index shared by all workers of a session
pub struct SqliteDedupIndex {
    conn: Mutex<Connection>,
}

impl SqliteDedupIndex {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

/// Raw task columns, converted outside the rusqlite row closure
struct TaskRow {
    url: String,
    depth: u32,
    link_depth: u32,
    is_requisite: bool,
    is_offsite: bool,
    origin_host: Option<String>,
    redirects: u32,
    parent: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            depth: row.get(1)?,
            link_depth: row.get(2)?,
            is_requisite: row.get(3)?,
            is_offsite: row.get(4)?,
            origin_host: row.get(5)?,
            redirects: row.get(6)?,
            parent: row.get(7)?,
        })
    }

    fn into_task(self) -> StorageResult<CrawlTask> {
        let url = Url::parse(&self.url)
            .map_err(|e| StorageError::Corrupt(format!("url '{}': {}", self.url, e)))?;
        let parent = self.parent.as_deref().and_then(|p| Url::parse(p).ok());
        Ok(CrawlTask {
            url,
            depth: self.depth,
            link_depth: self.link_depth,
            is_page_requisite: self.is_requisite,
            is_offsite: self.is_offsite,
            origin_host: self.origin_host.unwrap_or_default(),
            redirects: self.redirects,
            parent,
        })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Failed),
    })
}

impl DedupIndex for SqliteDedupIndex {
    // ===== Fingerprints =====

    fn has(&self, fingerprint: &Fingerprint) -> StorageResult<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT seq FROM urls WHERE fingerprint = ?1",
                params![fingerprint.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn record(&self, fingerprint: &Fingerprint) -> StorageResult<bool> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO urls (fingerprint, status, discovered_at) VALUES (?1, ?2, ?3)",
            params![fingerprint.to_hex(), UrlStatus::Done.to_db_string(), now],
        )?;
        Ok(inserted == 1)
    }

    fn admit(&self, task: &CrawlTask) -> StorageResult<bool> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO urls (fingerprint, url, depth, link_depth, is_requisite,
             is_offsite, origin_host, redirects, parent, status, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.fingerprint().to_hex(),
                task.url.as_str(),
                task.depth,
                task.link_depth,
                task.is_page_requisite,
                task.is_offsite,
                task.origin_host,
                task.redirects,
                task.parent.as_ref().map(|p| p.as_str()),
                UrlStatus::Todo.to_db_string(),
                now
            ],
        )?;
        Ok(inserted == 1)
    }

    fn mark_done(&self, fingerprint: &Fingerprint, outcome: &UrlOutcome) -> StorageResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE urls SET status = ?1, status_code = ?2, bytes = ?3, error = ?4, fetched_at = ?5
             WHERE fingerprint = ?6",
            params![
                outcome.status.to_db_string(),
                outcome.status_code,
                outcome.bytes as i64,
                outcome.error,
                now,
                fingerprint.to_hex()
            ],
        )?;
        Ok(())
    }

    fn pending(&self) -> StorageResult<Vec<CrawlTask>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT url, depth, link_depth, is_requisite, is_offsite, origin_host, redirects, parent
             FROM urls WHERE status = ?1 AND url IS NOT NULL ORDER BY seq",
        )?;

        let rows = stmt
            .query_map(params![UrlStatus::Todo.to_db_string()], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    // ===== Payloads =====

    fn lookup_payload(&self, digest: &Fingerprint) -> StorageResult<Option<PayloadRecord>> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT record_id, target_uri, date FROM payloads WHERE digest = ?1",
                params![digest.to_hex()],
                |row| {
                    Ok(PayloadRecord {
                        digest: *digest,
                        record_id: row.get(0)?,
                        target_uri: row.get(1)?,
                        date: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    fn record_payload(&self, entry: &PayloadRecord) -> StorageResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO payloads (digest, record_id, target_uri, date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.digest.to_hex(),
                entry.record_id,
                entry.target_uri,
                entry.date
            ],
        )?;
        Ok(inserted == 1)
    }

    // ===== Run Management =====

    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Statistics =====

    fn summary(&self) -> StorageResult<IndexSummary> {
        let conn = self.lock()?;
        let mut summary = IndexSummary::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*), SUM(bytes) FROM urls GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;

        for row in rows {
            let (status, count, bytes) = row?;
            let count = count as u64;
            summary.total_urls += count;
            summary.bytes += bytes.unwrap_or(0) as u64;
            match UrlStatus::from_db_string(&status) {
                Some(UrlStatus::Todo) => summary.todo = count,
                Some(UrlStatus::Done) => summary.done = count,
                Some(UrlStatus::Redirect) => summary.redirects = count,
                Some(UrlStatus::Error) => summary.errors = count,
                Some(UrlStatus::Skipped) => summary.skipped = count,
                None => return Err(StorageError::Corrupt(format!("url status '{}'", status))),
            }
        }

        summary.payloads = conn.query_row("SELECT COUNT(*) FROM payloads", [], |row| {
            row.get::<_, i64>(0)
        })? as u64;
        summary.hosts = conn.query_row(
            "SELECT COUNT(DISTINCT origin_host) FROM urls WHERE origin_host IS NOT NULL",
            [],
            |row| row.get::<_, i64>(0),
        )? as u64;
        summary.runs =
            conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get::<_, i64>(0))? as u64;

        Ok(summary)
    }

    fn flush(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}
