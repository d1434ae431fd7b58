//! Storage traits and error types
//!
//! This module defines the trait interface for dedup index backends and
//! associated error types.

use crate::crawler::CrawlTask;
use crate::storage::{IndexSummary, PayloadRecord, RunRecord, RunStatus, UrlOutcome};
use crate::url::Fingerprint;
use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Every storage error is fatal to the crawl session.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Archive writer is closed")]
    WriterClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for dedup index implementations
///
/// Implementations must be safe to share between fetch workers: every method
/// takes `&self` and synchronizes internally.
pub trait DedupIndex: Send + Sync {
    // ===== Fingerprints =====

    /// Returns true if the fingerprint has been recorded
    fn has(&self, fingerprint: &Fingerprint) -> StorageResult<bool>;

    /// Records a bare fingerprint; returns true if it was not recorded before
    fn record(&self, fingerprint: &Fingerprint) -> StorageResult<bool>;

    /// Records the task's URL fingerprint together with the task, if absent
    ///
    /// The check and the insert are a single atomic step, so two concurrent
    /// callers admitting the same URL see exactly one `true`.
    fn admit(&self, task: &CrawlTask) -> StorageResult<bool>;

    /// Records the outcome of a fetch
    fn mark_done(&self, fingerprint: &Fingerprint, outcome: &UrlOutcome) -> StorageResult<()>;

    /// Tasks admitted but never finished, in admission order
    fn pending(&self) -> StorageResult<Vec<CrawlTask>>;

    // ===== Payloads =====

    /// Finds the archive entry holding the first copy of a payload
    fn lookup_payload(&self, digest: &Fingerprint) -> StorageResult<Option<PayloadRecord>>;

    /// Records the archive entry of a payload; returns false if one existed
    fn record_payload(&self, entry: &PayloadRecord) -> StorageResult<bool>;

    // ===== Run Management =====

    /// Creates a new crawl run and returns its id
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with the given status
    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Statistics =====

    fn summary(&self) -> StorageResult<IndexSummary>;

    /// Persists everything written so far
    fn flush(&self) -> StorageResult<()>;
}
