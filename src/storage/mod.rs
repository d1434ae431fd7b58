//! Storage module for the persistent dedup index
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - URL fingerprints together with the task that admitted them
//! - Fetch outcomes, so pending work can be resumed
//! - Payload digests of archived bodies
//! - Run tracking and statistics

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteDedupIndex;
pub use traits::{DedupIndex, StorageError, StorageResult};

use crate::state::UrlStatus;
use crate::url::Fingerprint;

use std::path::Path;

/// Opens or creates the dedup index database at `path`
pub fn open_index(path: &Path) -> StorageResult<SqliteDedupIndex> {
    SqliteDedupIndex::new(path)
}

/// Outcome of a fetch, recorded against the URL fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlOutcome {
    pub status: UrlStatus,
    pub status_code: Option<u16>,
    pub bytes: u64,
    pub error: Option<String>,
}

impl UrlOutcome {
    pub fn new(status: UrlStatus) -> Self {
        Self {
            status,
            status_code: None,
            bytes: 0,
            error: None,
        }
    }
}

/// The archive entry holding the first copy of a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadRecord {
    pub digest: Fingerprint,
    /// `WARC-Record-ID` of the response record
    pub record_id: String,
    pub target_uri: String,
    /// `WARC-Date` of the response record
    pub date: String,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Aggregate numbers read back from the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub total_urls: u64,
    pub todo: u64,
    pub done: u64,
    pub redirects: u64,
    pub errors: u64,
    pub skipped: u64,
    pub bytes: u64,
    pub payloads: u64,
    pub hosts: u64,
    pub runs: u64,
}
