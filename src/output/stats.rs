//! Crawl statistics
//!
//! Live counters are kept by the session while it runs; the persisted numbers
//! are read back from the dedup index for the `--stats` mode.

use crate::archive::WriteReceipt;
use crate::crawler::{FetchResult, FetchStatus};
use crate::storage::{DedupIndex, IndexSummary, RunRecord, StorageResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by all workers of a session
#[derive(Debug, Default)]
pub struct SessionStats {
    urls_seen: AtomicU64,
    fetched: AtomicU64,
    redirects: AtomicU64,
    errors: AtomicU64,
    skipped: AtomicU64,
    retries: AtomicU64,
    bytes: AtomicU64,
    records: AtomicU64,
    revisits: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a task admitted to the frontier
    pub fn record_admitted(&self, count: u64) {
        self.urls_seen.fetch_add(count, Ordering::Relaxed);
    }

    /// Counts the outcome of one handled task
    pub fn record_result(&self, result: &FetchResult) {
        let counter = match result.status {
            FetchStatus::Success => &self.fetched,
            FetchStatus::Redirect => &self.redirects,
            FetchStatus::Error(_) => &self.errors,
            FetchStatus::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.retries
            .fetch_add(u64::from(result.attempts.saturating_sub(1)), Ordering::Relaxed);
        self.bytes.fetch_add(result.body_len(), Ordering::Relaxed);
    }

    pub fn record_write(&self, receipt: &WriteReceipt) {
        self.records
            .fetch_add(u64::from(receipt.records), Ordering::Relaxed);
        if receipt.revisit {
            self.revisits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, elapsed: Duration) -> CrawlStatistics {
        CrawlStatistics {
            urls_seen: self.urls_seen.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            revisits: self.revisits.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Point-in-time copy of the session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// URLs admitted during this session
    pub urls_seen: u64,
    pub fetched: u64,
    pub redirects: u64,
    pub errors: u64,
    pub skipped: u64,
    /// Extra attempts spent on transient failures
    pub retries: u64,
    /// Response body bytes received
    pub bytes: u64,
    /// WARC records written, excluding warcinfo
    pub records: u64,
    pub revisits: u64,
    pub elapsed: Duration,
}

impl CrawlStatistics {
    /// Tasks that reached a final status
    pub fn handled(&self) -> u64 {
        self.fetched + self.redirects + self.errors + self.skipped
    }
}

/// Prints session statistics to stdout
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Session:");
    println!("  URLs admitted: {}", stats.urls_seen);
    println!("  Handled: {}", stats.handled());
    println!("    Fetched: {}", stats.fetched);
    println!("    Redirects: {}", stats.redirects);
    println!("    Errors: {}", stats.errors);
    println!("    Skipped: {}", stats.skipped);
    println!("  Retries: {}", stats.retries);
    println!("  Downloaded: {}", format_bytes(stats.bytes));
    println!();

    println!("Archive:");
    println!("  Records written: {}", stats.records);
    println!("  Revisits: {}", stats.revisits);
    println!();

    let secs = stats.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        stats.handled() as f64 / secs
    } else {
        0.0
    };
    println!("Elapsed: {:.1}s ({:.2} URLs/sec)", secs, rate);
}

/// Statistics persisted in the dedup index
#[derive(Debug, Clone)]
pub struct IndexStatistics {
    pub summary: IndexSummary,
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from the dedup index
pub fn load_statistics(index: &dyn DedupIndex) -> StorageResult<IndexStatistics> {
    Ok(IndexStatistics {
        summary: index.summary()?,
        latest_run: index.latest_run()?,
    })
}

/// Prints persisted statistics to stdout
pub fn print_index_statistics(stats: &IndexStatistics) {
    let s = &stats.summary;
    println!("=== Archive Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest run: #{} ({})", run.id, run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Config hash: {}", run.config_hash);
        println!("  Runs recorded: {}", s.runs);
        println!();
    }

    println!("URLs:");
    println!("  Total: {}", s.total_urls);
    for (label, count) in [
        ("Done", s.done),
        ("Redirect", s.redirects),
        ("Error", s.errors),
        ("Skipped", s.skipped),
        ("Pending", s.todo),
    ] {
        let percentage = if s.total_urls > 0 {
            (count as f64 / s.total_urls as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!();

    println!("Hosts referring: {}", s.hosts);
    println!("Unique payloads: {}", s.payloads);
    println!("Downloaded: {}", format_bytes(s.bytes));
}

/// Formats a byte count with a binary unit
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
