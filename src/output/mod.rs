//! Output module for crawl statistics
//!
//! This module handles:
//! - Live session counters
//! - Statistics read back from the dedup index
//! - Formatted reports on stdout

pub mod stats;

pub use stats::{
    format_bytes, load_statistics, print_index_statistics, print_statistics, CrawlStatistics,
    IndexStatistics, SessionStats,
};
