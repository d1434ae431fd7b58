//! Crawler module for fetching and following links
//!
//! This module contains the core crawling logic, including:
//! - The breadth-first URL frontier
//! - HTTP fetching with retry logic and per-host politeness
//! - Link extraction from HTML, CSS and sitemaps
//! - The worker pool and the session lifecycle around it

mod cancel;
mod cookies;
mod extractor;
mod fetcher;
mod frontier;
mod hooks;
mod politeness;
mod session;
mod task;
mod worker;

pub use cancel::{CancelHandle, CancelSignal};
pub use cookies::CookieJar;
pub use extractor::{ContentKind, DiscoveredLink, Extractor, Links};
pub use fetcher::{
    build_http_client, FetchErrorKind, FetchResult, FetchStatus, FetchedResponse, Fetcher,
    RequestInfo,
};
pub use frontier::{Frontier, FrontierState};
pub use hooks::{CrawlHook, NoopHook};
pub use politeness::HostLimiter;
pub use session::{CrawlOutcome, CrawlReport, Session};
pub use task::CrawlTask;

use crate::config::PolicyConfig;

/// Runs a complete crawl of `seeds` under `config`
///
/// Convenience wrapper around [`Session`] for callers that need neither a
/// hook nor a cancel handle.
pub async fn crawl<S: AsRef<str>>(config: PolicyConfig, seeds: &[S]) -> crate::Result<CrawlReport> {
    let mut session = Session::new(config, seeds)?;
    Ok(session.run().await)
}
