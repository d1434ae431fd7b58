//! Extension points for embedding applications

use crate::crawler::FetchResult;
use crate::url::Scope;
use url::Url;

/// Callbacks invoked by the fetch workers
///
/// Both methods have no-op defaults. Implementations are shared by all
/// workers and must be cheap: they run on the crawl's hot path.
pub trait CrawlHook: Send + Sync {
    /// Overrides the scope verdict of a discovered link
    fn decide_scope(&self, link: &Url, verdict: Scope) -> Scope {
        let _ = link;
        verdict
    }

    /// Observes every handled task, after archiving
    fn on_fetch_complete(&self, result: &FetchResult) {
        let _ = result;
    }
}

/// Hook that keeps every verdict
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl CrawlHook for NoopHook {}
