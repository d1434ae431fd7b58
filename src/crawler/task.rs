//! Crawl tasks: one URL waiting to be fetched, with its place in the crawl

use crate::url::{host_key, Fingerprint, Scope};
use url::Url;

/// A URL admitted to the frontier
///
/// Tasks are immutable once created and consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// Normalized URL to fetch
    pub url: Url,

    /// Depth checked against policy: the link depth for pages, the requisite
    /// level for page requisites
    pub depth: u32,

    /// Page hops from the seed; orders the frontier
    pub link_depth: u32,

    pub is_page_requisite: bool,

    /// Offsite linked page; its own links are not followed
    pub is_offsite: bool,

    /// Authority of the page this task was discovered on
    pub origin_host: String,

    /// Redirect hops that led to this task
    pub redirects: u32,

    /// URL this task was discovered on, if any
    pub parent: Option<Url>,
}

impl CrawlTask {
    /// A seed task at depth zero
    pub fn seed(url: Url) -> Self {
        let origin_host = host_key(&url).unwrap_or_default();
        Self {
            url,
            depth: 0,
            link_depth: 0,
            is_page_requisite: false,
            is_offsite: false,
            origin_host,
            redirects: 0,
            parent: None,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_url(&self.url)
    }

    /// Requisite level of this task; zero for pages
    pub fn requisite_level(&self) -> u32 {
        if self.is_page_requisite {
            self.depth
        } else {
            0
        }
    }

    /// Builds the task for a link discovered on this task's resource
    ///
    /// Returns None for verdicts that are not followed.
    pub fn child(&self, url: Url, scope: Scope) -> Option<CrawlTask> {
        let (depth, link_depth, is_page_requisite, is_offsite) = match scope {
            Scope::Recursive => (self.link_depth + 1, self.link_depth + 1, false, false),
            Scope::Offsite => (self.link_depth + 1, self.link_depth + 1, false, true),
            Scope::Requisite => (self.requisite_level() + 1, self.link_depth, true, false),
            Scope::Ignored | Scope::Dropped(_) => return None,
        };

        Some(CrawlTask {
            url,
            depth,
            link_depth,
            is_page_requisite,
            is_offsite,
            origin_host: self.host(),
            redirects: 0,
            parent: Some(self.url.clone()),
        })
    }

    /// Builds the task for the Location target of a redirect
    ///
    /// The target keeps this task's depths and counts one more hop.
    pub fn redirect_to(&self, url: Url, scope: Scope) -> Option<CrawlTask> {
        if !scope.is_followed() {
            return None;
        }

        Some(CrawlTask {
            url,
            depth: self.depth,
            link_depth: self.link_depth,
            is_page_requisite: scope == Scope::Requisite,
            is_offsite: scope == Scope::Offsite,
            origin_host: self.host(),
            redirects: self.redirects + 1,
            parent: Some(self.url.clone()),
        })
    }

    /// `host:port` of this task's own URL
    pub fn host(&self) -> String {
        host_key(&self.url).unwrap_or_default()
    }
}
