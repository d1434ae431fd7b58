//! Scope classification of discovered links
//!
//! Every link found on a fetched resource gets a [`Scope`] verdict that decides
//! whether it becomes a new crawl task and with which depths.

use super::{directory_of, extract_host, IgnoreSets};
use crate::config::PolicyConfig;
use crate::crawler::CrawlTask;
use std::fmt;
use url::Url;

/// How a link was referenced by the resource it was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// A navigable page: anchors, frames, sitemap entries, meta refresh
    Page,
    /// A resource needed to render the page: images, scripts, stylesheets
    Requisite,
    /// The Location target of a 3xx response
    Redirect,
}

/// Verdict for a discovered link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Same-host page under the recursion root, followed recursively
    Recursive,
    /// Page requisite, fetched regardless of the recursive flag
    Requisite,
    /// Page on another host, fetched but never recursed from
    Offsite,
    /// Matched an active ignore set
    Ignored,
    /// Not followed
    Dropped(DropReason),
}

/// Why a link was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Recursion is disabled and the link is not a requisite
    NotRecursive,
    /// Same host but above the seed directory
    OutsideRoot,
    /// Another host, and span-hosts does not allow it
    OffsiteDisallowed,
    /// Beyond the recursion level or the page-requisites level
    TooDeep,
    /// Non-requisite link found on an offsite page or a requisite
    NotFollowable,
    /// Redirect chain longer than the configured maximum
    TooManyRedirects,
}

impl Scope {
    /// Returns true if the verdict produces a crawl task
    pub fn is_followed(&self) -> bool {
        matches!(self, Self::Recursive | Self::Requisite | Self::Offsite)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recursive => write!(f, "recursive"),
            Self::Requisite => write!(f, "requisite"),
            Self::Offsite => write!(f, "offsite"),
            Self::Ignored => write!(f, "ignored"),
            Self::Dropped(reason) => write!(f, "dropped ({:?})", reason),
        }
    }
}

/// Recursion root of one seed: its host name and directory
#[derive(Debug, Clone, PartialEq, Eq)]
struct Root {
    host: String,
    directory: String,
}

/// Scope rules of a crawl session
///
/// Built once from the policy and the seeds; read-only afterwards and shared
/// by all workers.
#[derive(Debug, Clone)]
pub struct ScopeRules {
    roots: Vec<Root>,
    ignores: IgnoreSets,
    config: PolicyConfig,
}

impl ScopeRules {
    pub fn new(config: &PolicyConfig, ignores: IgnoreSets, seeds: &[Url]) -> Self {
        let roots = seeds
            .iter()
            .filter_map(|seed| {
                extract_host(seed).map(|host| Root {
                    host,
                    directory: directory_of(seed),
                })
            })
            .collect();

        Self {
            roots,
            ignores,
            config: config.clone(),
        }
    }

    pub fn ignores(&self) -> &IgnoreSets {
        &self.ignores
    }

    /// Returns true if the URL's host name is the host name of some seed
    ///
    /// Scheme and port are ignored, so an `http` seed and its `https`
    /// counterpart are the same site.
    pub fn is_seed_host(&self, url: &Url) -> bool {
        match extract_host(url) {
            Some(host) => self.roots.iter().any(|r| r.host == host),
            None => false,
        }
    }

    /// Returns true if the URL is on a seed host and below that seed's directory
    pub fn is_under_root(&self, url: &Url) -> bool {
        let Some(host) = extract_host(url) else {
            return false;
        };
        let path = url.path();
        self.roots
            .iter()
            .any(|r| r.host == host && path.starts_with(&r.directory))
    }

    /// Classifies a link discovered while handling `parent`
    ///
    /// Ignore sets win over everything else. Requisites are capped by the
    /// page-requisites level, pages by the recursion level.
    pub fn classify(&self, parent: &CrawlTask, link: &Url, kind: LinkKind) -> Scope {
        if self.ignores.is_ignored(link) {
            return Scope::Ignored;
        }

        match kind {
            LinkKind::Requisite => self.classify_requisite(parent, link),
            LinkKind::Page => self.classify_page(parent, link),
            LinkKind::Redirect => self.classify_redirect(parent, link),
        }
    }

    fn classify_requisite(&self, parent: &CrawlTask, link: &Url) -> Scope {
        let level = parent.requisite_level() + 1;
        if level > self.config.crawl.page_requisite_depth {
            return Scope::Dropped(DropReason::TooDeep);
        }
        if !self.is_seed_host(link) && !self.config.crawl.span_hosts_mode.allows_requisites() {
            return Scope::Dropped(DropReason::OffsiteDisallowed);
        }
        Scope::Requisite
    }

    fn classify_page(&self, parent: &CrawlTask, link: &Url) -> Scope {
        if parent.is_page_requisite || parent.is_offsite {
            return Scope::Dropped(DropReason::NotFollowable);
        }
        if !self.config.crawl.recursive {
            return Scope::Dropped(DropReason::NotRecursive);
        }

        let within_level = self.config.crawl.max_depth.allows(parent.link_depth + 1);

        if self.is_seed_host(link) {
            if !self.is_under_root(link) {
                return Scope::Dropped(DropReason::OutsideRoot);
            }
            if !within_level {
                return Scope::Dropped(DropReason::TooDeep);
            }
            return Scope::Recursive;
        }

        if !self.config.crawl.span_hosts_mode.allows_linked_pages() {
            return Scope::Dropped(DropReason::OffsiteDisallowed);
        }
        if !within_level {
            return Scope::Dropped(DropReason::TooDeep);
        }
        Scope::Offsite
    }

    /// Redirect targets keep the nature of the redirecting task
    ///
    /// Page redirects on a seed host obey the seed directory like any other
    /// page, except along a seed's own redirect chain (link depth zero), which
    /// may move the site elsewhere on the host.
    fn classify_redirect(&self, parent: &CrawlTask, link: &Url) -> Scope {
        if parent.redirects + 1 > self.config.http.max_redirects {
            return Scope::Dropped(DropReason::TooManyRedirects);
        }

        let span = self.config.crawl.span_hosts_mode;
        let on_seed_host = self.is_seed_host(link);

        if parent.is_page_requisite {
            if !on_seed_host && !span.allows_requisites() {
                return Scope::Dropped(DropReason::OffsiteDisallowed);
            }
            return Scope::Requisite;
        }

        if on_seed_host && !parent.is_offsite {
            if parent.link_depth > 0 && !self.is_under_root(link) {
                return Scope::Dropped(DropReason::OutsideRoot);
            }
            return Scope::Recursive;
        }
        if span.allows_linked_pages() || (on_seed_host && parent.is_offsite) {
            return Scope::Offsite;
        }
        Scope::Dropped(DropReason::OffsiteDisallowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MaxDepth, SpanHosts};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn rules(config: &PolicyConfig) -> ScopeRules {
        ScopeRules::new(
            config,
            IgnoreSets::global().unwrap(),
            &[url("http://example.com/a/")],
        )
    }

    fn scenario_config() -> PolicyConfig {
        let mut config = PolicyConfig::default();
        config.crawl.max_depth = MaxDepth::Limited(1);
        config.crawl.page_requisite_depth = 2;
        config.crawl.span_hosts_mode = SpanHosts::PageRequisitesOnly;
        config
    }

    #[test]
    fn test_scenario_classification() {
        let config = scenario_config();
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        assert_eq!(
            rules.classify(&seed, &url("http://example.com/a/b"), LinkKind::Page),
            Scope::Recursive
        );
        assert_eq!(
            rules.classify(&seed, &url("http://other.com/img.png"), LinkKind::Requisite),
            Scope::Requisite
        );
        assert_eq!(
            rules.classify(&seed, &url("http://other.com/page.html"), LinkKind::Page),
            Scope::Dropped(DropReason::OffsiteDisallowed)
        );
    }

    #[test]
    fn test_no_parent() {
        let config = scenario_config();
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        assert_eq!(
            rules.classify(&seed, &url("http://example.com/other/"), LinkKind::Page),
            Scope::Dropped(DropReason::OutsideRoot)
        );
        // Requisites are not bound to the seed directory
        assert_eq!(
            rules.classify(&seed, &url("http://example.com/static/site.css"), LinkKind::Requisite),
            Scope::Requisite
        );
    }

    #[test]
    fn test_level_limit() {
        let config = scenario_config();
        let rules = rules(&config);
        let page = CrawlTask::seed(url("http://example.com/a/"))
            .child(url("http://example.com/a/b"), Scope::Recursive)
            .unwrap();

        assert_eq!(
            rules.classify(&page, &url("http://example.com/a/c"), LinkKind::Page),
            Scope::Dropped(DropReason::TooDeep)
        );
    }

    #[test]
    fn test_requisite_level_limit() {
        let config = scenario_config();
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));
        let css = seed
            .child(url("http://example.com/a/site.css"), Scope::Requisite)
            .unwrap();
        let font = css
            .child(url("http://example.com/a/font.woff"), Scope::Requisite)
            .unwrap();

        assert_eq!(css.depth, 1);
        assert_eq!(font.depth, 2);
        assert_eq!(
            rules.classify(&font, &url("http://example.com/a/more.png"), LinkKind::Requisite),
            Scope::Dropped(DropReason::TooDeep)
        );
        assert_eq!(
            rules.classify(&css, &url("http://example.com/a/page"), LinkKind::Page),
            Scope::Dropped(DropReason::NotFollowable)
        );
    }

    #[test]
    fn test_span_hosts_none() {
        let mut config = scenario_config();
        config.crawl.span_hosts_mode = SpanHosts::None;
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        assert_eq!(
            rules.classify(&seed, &url("http://other.com/img.png"), LinkKind::Requisite),
            Scope::Dropped(DropReason::OffsiteDisallowed)
        );
        assert_eq!(
            rules.classify(&seed, &url("http://sub.example.com/a/x"), LinkKind::Page),
            Scope::Dropped(DropReason::OffsiteDisallowed)
        );
    }

    #[test]
    fn test_same_host_across_scheme_and_port() {
        let config = scenario_config();
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        assert_eq!(
            rules.classify(&seed, &url("https://example.com/a/b"), LinkKind::Page),
            Scope::Recursive
        );
        assert_eq!(
            rules.classify(&seed, &url("https://example.com/a/"), LinkKind::Redirect),
            Scope::Recursive
        );
        assert_eq!(
            rules.classify(&seed, &url("http://example.com:8080/a/x"), LinkKind::Page),
            Scope::Recursive
        );
        assert!(rules.is_seed_host(&url("https://EXAMPLE.com/")));
        assert!(!rules.is_under_root(&url("https://example.com/other/")));
    }

    #[test]
    fn test_redirects_respect_seed_directory() {
        let config = scenario_config();
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        // A seed may redirect anywhere on its host
        assert_eq!(
            rules.classify(&seed, &url("http://example.com/moved/"), LinkKind::Redirect),
            Scope::Recursive
        );

        let page = seed
            .child(url("http://example.com/a/b"), Scope::Recursive)
            .unwrap();
        assert_eq!(
            rules.classify(&page, &url("http://example.com/login"), LinkKind::Redirect),
            Scope::Dropped(DropReason::OutsideRoot)
        );
        assert_eq!(
            rules.classify(&page, &url("https://example.com/a/c"), LinkKind::Redirect),
            Scope::Recursive
        );
    }

    #[test]
    fn test_linked_pages_one_hop() {
        let mut config = scenario_config();
        config.crawl.max_depth = MaxDepth::Infinite;
        config.crawl.span_hosts_mode = SpanHosts::PageRequisitesAndLinkedPages;
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        let verdict = rules.classify(&seed, &url("http://other.com/page.html"), LinkKind::Page);
        assert_eq!(verdict, Scope::Offsite);

        let offsite = seed.child(url("http://other.com/page.html"), verdict).unwrap();
        assert!(offsite.is_offsite);
        assert_eq!(
            rules.classify(&offsite, &url("http://other.com/next.html"), LinkKind::Page),
            Scope::Dropped(DropReason::NotFollowable)
        );
        assert_eq!(
            rules.classify(&offsite, &url("http://other.com/logo.png"), LinkKind::Requisite),
            Scope::Requisite
        );
    }

    #[test]
    fn test_not_recursive() {
        let mut config = scenario_config();
        config.crawl.recursive = false;
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        assert_eq!(
            rules.classify(&seed, &url("http://example.com/a/b"), LinkKind::Page),
            Scope::Dropped(DropReason::NotRecursive)
        );
        assert_eq!(
            rules.classify(&seed, &url("http://example.com/a/b.png"), LinkKind::Requisite),
            Scope::Requisite
        );
    }

    #[test]
    fn test_ignored_wins() {
        let config = scenario_config();
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        assert_eq!(
            rules.classify(&seed, &url("http://example.com/a/post?replytocom=3"), LinkKind::Page),
            Scope::Ignored
        );
    }

    #[test]
    fn test_redirects() {
        let mut config = scenario_config();
        config.http.max_redirects = 1;
        let rules = rules(&config);
        let seed = CrawlTask::seed(url("http://example.com/a/"));

        let verdict = rules.classify(&seed, &url("http://example.com/a/index.html"), LinkKind::Redirect);
        assert_eq!(verdict, Scope::Recursive);

        let hop = seed
            .redirect_to(url("http://example.com/a/index.html"), verdict)
            .unwrap();
        assert_eq!(hop.redirects, 1);
        assert_eq!(hop.link_depth, 0);
        assert_eq!(
            rules.classify(&hop, &url("http://example.com/a/final"), LinkKind::Redirect),
            Scope::Dropped(DropReason::TooManyRedirects)
        );

        assert_eq!(
            rules.classify(&seed, &url("http://www.example.com/a/"), LinkKind::Redirect),
            Scope::Dropped(DropReason::OffsiteDisallowed)
        );
    }
}
