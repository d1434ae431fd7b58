use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// User agent the launcher has always presented to servers
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.3; WOW64; rv:39.0) Gecko/20100101 Firefox/39.0";

/// Main configuration structure for a crawl session
///
/// Every section is optional in the TOML file; missing values fall back to the
/// same defaults the command-line launcher uses.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub crawl: CrawlConfig,
    pub http: HttpConfig,
    pub output: OutputConfig,
    pub ignores: IgnoreConfig,
    #[serde(rename = "ignore-sets")]
    pub ignore_sets: BTreeMap<String, IgnoreSetEntry>,
}

/// Crawl policy: concurrency, recursion and host spanning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Number of fetch workers running in parallel
    pub concurrency: u32,

    /// Follow links under the seed directory, or fetch only the seed and its requisites
    pub recursive: bool,

    /// Maximum link depth from the seed
    #[serde(rename = "level")]
    pub max_depth: MaxDepth,

    /// Maximum requisite chain length (page -> stylesheet -> image is 2)
    #[serde(rename = "page-requisites-level")]
    pub page_requisite_depth: u32,

    /// Which links may leave the seed host
    #[serde(rename = "span-hosts")]
    pub span_hosts_mode: SpanHosts,

    /// Queue the host's /sitemap.xml next to each seed
    pub sitemaps: bool,

    /// Minimum time between two requests to the same host (milliseconds)
    #[serde(rename = "politeness-delay")]
    pub politeness_delay: u64,

    /// Remove session identifiers from URLs before fingerprinting
    #[serde(rename = "strip-session-id")]
    pub strip_session_id: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            recursive: true,
            max_depth: MaxDepth::Infinite,
            page_requisite_depth: 5,
            span_hosts_mode: SpanHosts::PageRequisitesOnly,
            sitemaps: true,
            politeness_delay: 0,
            strip_session_id: true,
        }
    }
}

/// HTTP client behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Extra request headers in "Name: value" form
    pub headers: Vec<String>,

    /// Per-request timeout (milliseconds)
    pub timeout: u64,

    /// Total number of attempts for a URL that fails transiently
    #[serde(rename = "tries")]
    pub retry_count: u32,

    /// Pause between two attempts of the same URL (milliseconds)
    #[serde(rename = "wait-retry")]
    pub wait_retry: u64,

    /// Maximum number of redirect hops followed from one URL
    #[serde(rename = "max-redirects")]
    pub max_redirects: u32,

    /// Verify TLS server certificates (off unless enabled)
    #[serde(rename = "check-certificate")]
    pub check_certificate: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: vec![
                "Accept: text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                    .to_string(),
                "Accept-Language: en-US,en;q=0.5".to_string(),
            ],
            timeout: 20_000,
            retry_count: 3,
            wait_retry: 5_000,
            max_redirects: 8,
            check_certificate: false,
        }
    }
}

impl HttpConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn wait_retry_duration(&self) -> Duration {
        Duration::from_millis(self.wait_retry)
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving every file of the session
    pub directory: PathBuf,

    /// WARC segment file name prefix
    #[serde(rename = "warc-prefix")]
    pub warc_prefix: String,

    /// Maximum size of one WARC segment in bytes
    #[serde(rename = "warc-max-size")]
    pub warc_max_size: u64,

    /// Compress every record as its own gzip member
    #[serde(rename = "warc-gzip")]
    pub warc_gzip: bool,

    /// Session log file name, relative to `directory`
    #[serde(rename = "log-file")]
    pub log_file: String,

    /// Dedup index database file name, relative to `directory`
    pub database: String,

    /// Saved cookie jar file name, relative to `directory`
    #[serde(rename = "cookie-file")]
    pub cookie_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            warc_prefix: "crawl".to_string(),
            warc_max_size: 5_368_709_120,
            warc_gzip: true,
            log_file: "crawl.log".to_string(),
            database: "crawl.db".to_string(),
            cookie_file: "cookies.json".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn database_path(&self) -> PathBuf {
        self.directory.join(&self.database)
    }

    pub fn log_path(&self) -> PathBuf {
        self.directory.join(&self.log_file)
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.directory.join(&self.cookie_file)
    }
}

/// Active ignore sets and ad-hoc patterns
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Named sets to activate in addition to "global"
    pub sets: Vec<String>,

    /// Patterns active regardless of sets
    pub patterns: Vec<String>,
}

/// A user-defined ignore set
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IgnoreSetEntry {
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Maximum recursion depth, either a number of hops or unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "LevelValue", into = "LevelValue")]
pub enum MaxDepth {
    Limited(u32),
    Infinite,
}

impl MaxDepth {
    /// Returns true if a task at `depth` is within the limit
    pub fn allows(&self, depth: u32) -> bool {
        match self {
            Self::Limited(max) => depth <= *max,
            Self::Infinite => true,
        }
    }
}

impl fmt::Display for MaxDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{}", max),
            Self::Infinite => write!(f, "inf"),
        }
    }
}

impl FromStr for MaxDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("inf") || s.eq_ignore_ascii_case("infinite") {
            return Ok(Self::Infinite);
        }
        s.parse::<u32>()
            .map(Self::Limited)
            .map_err(|_| format!("level must be a non-negative integer or \"inf\", got '{}'", s))
    }
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum LevelValue {
    Number(i64),
    Text(String),
}

impl TryFrom<LevelValue> for MaxDepth {
    type Error = String;

    fn try_from(value: LevelValue) -> Result<Self, Self::Error> {
        match value {
            LevelValue::Number(n) => u32::try_from(n)
                .map(Self::Limited)
                .map_err(|_| format!("level must be between 0 and {}, got {}", u32::MAX, n)),
            LevelValue::Text(s) => s.parse(),
        }
    }
}

impl From<MaxDepth> for LevelValue {
    fn from(depth: MaxDepth) -> Self {
        match depth {
            MaxDepth::Limited(max) => Self::Number(i64::from(max)),
            MaxDepth::Infinite => Self::Text(depth.to_string()),
        }
    }
}

/// Policy for links leaving the seed host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpanHosts {
    /// Never leave the seed host
    None,
    /// Fetch page requisites from any host
    PageRequisitesOnly,
    /// Fetch page requisites from any host, and linked pages one hop away
    PageRequisitesAndLinkedPages,
}

impl SpanHosts {
    pub fn allows_requisites(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn allows_linked_pages(&self) -> bool {
        matches!(self, Self::PageRequisitesAndLinkedPages)
    }
}

impl fmt::Display for SpanHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::PageRequisitesOnly => "page-requisites",
            Self::PageRequisitesAndLinkedPages => "page-requisites,linked-pages",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SpanHosts {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requisites = false;
        let mut linked = false;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part {
                "none" => {}
                "page-requisites" => requisites = true,
                "linked-pages" => linked = true,
                other => return Err(format!("unknown span-hosts value '{}'", other)),
            }
        }
        match (requisites, linked) {
            (false, false) => Ok(Self::None),
            (true, false) => Ok(Self::PageRequisitesOnly),
            (true, true) => Ok(Self::PageRequisitesAndLinkedPages),
            (false, true) => Err("linked-pages requires page-requisites".to_string()),
        }
    }
}

impl TryFrom<String> for SpanHosts {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpanHosts> for String {
    fn from(mode: SpanHosts) -> Self {
        mode.to_string()
    }
}
