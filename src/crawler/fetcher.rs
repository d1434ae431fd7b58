//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client from the policy
//! - GET requests with the configured headers
//! - Retry logic for transient failures
//! - Error classification
//!
//! Redirects are never followed by the client: a 3xx response is returned as
//! is and its target becomes a separate crawl task.

use crate::config::{parse_header_line, HttpConfig};
use crate::crawler::{CancelSignal, CookieJar, CrawlTask, DiscoveredLink, HostLimiter};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::{Host, Url};

/// Why a fetch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// No response within the configured timeout
    Timeout,
    /// Connection refused or reset
    Connect,
    /// Host name could not be resolved
    Dns,
    /// The response body could not be read completely
    Body,
    /// HTTP error status (4xx or 5xx)
    Http(u16),
    /// The URL cannot be requested
    InvalidUrl,
    /// Anything else reported by the HTTP stack
    Other,
}

impl FetchErrorKind {
    /// Returns true if the failure is worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect | Self::Body => true,
            Self::Http(code) => *code >= 500,
            Self::Dns | Self::InvalidUrl | Self::Other => false,
        }
    }

    /// Classifies an error reported by reqwest
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout;
        }
        if error.is_builder() {
            return Self::InvalidUrl;
        }
        if error.is_connect() {
            return Self::Connect;
        }
        if error.is_body() || error.is_decode() {
            return Self::Body;
        }
        if let Some(status) = error.status() {
            return Self::Http(status.as_u16());
        }
        Self::Other
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Dns => write!(f, "dns"),
            Self::Body => write!(f, "body"),
            Self::Http(code) => write!(f, "http-{}", code),
            Self::InvalidUrl => write!(f, "invalid-url"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Tells a failed name lookup apart from a refused connection
///
/// reqwest reports both as connect errors, so the host is resolved again.
async fn refine_connect_error(url: &Url) -> FetchErrorKind {
    let Some(Host::Domain(host)) = url.host() else {
        return FetchErrorKind::Connect;
    };
    let port = url.port_or_known_default().unwrap_or(80);
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => match addrs.next() {
            Some(_) => FetchErrorKind::Connect,
            None => FetchErrorKind::Dns,
        },
        _ => FetchErrorKind::Dns,
    }
}

/// Outcome class of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    Redirect,
    Error(FetchErrorKind),
    /// Never requested: the URL matched an ignore set when dequeued
    Skipped,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Redirect => write!(f, "redirect"),
            Self::Error(kind) => write!(f, "error:{}", kind),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// The request as it was sent, for the archive
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

/// A response as received
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: u16,
    pub reason: String,
    /// Protocol version, e.g. "HTTP/1.1"
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// First header value with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Lowercase media type without parameters
    pub fn media_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|ct| ct.split(';').next())
            .map(|mt| mt.trim().to_ascii_lowercase())
            .filter(|mt| !mt.is_empty())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.header("location").is_some()
    }
}

/// Result of handling one crawl task
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub task: CrawlTask,
    pub status: FetchStatus,
    pub request: Option<RequestInfo>,
    pub response: Option<FetchedResponse>,
    /// Number of requests made for this task
    pub attempts: u32,
    /// Links extracted from the response, filled in by the worker
    pub links: Vec<DiscoveredLink>,
}

impl FetchResult {
    pub fn skipped(task: CrawlTask) -> Self {
        Self {
            task,
            status: FetchStatus::Skipped,
            request: None,
            response: None,
            attempts: 0,
            links: Vec::new(),
        }
    }

    /// Size of the response body, zero without a response
    pub fn body_len(&self) -> u64 {
        self.response.as_ref().map(|r| r.body.len() as u64).unwrap_or(0)
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    /// Resolved Location target of a redirect
    pub fn redirect_target(&self) -> Option<Url> {
        let response = self.response.as_ref()?;
        if !response.is_redirect() {
            return None;
        }
        let location = response.header("location")?;
        self.task.url.join(location.trim()).ok()
    }
}

/// Builds the HTTP client used by all workers
///
/// Redirects are disabled; cookies go to and come from `cookies`.
pub fn build_http_client(
    config: &HttpConfig,
    cookies: Arc<CookieJar>,
) -> Result<Client, reqwest::Error> {
    let timeout = config.timeout_duration();

    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .cookie_provider(cookies)
        .danger_accept_invalid_certs(!config.check_certificate)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs requests with the session's headers, retries and politeness
pub struct Fetcher {
    client: Client,
    cookies: Arc<CookieJar>,
    headers: Vec<(String, String)>,
    tries: u32,
    wait_retry: Duration,
}

impl Fetcher {
    pub fn new(config: &HttpConfig) -> crate::Result<Self> {
        Self::with_cookies(config, Arc::new(CookieJar::new()))
    }

    /// Fetcher whose requests share `cookies` with the caller
    pub fn with_cookies(config: &HttpConfig, cookies: Arc<CookieJar>) -> crate::Result<Self> {
        let client = build_http_client(config, Arc::clone(&cookies))?;

        let mut headers = vec![("User-Agent".to_string(), config.user_agent.clone())];
        for line in &config.headers {
            let (name, value) = parse_header_line(line)?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Self {
            client,
            cookies,
            headers,
            tries: config.retry_count.max(1),
            wait_retry: config.wait_retry_duration(),
        })
    }

    /// Fetches a task's URL, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx, 3xx | Done |
    /// | 4xx | Immediate error, response kept |
    /// | 5xx | Retry, then error with the last response |
    /// | Timeout, reset, truncated body | Retry, then error |
    /// | DNS failure, invalid URL | Immediate error |
    ///
    /// `tries` is the total number of attempts. Returns None if cancellation
    /// arrived while waiting to retry; the task then stays pending.
    pub async fn fetch(
        &self,
        task: &CrawlTask,
        limiter: &HostLimiter,
        cancel: &mut CancelSignal,
    ) -> Option<FetchResult> {
        let request = self.request_info(&task.url);
        let mut attempts = 0;

        loop {
            attempts += 1;
            limiter.wait_turn(&task.host()).await;

            let (status, response) = match self.attempt(&task.url).await {
                Ok(response) => {
                    let status = classify_status(&response);
                    (status, Some(response))
                }
                Err(kind) => (FetchStatus::Error(kind), None),
            };

            let retry = match status {
                FetchStatus::Error(kind) => kind.is_transient() && attempts < self.tries,
                _ => false,
            };

            if !retry {
                return Some(FetchResult {
                    task: task.clone(),
                    status,
                    request: Some(request),
                    response,
                    attempts,
                    links: Vec::new(),
                });
            }

            tracing::warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempts,
                self.tries,
                task.url,
                status,
                self.wait_retry
            );

            tokio::select! {
                _ = tokio::time::sleep(self.wait_retry) => {}
                _ = cancel.cancelled() => {
                    tracing::debug!("Cancelled while waiting to retry {}", task.url);
                    return None;
                }
            }
        }
    }

    async fn attempt(&self, url: &Url) -> Result<FetchedResponse, FetchErrorKind> {
        let mut builder = self.client.get(url.clone());
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = FetchErrorKind::from_reqwest(&e);
                if kind == FetchErrorKind::Connect {
                    return Err(refine_connect_error(url).await);
                }
                return Err(kind);
            }
        };

        let status = response.status();
        let version = format!("{:?}", response.version());
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchErrorKind::from_reqwest(&e))?;

        Ok(FetchedResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            version,
            headers,
            body: body.to_vec(),
        })
    }

    fn request_info(&self, url: &Url) -> RequestInfo {
        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        if let Some(host) = url.host_str() {
            let host = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
            headers.push(("Host".to_string(), host));
        }
        headers.extend(self.headers.iter().cloned());
        if let Some(cookie) = self.cookies.header_for(url) {
            headers.push(("Cookie".to_string(), cookie));
        }

        RequestInfo {
            method: "GET".to_string(),
            url: url.clone(),
            headers,
        }
    }
}

fn classify_status(response: &FetchedResponse) -> FetchStatus {
    let code = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if response.is_redirect() {
        FetchStatus::Redirect
    } else if code.is_client_error() || code.is_server_error() {
        FetchStatus::Error(FetchErrorKind::Http(response.status))
    } else {
        FetchStatus::Success
    }
}
