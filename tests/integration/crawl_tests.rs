//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, from the seed to the WARC files.

use flate2::read::MultiGzDecoder;
use sitegrab::config::{IgnoreSetEntry, MaxDepth, PolicyConfig, SpanHosts};
use sitegrab::crawler::FetchResult;
use sitegrab::storage::DedupIndex;
use sitegrab::{CancelHandle, CrawlHook, CrawlOutcome, Session};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{headers, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration writing into `dir`
fn create_test_config(dir: &Path) -> PolicyConfig {
    let mut config = PolicyConfig::default();
    config.crawl.concurrency = 2;
    config.crawl.sitemaps = false;
    config.http.timeout = 2_000;
    config.http.retry_count = 1;
    config.http.wait_retry = 10;
    config.output.directory = dir.to_path_buf();
    config
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

/// Base URL of `server` under a host name other than the one in `uri()`
///
/// Every mock server listens on 127.0.0.1; reaching one through `localhost`
/// makes it a different host for span-hosts purposes.
fn other_host(server: &MockServer) -> String {
    server.uri().replace("127.0.0.1", "localhost")
}

/// Concatenated, decompressed content of every WARC segment
fn read_warcs(segments: &[PathBuf]) -> String {
    let mut content = String::new();
    for segment in segments {
        let file = std::fs::File::open(segment).expect("Failed to open segment");
        MultiGzDecoder::new(file)
            .read_to_string(&mut content)
            .expect("Failed to decompress segment");
    }
    content
}

async fn mount_page(server: &MockServer, route: &str, body: String, hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_with_offsite_requisites() {
    let site = MockServer::start().await;
    let cdn = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_page(
        &site,
        "/",
        format!(
            r#"<html><head><link rel="stylesheet" href="/style.css"></head><body>
            <a href="/page1">Page 1</a>
            <img src="{cdn}/logo.png">
            <a href="{cdn}/elsewhere.html">Elsewhere</a>
            </body></html>"#,
            cdn = other_host(&cdn)
        ),
        1,
    )
    .await;
    mount_page(
        &site,
        "/page1",
        r#"<html><body><a href="/deep">Too deep</a></body></html>"#.to_string(),
        1,
    )
    .await;
    mount_page(&site, "/deep", String::new(), 0).await;

    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("body { background: url(/bg.png); }", "text/css"),
        )
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/bg.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"PNGDATA-bg".to_vec(), "image/png"),
        )
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"PNGDATA-logo".to_vec(), "image/png"),
        )
        .expect(1)
        .mount(&cdn)
        .await;
    mount_page(&cdn, "/elsewhere.html", String::new(), 0).await;

    let mut config = create_test_config(temp.path());
    config.crawl.max_depth = MaxDepth::Limited(1);
    config.crawl.page_requisite_depth = 2;
    config.crawl.span_hosts_mode = SpanHosts::PageRequisitesOnly;

    let mut session =
        Session::new(config, &[format!("{}/", site.uri())]).expect("Failed to create session");
    let report = session.run().await;

    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.outcome.exit_code(), 0);
    // Home, page1, stylesheet, background, logo
    assert_eq!(report.stats.fetched, 5);
    assert_eq!(report.stats.errors, 0);
    assert_eq!(report.segments.len(), 1);

    let warc = read_warcs(&report.segments);
    assert!(warc.starts_with("WARC/1.0\r\nWARC-Type: warcinfo\r\n"));
    assert_eq!(warc.matches("WARC-Type: request\r\n").count(), 5);
    assert_eq!(warc.matches("WARC-Type: response\r\n").count(), 5);
    assert!(warc.contains(&format!("WARC-Target-URI: {}/logo.png", other_host(&cdn))));
    assert!(warc.contains("PNGDATA-bg"));

    let summary = session.index().summary().expect("Failed to read summary");
    assert_eq!(summary.done, 5);
    assert_eq!(summary.todo, 0);
    assert!(session.index().pending().expect("Failed to read pending").is_empty());

    let log = std::fs::read_to_string(temp.path().join("crawl.log")).expect("Failed to read log");
    assert_eq!(log.lines().count(), 5);
    assert!(log.lines().all(|l| l.contains(" OK 200 ")));
}

#[tokio::test]
async fn test_each_url_fetched_once() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    let links = r#"<a href="/a">A</a> <a href="/b">B</a> <a href="/shared">S</a>
        <a href="/shared#top">S again</a> <a href="/">Home</a>"#;
    mount_page(&server, "/", format!("<html><body>{}</body></html>", links), 1).await;
    mount_page(&server, "/a", format!("<html><body>a {}</body></html>", links), 1).await;
    mount_page(&server, "/b", format!("<html><body>b {}</body></html>", links), 1).await;
    mount_page(&server, "/shared", "<html><body>shared</body></html>".to_string(), 1).await;

    let mut config = create_test_config(temp.path());
    config.crawl.concurrency = 4;

    let report = sitegrab::crawler::crawl(config, &[format!("{}/", server.uri())])
        .await
        .expect("Failed to start crawl");

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.fetched, 4);
    assert_eq!(report.stats.urls_seen, 4);
}

#[tokio::test]
async fn test_no_recursion_outside_seed_directory() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_page(
        &server,
        "/docs/index.html",
        r#"<html><body><a href="/docs/guide.html">Guide</a>
        <a href="/blog/post.html">Blog</a></body></html>"#
            .to_string(),
        1,
    )
    .await;
    mount_page(&server, "/docs/guide.html", "<p>guide</p>".to_string(), 1).await;
    mount_page(&server, "/blog/post.html", "<p>blog</p>".to_string(), 0).await;

    let report = sitegrab::crawler::crawl(
        create_test_config(temp.path()),
        &[format!("{}/docs/index.html", server.uri())],
    )
    .await
    .expect("Failed to start crawl");

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.fetched, 2);
}

#[tokio::test]
async fn test_span_hosts_none_skips_offsite_requisites() {
    let site = MockServer::start().await;
    let cdn = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_page(
        &site,
        "/",
        format!(r#"<img src="/local.png"><img src="{}/remote.png">"#, other_host(&cdn)),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/local.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"local".to_vec()))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&cdn)
        .await;

    let mut config = create_test_config(temp.path());
    config.crawl.span_hosts_mode = SpanHosts::None;

    let report = sitegrab::crawler::crawl(config, &[format!("{}/", site.uri())])
        .await
        .expect("Failed to start crawl");

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.fetched, 2);
}

#[tokio::test]
async fn test_redirect_is_archived_and_followed() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/home.html"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/home.html", "<p>home</p>".to_string(), 1).await;

    let report = sitegrab::crawler::crawl(
        create_test_config(temp.path()),
        &[format!("{}/", server.uri())],
    )
    .await
    .expect("Failed to start crawl");

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.redirects, 1);
    assert_eq!(report.stats.fetched, 1);

    let warc = read_warcs(&report.segments);
    assert!(warc.contains("HTTP/1.1 301"));
    assert!(warc.contains(&format!("WARC-Target-URI: {}/home.html", server.uri())));
}

#[tokio::test]
async fn test_redirect_to_https_stays_on_site() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");
    let secure = format!("{}/", server.uri().replace("http://", "https://"));

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", secure.as_str()))
        .expect(1)
        .mount(&server)
        .await;

    let report = sitegrab::crawler::crawl(
        create_test_config(temp.path()),
        &[format!("{}/", server.uri())],
    )
    .await
    .expect("Failed to start crawl");

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.redirects, 1);
    // The upgraded URL is fetched; the mock only speaks plain HTTP, so it fails
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.urls_seen, 2);

    let log = std::fs::read_to_string(temp.path().join("crawl.log")).expect("Failed to read log");
    assert!(log.contains(&format!(" ERROR - 0 {}", secure)));
}

#[tokio::test]
async fn test_timeouts_are_retried_then_recorded() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_millis(1_000)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let mut config = create_test_config(temp.path());
    config.http.timeout = 100;
    config.http.retry_count = 3;

    let report = sitegrab::crawler::crawl(config, &[format!("{}/slow", server.uri())])
        .await
        .expect("Failed to start crawl");

    // Per-URL failures never fail the crawl
    assert_eq!(report.outcome, CrawlOutcome::Completed);
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.retries, 2);
    // Nothing was received, so no segment was opened
    assert!(report.segments.is_empty());

    let log = std::fs::read_to_string(temp.path().join("crawl.log")).expect("Failed to read log");
    assert!(log.contains(" ERROR - 0 "));
    assert!(log.trim_end().ends_with("timeout"));
}

#[tokio::test]
async fn test_http_errors_are_archived() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_page(&server, "/", r#"<a href="/missing">gone</a>"#.to_string(), 1).await;

    let report = sitegrab::crawler::crawl(
        create_test_config(temp.path()),
        &[format!("{}/", server.uri())],
    )
    .await
    .expect("Failed to start crawl");

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.errors, 1);
    assert!(read_warcs(&report.segments).contains("HTTP/1.1 404"));
}

#[tokio::test]
async fn test_identical_payloads_become_revisits() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_page(
        &server,
        "/",
        r#"<a href="/copy1.txt">1</a> <a href="/copy2.txt">2</a>"#.to_string(),
        1,
    )
    .await;
    for route in ["/copy1.txt", "/copy2.txt"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("the very same payload", "text/plain"),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut config = create_test_config(temp.path());
    config.crawl.concurrency = 1;

    let report = sitegrab::crawler::crawl(config, &[format!("{}/", server.uri())])
        .await
        .expect("Failed to start crawl");

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.fetched, 3);
    assert_eq!(report.stats.revisits, 1);

    let warc = read_warcs(&report.segments);
    assert_eq!(warc.matches("WARC-Type: revisit\r\n").count(), 1);
    assert_eq!(warc.matches("the very same payload").count(), 1);
    assert!(warc.contains("WARC-Refers-To-Target-URI:"));
}

#[tokio::test]
async fn test_ignore_sets_drop_links_and_skip_seeds() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_page(
        &server,
        "/",
        r#"<a href="/calendar?month=1">Cal</a> <a href="/about">About</a>"#.to_string(),
        1,
    )
    .await;
    mount_page(&server, "/about", "<p>about</p>".to_string(), 1).await;
    mount_page(&server, "/calendar", String::new(), 0).await;

    let mut config = create_test_config(temp.path());
    config.ignore_sets.insert(
        "calendars".to_string(),
        IgnoreSetEntry {
            patterns: vec![r"/calendar\?".to_string()],
        },
    );
    config.ignores.sets = vec!["calendars".to_string()];

    let seeds = [
        format!("{}/", server.uri()),
        format!("{}/calendar?month=2", server.uri()),
    ];
    let report = sitegrab::crawler::crawl(config, &seeds)
        .await
        .expect("Failed to start crawl");

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.fetched, 2);
    // Ignored links are never queued; an ignored seed is skipped without a request
    assert_eq!(report.stats.skipped, 1);

    let log = std::fs::read_to_string(temp.path().join("crawl.log")).expect("Failed to read log");
    assert!(log.contains(" SKIPPED - 0 "));
    assert!(!log.contains("month=1"));
}

#[tokio::test]
async fn test_resume_does_not_refetch() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_page(&server, "/", r#"<a href="/one">1</a>"#.to_string(), 1).await;
    mount_page(&server, "/one", "<p>one</p>".to_string(), 1).await;

    let seeds = [format!("{}/", server.uri())];
    {
        let mut session =
            Session::new(create_test_config(temp.path()), &seeds).expect("Failed to create session");
        let report = session.run().await;
        assert!(report.outcome.is_completed());
        assert_eq!(report.stats.fetched, 2);
    }

    let mut session =
        Session::new(create_test_config(temp.path()), &seeds).expect("Failed to create session");
    let report = session.run().await;

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.fetched, 0);
    assert_eq!(report.stats.urls_seen, 0);

    let summary = session.index().summary().expect("Failed to read summary");
    assert_eq!(summary.done, 2);
    assert_eq!(summary.runs, 2);
    assert!(report.segments.is_empty());
    assert!(temp.path().join("crawl-00000.warc.gz").exists());
}

/// Cancels the crawl once the first task is handled
struct CancelAfterFirst {
    handle: CancelHandle,
}

impl CrawlHook for CancelAfterFirst {
    fn on_fetch_complete(&self, _result: &FetchResult) {
        self.handle.cancel();
    }
}

#[tokio::test]
async fn test_cancelled_crawl_resumes_pending_urls() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    mount_page(
        &server,
        "/",
        r#"<a href="/p1">1</a> <a href="/p2">2</a>"#.to_string(),
        1,
    )
    .await;
    mount_page(&server, "/p1", "<p>1</p>".to_string(), 1).await;
    mount_page(&server, "/p2", "<p>2</p>".to_string(), 1).await;

    let seeds = [format!("{}/", server.uri())];
    let mut config = create_test_config(temp.path());
    config.crawl.concurrency = 1;

    {
        let session = Session::new(config.clone(), &seeds).expect("Failed to create session");
        let handle = session.cancel_handle();
        let mut session = session.with_hook(Arc::new(CancelAfterFirst { handle }));

        let report = session.run().await;
        assert_eq!(report.outcome, CrawlOutcome::Cancelled);
        assert_eq!(report.outcome.exit_code(), 130);
        assert_eq!(report.stats.fetched, 1);

        let pending = session.index().pending().expect("Failed to read pending");
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|t| t.depth == 1));
    }

    let mut session = Session::new(config, &seeds).expect("Failed to create session");
    let report = session.run().await;

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.fetched, 2);
    assert!(session.index().pending().expect("Failed to read pending").is_empty());
    assert!(temp.path().join("crawl-00001.warc.gz").exists());
}

#[tokio::test]
async fn test_cookies_carry_over_to_resumed_crawl() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            html(r#"<a href="/members">members</a>"#.to_string())
                .insert_header("set-cookie", "member=42; Path=/; Max-Age=3600"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .and(headers("cookie", vec!["member=42"]))
        .respond_with(html("<p>welcome</p>".to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let seeds = [format!("{}/", server.uri())];
    let mut config = create_test_config(temp.path());
    config.crawl.concurrency = 1;

    {
        let session = Session::new(config.clone(), &seeds).expect("Failed to create session");
        let handle = session.cancel_handle();
        let mut session = session.with_hook(Arc::new(CancelAfterFirst { handle }));

        let report = session.run().await;
        assert_eq!(report.outcome, CrawlOutcome::Cancelled);
        assert!(temp.path().join("cookies.json").exists());
    }

    let mut session = Session::new(config, &seeds).expect("Failed to create session");
    let report = session.run().await;

    assert!(report.outcome.is_completed());
    assert_eq!(report.stats.fetched, 1);
    assert_eq!(report.stats.errors, 0);
}

#[tokio::test]
async fn test_unwritable_archive_is_fatal() {
    let server = MockServer::start().await;
    let temp = TempDir::new().expect("Failed to create temp dir");

    Mock::given(method("GET"))
        .respond_with(html(r#"<a href="/next">next</a>"#.to_string()))
        .mount(&server)
        .await;

    // A directory squatting on the first segment name makes every open fail
    std::fs::create_dir(temp.path().join("crawl-00000.warc.gz"))
        .expect("Failed to create blocking directory");

    let mut config = create_test_config(temp.path());
    config.crawl.concurrency = 1;

    let mut session =
        Session::new(config, &[format!("{}/", server.uri())]).expect("Failed to create session");
    let report = session.run().await;

    assert!(matches!(report.outcome, CrawlOutcome::FatalError(_)));
    assert_eq!(report.outcome.exit_code(), 1);
    assert_eq!(report.stats.fetched, 1);

    // Neither the unarchived seed nor its link counts as done
    let pending = session.index().pending().expect("Failed to read pending");
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().any(|t| t.url.path() == "/"));
}

#[tokio::test]
async fn test_invalid_seed_is_rejected() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let result = Session::new(create_test_config(temp.path()), &["not a url"]);
    assert!(matches!(result, Err(sitegrab::CrawlError::Config(_))));
}
