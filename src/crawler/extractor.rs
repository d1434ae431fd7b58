//! Link extraction from fetched content
//!
//! This module turns a response body into outbound links:
//! - HTML: anchors, frames, canonical/alternate links and meta refresh are
//!   linked pages; images, scripts, stylesheets, media and CSS found in
//!   `style` attributes or `<style>` blocks are page requisites
//! - CSS: `url(...)` and `@import` targets are page requisites
//! - XML sitemaps and sitemap indexes: every `<loc>` is a linked page
//!
//! Markup is parsed leniently; broken input yields fewer links, never an error.

use crate::crawler::FetchedResponse;
use crate::url::{normalize_parsed, LinkKind};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// A link found in a fetched resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    /// Absolute, normalized URL
    pub url: Url,
    pub kind: LinkKind,
}

/// Kind of content a response carries, as far as extraction is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Sitemap,
    Other,
}

impl ContentKind {
    /// Detects the content kind from the media type, falling back to the URL
    /// extension and the first bytes of the body
    pub fn detect(media_type: Option<&str>, url: &Url, body: &[u8]) -> Self {
        match media_type {
            Some("text/html") | Some("application/xhtml+xml") => return Self::Html,
            Some("text/css") => return Self::Css,
            Some("text/xml") | Some("application/xml") => {
                return if looks_like_sitemap(body) {
                    Self::Sitemap
                } else {
                    Self::Other
                };
            }
            Some(_) => return Self::Other,
            None => {}
        }

        let path = url.path().to_ascii_lowercase();
        if path.ends_with(".css") {
            Self::Css
        } else if looks_like_sitemap(body) {
            Self::Sitemap
        } else if looks_like_html(body) {
            Self::Html
        } else {
            Self::Other
        }
    }
}

fn head_text(body: &[u8]) -> String {
    let len = body.len().min(1024);
    String::from_utf8_lossy(&body[..len]).to_ascii_lowercase()
}

fn looks_like_sitemap(body: &[u8]) -> bool {
    let head = head_text(body);
    head.contains("<urlset") || head.contains("<sitemapindex")
}

fn looks_like_html(body: &[u8]) -> bool {
    let head = head_text(body);
    let trimmed = head.trim_start();
    trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html") || head.contains("<body")
}

/// Link extractor configured for a session
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    strip_session_id: bool,
}

impl Extractor {
    pub fn new(strip_session_id: bool) -> Self {
        Self { strip_session_id }
    }

    /// Normalizes a URL found outside a body, such as a Location header
    pub fn normalize(&self, url: Url) -> Option<Url> {
        normalize_parsed(url, self.strip_session_id).ok()
    }

    /// Extracts the links of a response fetched from `url`
    ///
    /// Links are resolved and normalized lazily as the returned iterator is
    /// consumed; each distinct URL is yielded once per resource.
    pub fn extract(&self, url: &Url, response: &FetchedResponse) -> Links {
        let media_type = response.media_type();
        let kind = ContentKind::detect(media_type.as_deref(), url, &response.body);
        self.extract_body(url, kind, &response.body)
    }

    /// Extracts links from a body of known kind
    pub fn extract_body(&self, url: &Url, kind: ContentKind, body: &[u8]) -> Links {
        let text = String::from_utf8_lossy(body);
        let (base, raw) = match kind {
            ContentKind::Html => scan_html(&text, url),
            ContentKind::Css => (url.clone(), scan_css(&text)),
            ContentKind::Sitemap => (url.clone(), scan_sitemap(&text)),
            ContentKind::Other => (url.clone(), Vec::new()),
        };

        Links {
            base,
            raw: raw.into_iter(),
            strip_session_id: self.strip_session_id,
            seen: HashSet::new(),
        }
    }
}

/// Lazy sequence of discovered links
pub struct Links {
    base: Url,
    raw: std::vec::IntoIter<(String, LinkKind)>,
    strip_session_id: bool,
    seen: HashSet<Url>,
}

impl Iterator for Links {
    type Item = DiscoveredLink;

    fn next(&mut self) -> Option<Self::Item> {
        for (href, kind) in self.raw.by_ref() {
            let Some(url) = resolve_link(&href, &self.base) else {
                continue;
            };
            let Ok(url) = normalize_parsed(url, self.strip_session_id) else {
                continue;
            };
            if self.seen.insert(url.clone()) {
                return Some(DiscoveredLink { url, kind });
            }
        }
        None
    }
}

/// Resolves an href against the base URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: and data: references
/// - fragment-only links (same document)
/// - anything that does not resolve to HTTP(S)
fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

/// `rel` values of `<link>` elements that point at linked pages
const PAGE_RELS: &[&str] = &["canonical", "alternate", "next", "prev"];

/// `rel` values of `<link>` elements that point at page requisites
const REQUISITE_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "apple-touch-icon",
    "apple-touch-icon-precomposed",
    "preload",
    "prefetch",
    "manifest",
    "mask-icon",
];

/// (selector, attribute, kind) for plain attribute links
const ATTRIBUTE_LINKS: &[(&str, &str, LinkKind)] = &[
    ("a[href]", "href", LinkKind::Page),
    ("area[href]", "href", LinkKind::Page),
    ("frame[src]", "src", LinkKind::Page),
    ("iframe[src]", "src", LinkKind::Page),
    ("img[src]", "src", LinkKind::Requisite),
    ("script[src]", "src", LinkKind::Requisite),
    ("source[src]", "src", LinkKind::Requisite),
    ("video[src]", "src", LinkKind::Requisite),
    ("video[poster]", "poster", LinkKind::Requisite),
    ("audio[src]", "src", LinkKind::Requisite),
    ("embed[src]", "src", LinkKind::Requisite),
    ("track[src]", "src", LinkKind::Requisite),
    ("input[type='image'][src]", "src", LinkKind::Requisite),
    ("object[data]", "data", LinkKind::Requisite),
    ("[background]", "background", LinkKind::Requisite),
];

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collects raw links from an HTML document, returning the resolution base
fn scan_html(html: &str, page_url: &Url) -> (Url, Vec<(String, LinkKind)>) {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    let base = selector("base[href]")
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone());

    for (css, attr, kind) in ATTRIBUTE_LINKS {
        let Some(sel) = selector(css) else { continue };
        for element in document.select(&sel) {
            if let Some(value) = element.value().attr(attr) {
                links.push((value.to_string(), *kind));
            }
        }
    }

    if let Some(sel) = selector("img[srcset], source[srcset]") {
        for element in document.select(&sel) {
            if let Some(srcset) = element.value().attr("srcset") {
                links.extend(parse_srcset(srcset).map(|u| (u, LinkKind::Requisite)));
            }
        }
    }

    if let Some(sel) = selector("link[href]") {
        for element in document.select(&sel) {
            if let Some(link) = classify_link_element(&element) {
                links.push(link);
            }
        }
    }

    if let Some(sel) = selector("meta[http-equiv][content]") {
        for element in document.select(&sel) {
            let is_refresh = element
                .value()
                .attr("http-equiv")
                .map(|v| v.eq_ignore_ascii_case("refresh"))
                .unwrap_or(false);
            if !is_refresh {
                continue;
            }
            if let Some(target) = element.value().attr("content").and_then(meta_refresh_url) {
                links.push((target, LinkKind::Page));
            }
        }
    }

    if let Some(sel) = selector("[style]") {
        for element in document.select(&sel) {
            if let Some(style) = element.value().attr("style") {
                links.extend(scan_css(style));
            }
        }
    }

    if let Some(sel) = selector("style") {
        for element in document.select(&sel) {
            let css: String = element.text().collect();
            links.extend(scan_css(&css));
        }
    }

    (base, links)
}

fn classify_link_element(element: &ElementRef<'_>) -> Option<(String, LinkKind)> {
    let href = element.value().attr("href")?;
    let rel = element.value().attr("rel")?.to_ascii_lowercase();
    let rels: Vec<&str> = rel.split_whitespace().collect();

    // "shortcut icon" and friends
    if rels.iter().any(|r| REQUISITE_RELS.contains(r)) {
        return Some((href.to_string(), LinkKind::Requisite));
    }
    if rels.iter().any(|r| PAGE_RELS.contains(r)) {
        return Some((href.to_string(), LinkKind::Page));
    }
    None
}

/// URLs of a `srcset` attribute, without their width or density descriptors
fn parse_srcset(srcset: &str) -> impl Iterator<Item = String> + '_ {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .map(str::to_string)
}

/// Target of a `<meta http-equiv="refresh" content="5; url=...">`
fn meta_refresh_url(content: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r#"(?i)^\s*\d*\s*[;,]?\s*url\s*=\s*['"]?([^'"]+)['"]?"#).ok())
        .as_ref()?;
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collects `url(...)` and `@import` targets from a stylesheet
fn scan_css(css: &str) -> Vec<(String, LinkKind)> {
    static URL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    static IMPORT_RE: OnceLock<Option<Regex>> = OnceLock::new();

    let mut links = Vec::new();

    if let Some(re) = URL_RE
        .get_or_init(|| Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).ok())
        .as_ref()
    {
        for caps in re.captures_iter(css) {
            if let Some(m) = caps.get(1) {
                links.push((m.as_str().to_string(), LinkKind::Requisite));
            }
        }
    }

    if let Some(re) = IMPORT_RE
        .get_or_init(|| Regex::new(r#"@import\s+['"]([^'"]+)['"]"#).ok())
        .as_ref()
    {
        for caps in re.captures_iter(css) {
            if let Some(m) = caps.get(1) {
                links.push((m.as_str().to_string(), LinkKind::Requisite));
            }
        }
    }

    links
}

/// Collects `<loc>` entries of a sitemap or sitemap index
fn scan_sitemap(xml: &str) -> Vec<(String, LinkKind)> {
    static LOC_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = LOC_RE
        .get_or_init(|| Regex::new(r"(?is)<loc>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</loc>").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    re.captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .map(|m| (unescape_xml(m.as_str().trim()), LinkKind::Page))
        .collect()
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    fn html_links(html: &str) -> Vec<(String, LinkKind)> {
        Extractor::new(true)
            .extract_body(&base_url(), ContentKind::Html, html.as_bytes())
            .map(|l| (l.url.to_string(), l.kind))
            .collect()
    }

    fn urls(html: &str) -> Vec<String> {
        html_links(html).into_iter().map(|(u, _)| u).collect()
    }

    #[test]
    fn test_extract_absolute_link() {
        let links = html_links(r#"<html><body><a href="https://other.com/page">Link</a></body></html>"#);
        assert_eq!(links, vec![("https://other.com/page".to_string(), LinkKind::Page)]);
    }

    #[test]
    fn test_extract_relative_links() {
        let links = urls(r#"<a href="/other">x</a><a href="sibling">y</a><a href="../up">z</a>"#);
        assert_eq!(
            links,
            vec![
                "https://example.com/other",
                "https://example.com/dir/sibling",
                "https://example.com/up"
            ]
        );
    }

    #[test]
    fn test_skip_special_schemes() {
        let html = r##"
            <a href="javascript:void(0)">a</a>
            <a href="mailto:test@example.com">b</a>
            <a href="tel:+1234567890">c</a>
            <a href="data:text/html,<h1>Test</h1>">d</a>
            <a href="ftp://example.com/file">e</a>
            <a href="#section">f</a>
        "##;
        assert!(urls(html).is_empty());
    }

    #[test]
    fn test_follow_nofollow_and_download_links() {
        let links = urls(r#"<a href="/page" rel="nofollow">x</a><a href="/file.pdf" download>y</a>"#);
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_requisites_are_classified() {
        let html = r#"
            <html><head>
              <link rel="stylesheet" href="/s.css">
              <link rel="shortcut icon" href="/favicon.ico">
              <link rel="canonical" href="/canonical">
              <script src="/app.js"></script>
            </head><body>
              <img src="http://other.com/img.png">
              <object data="/movie.swf"></object>
              <a href="/page">page</a>
            </body></html>
        "#;
        let links = html_links(html);
        let kind_of = |u: &str| links.iter().find(|(l, _)| l == u).map(|(_, k)| *k);

        assert_eq!(kind_of("https://example.com/s.css"), Some(LinkKind::Requisite));
        assert_eq!(kind_of("https://example.com/favicon.ico"), Some(LinkKind::Requisite));
        assert_eq!(kind_of("https://example.com/app.js"), Some(LinkKind::Requisite));
        assert_eq!(kind_of("http://other.com/img.png"), Some(LinkKind::Requisite));
        assert_eq!(kind_of("https://example.com/movie.swf"), Some(LinkKind::Requisite));
        assert_eq!(kind_of("https://example.com/canonical"), Some(LinkKind::Page));
        assert_eq!(kind_of("https://example.com/page"), Some(LinkKind::Page));
    }

    #[test]
    fn test_srcset_candidates() {
        let links = urls(r#"<img srcset="/a.png 1x, /b.png 2x">"#);
        assert_eq!(
            links,
            vec!["https://example.com/a.png", "https://example.com/b.png"]
        );
    }

    #[test]
    fn test_base_href_changes_resolution() {
        let links = urls(r#"<head><base href="https://cdn.example.com/root/"></head><a href="x">x</a>"#);
        assert_eq!(links, vec!["https://cdn.example.com/root/x"]);
    }

    #[test]
    fn test_meta_refresh() {
        let links = html_links(r#"<meta http-equiv="Refresh" content="0; URL='/moved'">"#);
        assert_eq!(links, vec![("https://example.com/moved".to_string(), LinkKind::Page)]);
    }

    #[test]
    fn test_inline_css() {
        let html = r#"
            <style>@import "print.css"; body { background: url('/bg.png') }</style>
            <div style="background-image: url(/tile.gif)"></div>
        "#;
        let links = urls(html);
        assert!(links.contains(&"https://example.com/dir/print.css".to_string()));
        assert!(links.contains(&"https://example.com/bg.png".to_string()));
        assert!(links.contains(&"https://example.com/tile.gif".to_string()));
    }

    #[test]
    fn test_duplicates_yielded_once() {
        let links = urls(r##"<a href="/p">1</a><a href="/p#top">2</a><a href="/p">3</a>"##);
        assert_eq!(links, vec!["https://example.com/p"]);
    }

    #[test]
    fn test_session_id_stripped() {
        let links = urls(r#"<a href="/p?PHPSESSID=abc&x=1">x</a>"#);
        assert_eq!(links, vec!["https://example.com/p?x=1"]);
    }

    #[test]
    fn test_malformed_markup_degrades() {
        let links = urls(r#"<html><body><a href="/ok">ok<div><a href=/also>also</p></span"#);
        assert!(links.contains(&"https://example.com/ok".to_string()));
    }

    #[test]
    fn test_css_response() {
        let css = br#"@import url("fonts.css"); .x { background: url(../img/x.png) }"#;
        let url = Url::parse("https://example.com/css/site.css").unwrap();
        let links: Vec<_> = Extractor::new(true)
            .extract_body(&url, ContentKind::Css, css)
            .collect();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.kind == LinkKind::Requisite));
        assert_eq!(links[1].url.as_str(), "https://example.com/img/x.png");
    }

    #[test]
    fn test_sitemap_locs() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/a?x=1&amp;y=2</loc></url>
              <url><loc> https://example.com/b </loc></url>
            </urlset>"#;
        let url = Url::parse("https://example.com/sitemap.xml").unwrap();
        assert_eq!(ContentKind::detect(Some("application/xml"), &url, xml), ContentKind::Sitemap);

        let links: Vec<String> = Extractor::new(true)
            .extract_body(&url, ContentKind::Sitemap, xml)
            .map(|l| l.url.to_string())
            .collect();
        assert_eq!(links, vec!["https://example.com/a?x=1&y=2", "https://example.com/b"]);
    }

    #[test]
    fn test_detect_without_media_type() {
        let url = Url::parse("https://example.com/x").unwrap();
        assert_eq!(
            ContentKind::detect(None, &url, b"<!DOCTYPE html><html></html>"),
            ContentKind::Html
        );
        assert_eq!(ContentKind::detect(None, &url, b"\x89PNG"), ContentKind::Other);
        assert_eq!(ContentKind::detect(Some("image/png"), &url, b"<html>"), ContentKind::Other);
    }
}
