use url::Url;

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitegrab::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the authority of a URL: host plus effective port
///
/// This keys per-server state such as the politeness delay and sitemap
/// seeding. Span-hosts scoping compares [`extract_host`] instead, so that
/// `http://example.com` and `https://example.com` stay one site.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitegrab::url::host_key;
///
/// let url = Url::parse("http://Example.com/a").unwrap();
/// assert_eq!(host_key(&url), Some("example.com:80".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = extract_host(url)?;
    let port = url.port_or_known_default()?;
    Some(format!("{}:{}", host, port))
}

/// Returns the directory of a URL's path: everything up to the last `/`
///
/// This is the recursion root of a seed: only same-host links below it are
/// followed recursively.
pub fn directory_of(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => "/".to_string(),
    }
}
