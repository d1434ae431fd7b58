use crate::UrlError;
use url::Url;

/// Query parameter names that carry server-side session identifiers
const SESSION_PARAMS: &[&str] = &["jsessionid", "phpsessid", "sessionid", "zenid", "cfid", "cftoken"];

/// Prefix of the classic ASP session cookie parameter (`ASPSESSIONIDxxxxxxxx`)
const ASP_SESSION_PREFIX: &str = "aspsessionid";

/// Normalizes a URL with session-id stripping enabled
///
/// See [`normalize_with`] for the individual steps.
///
/// # Examples
///
/// ```
/// use sitegrab::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/a/./b/../c?PHPSESSID=abc&x=1#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/c?x=1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    normalize_with(url_str, true)
}

/// Normalizes a URL before it is fingerprinted or fetched
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Lowercase the host and drop the default port (done by the parser for
///    these schemes, verified here)
/// 4. Remove dot segments (done by the parser)
/// 5. Rewrite a `#!state` fragment into `?_escaped_fragment_=state`
/// 6. Remove the fragment
/// 7. Optionally strip session identifiers from the query and `;jsessionid=`
///    path parameters
/// 8. Remove an empty query string (trailing `?`)
///
/// The path keeps its trailing slash and query parameters keep their order:
/// both are significant to the server being archived.
pub fn normalize_with(url_str: &str, strip_session_id: bool) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url, strip_session_id)
}

/// Normalizes an already parsed URL
pub fn normalize_parsed(mut url: Url, strip_session_id: bool) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {
            if host.chars().any(|c| c.is_ascii_uppercase()) {
                let lowered = host.to_ascii_lowercase();
                url.set_host(Some(&lowered))
                    .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
            }
        }
        _ => return Err(UrlError::MissingHost),
    }

    if let Some(state) = url.fragment().and_then(|f| f.strip_prefix('!')) {
        let state = state.to_string();
        url.query_pairs_mut()
            .append_pair("_escaped_fragment_", &state);
    }
    url.set_fragment(None);

    if strip_session_id {
        strip_session_path_param(&mut url);
        strip_session_query(&mut url);
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

/// Removes `;jsessionid=...` style parameters from the last path segment
fn strip_session_path_param(url: &mut Url) {
    let path = url.path();
    let lower = path.to_ascii_lowercase();
    if let Some(start) = lower.find(";jsessionid=") {
        let end = path[start + 1..]
            .find(['/', ';'])
            .map(|i| start + 1 + i)
            .unwrap_or(path.len());
        let stripped = format!("{}{}", &path[..start], &path[end..]);
        url.set_path(&stripped);
    }
}

/// Removes session parameters from the query, keeping the raw encoding of the rest
fn strip_session_query(url: &mut Url) {
    let Some(query) = url.query() else {
        return;
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_session_pair(pair))
        .collect();

    if kept.len() != query.split('&').count() {
        let rebuilt = kept.join("&");
        url.set_query(if rebuilt.is_empty() { None } else { Some(&rebuilt) });
    }
}

fn is_session_pair(pair: &str) -> bool {
    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
    let key = key.to_ascii_lowercase();

    if SESSION_PARAMS.contains(&key.as_str()) || key.starts_with(ASP_SESSION_PREFIX) {
        return true;
    }

    // "sid" is common enough to only strip when it carries a 32-digit hex token
    key == "sid" && value.len() == 32 && value.chars().all(|c| c.is_ascii_hexdigit())
}
