//! Cookie jar shared by every worker of a session
//!
//! Persistent cookies are saved to the working directory when a session
//! finishes and loaded again on resume. Session cookies live only as long as
//! the process.

use reqwest::header::HeaderValue;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

/// Cookies set by crawled servers, keyed by domain and path
#[derive(Debug, Default)]
pub struct CookieJar {
    store: RwLock<cookie_store::CookieStore>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a jar saved by [`CookieJar::save`]; a missing file gives an empty jar
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let store = cookie_store::CookieStore::load_json(reader)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tracing::debug!("Loaded cookies from {}", path.display());
        Ok(Self {
            store: RwLock::new(store),
        })
    }

    /// Writes the persistent, unexpired cookies as JSON
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.read()
            .save_json(&mut writer)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writer.flush()?;
        Ok(())
    }

    /// Value of the `Cookie` header sent to `url`, if any cookie matches
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .read()
            .get_request_values(url)
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, cookie_store::CookieStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, cookie_store::CookieStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let cookies = cookie_headers
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| cookie_store::RawCookie::parse(value.to_owned()).ok());
        self.write().store_response_cookies(cookies, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.header_for(url)
            .and_then(|value| HeaderValue::from_str(&value).ok())
    }
}
