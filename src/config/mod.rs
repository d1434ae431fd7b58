//! Configuration module for Sitegrab
//!
//! This module handles loading, parsing, and validating the crawl policy.
//!
//! # Example
//!
//! ```no_run
//! use sitegrab::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("grab.toml")).unwrap();
//! println!("Recursing to level {}", config.crawl.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CrawlConfig, HttpConfig, IgnoreConfig, IgnoreSetEntry, MaxDepth, OutputConfig, PolicyConfig,
    SpanHosts, DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, effective_config_hash, load_config, load_config_with_hash, parse_config,
    save_config,
};
pub use validation::{parse_header_line, validate};

/// Builds the working directory name for a crawl of `start_url`
///
/// The scheme is dropped, trailing slashes are removed, and `/`, `?` and `&`
/// become `-`; the date and the first eight characters of the run id follow.
///
/// ```
/// use sitegrab::config::working_dir_name;
///
/// let name = working_dir_name("https://example.com/a/b/?x=1", "2024-05-01", "0123456789abcdef");
/// assert_eq!(name, "example.com-a-b--x=1-2024-05-01-01234567");
/// ```
pub fn working_dir_name(start_url: &str, ymd: &str, id: &str) -> String {
    let without_scheme = start_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(start_url);
    let trimmed = without_scheme.trim_end_matches('/');
    let sanitized: String = trimmed
        .chars()
        .map(|c| if matches!(c, '/' | '?' | '&') { '-' } else { c })
        .collect();
    let short_id: String = id.chars().take(8).collect();
    format!("{}-{}-{}", sanitized, ymd, short_id)
}
