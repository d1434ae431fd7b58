//! Ignore sets: named lists of URL patterns that are never fetched
//!
//! Every pattern is a regular expression matched unanchored against the full
//! normalized URL. Sets are combined by union; a URL matching any pattern of
//! any active set is ignored, so the order in which sets are listed never
//! changes the outcome.

use crate::config::PolicyConfig;
use crate::ConfigError;
use regex::RegexSet;
use url::Url;

/// Name of the set that is always active
pub const GLOBAL_SET: &str = "global";

/// Name given to the ad-hoc `[ignores] patterns` list
pub const CUSTOM_SET: &str = "custom";

/// Patterns of the always-on set: well known crawler traps
pub const GLOBAL_PATTERNS: &[&str] = &[
    r"^https?://[^/]+/.*[?&]replytocom=\d+",
    r"^https?://[^/]+/.*[?&]share=(email|facebook|twitter|linkedin|pinterest|reddit|tumblr)",
    r"^https?://[^/]+/.*/wp-login\.php\?action=",
    r"^https?://[^/]+/.*[?&]do=(login|register|edit|revisions|diff)",
    r"^https?://[^/]+/.*/(cdn-cgi/l/email-protection)",
];

/// Compiled, active ignore sets
#[derive(Debug, Clone)]
pub struct IgnoreSets {
    sets: Vec<(String, RegexSet)>,
}

impl IgnoreSets {
    /// Builds the active sets from the configuration
    ///
    /// The global set is always included. Every name in `[ignores] sets` must
    /// be either "global" or a key of `[ignore-sets]`.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, ConfigError> {
        let mut ignore_sets = Self::global()?;

        for name in &config.ignores.sets {
            if name == GLOBAL_SET || ignore_sets.contains(name) {
                continue;
            }
            let entry = config.ignore_sets.get(name).ok_or_else(|| {
                ConfigError::Validation(format!("unknown ignore set '{}'", name))
            })?;
            ignore_sets.add_set(name, &entry.patterns)?;
        }

        if !config.ignores.patterns.is_empty() {
            ignore_sets.add_set(CUSTOM_SET, &config.ignores.patterns)?;
        }

        Ok(ignore_sets)
    }

    /// Only the global set
    pub fn global() -> Result<Self, ConfigError> {
        let mut ignore_sets = Self { sets: Vec::new() };
        ignore_sets.add_set(GLOBAL_SET, GLOBAL_PATTERNS)?;
        Ok(ignore_sets)
    }

    /// No patterns at all
    pub fn empty() -> Self {
        Self { sets: Vec::new() }
    }

    /// Compiles and activates a named set
    pub fn add_set<S: AsRef<str>>(&mut self, name: &str, patterns: &[S]) -> Result<(), ConfigError> {
        let compiled = RegexSet::new(patterns.iter().map(|p| p.as_ref())).map_err(|e| {
            ConfigError::InvalidPattern(format!("ignore set '{}': {}", name, e))
        })?;
        self.sets.push((name.to_string(), compiled));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sets.iter().any(|(n, _)| n == name)
    }

    /// Returns the name of the first active set matching `url`
    pub fn matching_set(&self, url: &Url) -> Option<&str> {
        self.sets
            .iter()
            .find(|(_, set)| set.is_match(url.as_str()))
            .map(|(name, _)| name.as_str())
    }

    pub fn is_ignored(&self, url: &Url) -> bool {
        self.matching_set(url).is_some()
    }

    pub fn set_names(&self) -> Vec<&str> {
        self.sets.iter().map(|(n, _)| n.as_str()).collect()
    }
}
