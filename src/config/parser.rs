use crate::config::types::PolicyConfig;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(PolicyConfig)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sitegrab::config::load_config;
///
/// let config = load_config(Path::new("grab.toml")).unwrap();
/// println!("Concurrency: {}", config.crawl.concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<PolicyConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<PolicyConfig, ConfigError> {
    let config: PolicyConfig = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is used to detect if the configuration has changed between crawl runs.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_text(&content))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((PolicyConfig, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(PolicyConfig, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Writes the effective policy as TOML
///
/// The file reads back with [`load_config`], so a resumed crawl runs under
/// the policy it was started with.
///
/// # Arguments
///
/// * `config` - The policy to save
/// * `path` - Destination file, replaced if it exists
///
/// # Returns
///
/// * `Ok(())` - Policy written
/// * `Err(ConfigError)` - Failed to serialize or write the policy
pub fn save_config(config: &PolicyConfig, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Computes a hash of the effective configuration
///
/// Used for the run record when the configuration was assembled from defaults
/// and command-line overrides rather than read from a single file. Output
/// locations are not part of the hash.
pub fn effective_config_hash(config: &PolicyConfig) -> String {
    hash_text(&format!(
        "{:?}{:?}{:?}{:?}",
        config.crawl, config.http, config.ignores, config.ignore_sets
    ))
}

fn hash_text(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IgnoreSetEntry, MaxDepth, SpanHosts};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawl]
concurrency = 8
recursive = true
level = 3
page-requisites-level = 2
span-hosts = "page-requisites,linked-pages"

[http]
user-agent = "TestGrabber/1.0"
timeout = 5000
tries = 4

[output]
directory = "./grab"
warc-prefix = "example"
warc-max-size = 1048576

[ignores]
sets = ["forums"]
patterns = ["\\.iso$"]

[ignore-sets.forums]
patterns = ["/memberlist\\.php"]
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawl.concurrency, 8);
        assert_eq!(config.crawl.max_depth, MaxDepth::Limited(3));
        assert_eq!(config.crawl.page_requisite_depth, 2);
        assert_eq!(
            config.crawl.span_hosts_mode,
            SpanHosts::PageRequisitesAndLinkedPages
        );
        assert_eq!(config.http.user_agent, "TestGrabber/1.0");
        assert_eq!(config.http.retry_count, 4);
        assert_eq!(config.output.warc_prefix, "example");
        assert_eq!(config.ignore_sets["forums"].patterns.len(), 1);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.crawl.concurrency, 2);
        assert_eq!(config.crawl.max_depth, MaxDepth::Infinite);
        assert!(config.output.warc_gzip);
    }

    #[test]
    fn test_level_accepts_inf_string() {
        let config = parse_config("[crawl]\nlevel = \"inf\"\n").unwrap();
        assert_eq!(config.crawl.max_depth, MaxDepth::Infinite);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/grab.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_bad_span_hosts_is_parse_error() {
        let result = parse_config("[crawl]\nspan-hosts = \"everywhere\"\n");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let result = parse_config("[crawl]\nconcurrency = 0\n");
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_effective_hash_tracks_changes() {
        let a = PolicyConfig::default();
        let mut b = PolicyConfig::default();
        b.crawl.concurrency = 9;

        assert_eq!(effective_config_hash(&a), effective_config_hash(&a.clone()));
        assert_ne!(effective_config_hash(&a), effective_config_hash(&b));
    }

    #[test]
    fn test_effective_hash_ignores_output_directory() {
        let a = PolicyConfig::default();
        let mut b = PolicyConfig::default();
        b.output.directory = "./elsewhere".into();

        assert_eq!(effective_config_hash(&a), effective_config_hash(&b));
    }

    #[test]
    fn test_saved_policy_loads_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");

        let mut config = PolicyConfig::default();
        config.crawl.max_depth = MaxDepth::Limited(2);
        config.crawl.span_hosts_mode = SpanHosts::None;
        config.crawl.recursive = false;
        config.http.retry_count = 5;
        config.ignores.sets = vec!["forums".to_string()];
        config.ignore_sets.insert(
            "forums".to_string(),
            IgnoreSetEntry {
                patterns: vec!["/memberlist\\.php".to_string()],
            },
        );
        config.output.directory = dir.path().to_path_buf();

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded.crawl.max_depth, MaxDepth::Limited(2));
        assert_eq!(loaded.crawl.span_hosts_mode, SpanHosts::None);
        assert!(!loaded.crawl.recursive);
        assert_eq!(loaded.http.retry_count, 5);
        assert_eq!(loaded.ignores.sets, vec!["forums"]);
        assert_eq!(loaded.ignore_sets["forums"].patterns, vec!["/memberlist\\.php"]);
        assert_eq!(loaded.output.directory, dir.path());
        assert_eq!(effective_config_hash(&loaded), effective_config_hash(&config));
    }

    #[test]
    fn test_saved_infinite_level_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");

        save_config(&PolicyConfig::default(), &path).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded.crawl.max_depth, MaxDepth::Infinite);
        assert_eq!(loaded.crawl.span_hosts_mode, SpanHosts::PageRequisitesOnly);
    }
}
