use crate::config::types::{CrawlConfig, HttpConfig, OutputConfig, PolicyConfig};
use crate::url::IgnoreSets;
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &PolicyConfig) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_http_config(&config.http)?;
    validate_output_config(&config.output)?;
    // Compiling the sets checks set names and every pattern
    IgnoreSets::from_config(config)?;
    Ok(())
}

/// Validates crawl policy
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    Ok(())
}

/// Validates HTTP client settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    for header in &config.headers {
        parse_header_line(header)?;
    }

    if config.timeout == 0 {
        return Err(ConfigError::Validation(
            "timeout must be at least 1ms".to_string(),
        ));
    }

    if config.retry_count < 1 {
        return Err(ConfigError::Validation(format!(
            "tries must be >= 1, got {}",
            config.retry_count
        )));
    }

    Ok(())
}

/// Validates output locations
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.warc_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "warc-prefix cannot be empty".to_string(),
        ));
    }

    if config.warc_prefix.contains(['/', '\\']) {
        return Err(ConfigError::Validation(format!(
            "warc-prefix must be a file name, got '{}'",
            config.warc_prefix
        )));
    }

    if config.warc_max_size == 0 {
        return Err(ConfigError::Validation(
            "warc-max-size must be greater than zero".to_string(),
        ));
    }

    if config.log_file.is_empty() || config.database.is_empty() {
        return Err(ConfigError::Validation(
            "log-file and database cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Splits a "Name: value" header line
pub fn parse_header_line(line: &str) -> Result<(&str, &str), ConfigError> {
    let (name, value) = line.split_once(':').ok_or_else(|| {
        ConfigError::Validation(format!("header '{}' must look like 'Name: value'", line))
    })?;

    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ConfigError::Validation(format!(
            "invalid header name in '{}'",
            line
        )));
    }

    Ok((name, value.trim()))
}
