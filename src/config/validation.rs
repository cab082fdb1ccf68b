use crate::config::types::{CacheConfig, Config, CrawlerConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Longest queuing delay accepted for a permit (10 minutes)
const MAX_DELAY_CEILING_MS: u64 = 600_000;

/// Hard ceiling for `max-pages`
const PAGE_CEILING: u32 = 999;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_cache_config(&config.cache)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.requests_per_second < 1 || config.requests_per_second > 100 {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be between 1 and 100, got {}",
            config.requests_per_second
        )));
    }

    if !(1.0..=10.0).contains(&config.concurrency_multiplier) {
        return Err(ConfigError::Validation(format!(
            "concurrency_multiplier must be between 1.0 and 10.0, got {}",
            config.concurrency_multiplier
        )));
    }

    if config.max_delay_ms > MAX_DELAY_CEILING_MS {
        return Err(ConfigError::Validation(format!(
            "max_delay_ms must be <= {}ms, got {}ms",
            MAX_DELAY_CEILING_MS, config.max_delay_ms
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1".to_string(),
        ));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(
            "page_size must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 || config.max_pages > PAGE_CEILING {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between 1 and {}, got {}",
            PAGE_CEILING, config.max_pages
        )));
    }

    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    // Listings shift as new entries are published; a day is already generous.
    if config.page_ttl_secs > 24 * 60 * 60 {
        return Err(ConfigError::Validation(format!(
            "page_ttl_secs must be <= 86400, got {}",
            config.page_ttl_secs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}
