use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration from TOML text
///
/// Missing tables and keys fall back to their defaults.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Loads a configuration file
///
/// # Returns
///
/// * `Ok(Config)` - The validated configuration
/// * `Err(ConfigError::Io)` - The file could not be read
/// * `Err(ConfigError::Parse)` - The file is not valid TOML for [`Config`]
/// * `Err(ConfigError::Validation)` - A value is out of range
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// SHA-256 of a configuration file, hex encoded
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_content(&std::fs::read(path)?))
}

/// Loads a configuration file along with the hash of the bytes it was parsed from
///
/// The hash is logged at startup so runs can be matched to their settings.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let hash = hash_content(content.as_bytes());
    Ok((parse_config(&content)?, hash))
}

fn hash_content(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
