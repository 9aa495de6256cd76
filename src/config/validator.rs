//! Configuration validator
//!
//! This module provides functionality for validating configuration.


use crate::config::error::{ConfigError, Result};
use crate::config::types::ProxyConfig;
use crate::protocol::KeyTransformKind;

/// Raw keys shorter than this are accepted with a warning
const MIN_RAW_KEY_LEN: usize = 8;

/// Validate the configuration
pub fn validate_config(config: &ProxyConfig) -> Result<()> {
    // Validate network settings
    validate_network_settings(config)?;

    // Validate handshake settings
    validate_handshake_settings(config)?;

    // Validate general settings
    validate_general_settings(config)?;

    Ok(())
}

/// Validate network settings
fn validate_network_settings(config: &ProxyConfig) -> Result<()> {
    if config.listen_port() == 0 {
        return Err(ConfigError::InvalidValue(
            "listen_port".to_string(),
            "Listen port must be between 1 and 65535".to_string(),
        ));
    }

    let fake = config.fake_address()?;
    if fake.port() == 0 {
        return Err(ConfigError::InvalidValue(
            "fake".to_string(),
            format!("Decoy endpoint needs a non-zero port: {}", fake),
        ));
    }

    Ok(())
}

/// Validate handshake settings
fn validate_handshake_settings(config: &ProxyConfig) -> Result<()> {
    match config.key() {
        None => Err(ConfigError::MissingRequiredValue("key".to_string())),
        Some("") => Err(ConfigError::InvalidValue(
            "key".to_string(),
            "Shared secret must not be empty".to_string(),
        )),
        Some(_) => Ok(()),
    }
}

/// Validate general settings
fn validate_general_settings(config: &ProxyConfig) -> Result<()> {
    if config.connection_timeout().is_zero() {
        return Err(ConfigError::InvalidValue(
            "connection_timeout".to_string(),
            "Connection timeout must be greater than 0".to_string(),
        ));
    }

    if config.send_timeout().is_zero() {
        return Err(ConfigError::InvalidValue(
            "send_timeout".to_string(),
            "Send timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Configuration validator trait
pub trait ConfigValidator {
    /// Check configuration for warnings
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for ProxyConfig {
    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.log_level() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => {
                warnings.push(format!("Invalid log level '{}', using default 'info'", level));
            }
        }

        if let Some(key) = self.key() {
            if self.key_transform() == KeyTransformKind::Raw && key.len() < MIN_RAW_KEY_LEN {
                warnings.push(format!(
                    "Raw key is only {} bytes; short keys collide with ordinary traffic more easily",
                    key.len()
                ));
            }
        }

        if self.source("fake") == "default" {
            warnings.push(format!("No decoy endpoint configured, unrecognised traffic goes to {}", self.fake()));
        }

        warnings
    }
}
