//! Configuration sources
//!
//! This module defines traits and implementations for loading configuration
//! from different sources.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::cli::CliArgs;
use crate::config::error::{ConfigError, Result};
use crate::config::types::{ConfigValues, ProxyConfig, ValueSource};

/// Configuration source trait
pub trait ConfigSource {
    /// Load configuration from this source
    fn load(&self) -> Result<ProxyConfig>;

    /// Get the source type
    fn source_type(&self) -> ValueSource;
}

/// Record every field that is present in `config.values` as coming from `source`
fn track_sources(config: &mut ProxyConfig, source: ValueSource) {
    let values = &config.values;
    let present = [
        ("listen_port", values.listen_port.is_some()),
        ("fake", values.fake.is_some()),
        ("key", values.key.is_some()),
        ("key_transform", values.key_transform.is_some()),
        ("log_level", values.log_level.is_some()),
        ("buffer_size", values.buffer_size.is_some()),
        ("connection_timeout", values.connection_timeout.is_some()),
        ("send_timeout", values.send_timeout.is_some()),
    ];

    for (name, has_value) in present {
        if has_value {
            config.sources.insert(name.to_string(), source);
        }
    }
}

/// Default configuration source
pub struct DefaultSource;

impl ConfigSource for DefaultSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading default configuration");
        Ok(ProxyConfig::default())
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Default
    }
}

/// File configuration source
///
/// A missing file is not an error; it contributes no values.
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    /// Create a new file source
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from file: {}", self.path.display());

        if !self.path.exists() {
            warn!("Configuration file not found: {}", self.path.display());
            warn!("Will use default values unless overridden by environment variables or command line arguments");
            return Ok(ProxyConfig::from_values(ConfigValues::default()));
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            warn!("Failed to read configuration file {}: {}", self.path.display(), e);
            ConfigError::FileReadError(self.path.clone(), e.to_string())
        })?;

        debug!("Parsing JSON from file: {}", self.path.display());

        let values = serde_json::from_str::<ConfigValues>(&contents).map_err(|e| {
            let err_msg = format!("Error parsing {}: {}", self.path.display(), e);
            warn!("{}", err_msg);
            ConfigError::ParseError(err_msg)
        })?;

        let mut config = ProxyConfig::from_values(values);
        config.config_file = Some(self.path.clone());
        track_sources(&mut config, self.source_type());

        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::File
    }
}

/// Environment variable configuration source
///
/// Reads `<PREFIX>LISTEN_PORT`, `<PREFIX>KEY`, `<PREFIX>FAKE` and so on.
/// Values that fail to parse are logged and skipped.
pub struct EnvSource {
    pub prefix: String,
}

impl EnvSource {
    /// Create a new environment source
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        let full_name = format!("{}{}", self.prefix, name);
        let value = env::var(&full_name).ok()?;
        if name == "KEY" {
            debug!("Found environment variable {}=<redacted>", full_name);
        } else {
            debug!("Found environment variable {}={}", full_name, value);
        }
        Some(value)
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from environment variables with prefix: {}", self.prefix);

        let mut values = ConfigValues::default();

        macro_rules! env_field {
            ($name:ident, $var:literal) => {
                if let Some(raw) = self.var($var) {
                    match raw.parse() {
                        Ok(parsed) => values.$name = Some(parsed),
                        Err(_) => warn!("Invalid {} in environment: {}", stringify!($name), raw),
                    }
                }
            };
        }

        env_field!(listen_port, "LISTEN_PORT");
        env_field!(fake, "FAKE");
        env_field!(key, "KEY");
        env_field!(key_transform, "KEY_TRANSFORM");
        env_field!(log_level, "LOG_LEVEL");
        env_field!(buffer_size, "BUFFER_SIZE");
        env_field!(connection_timeout, "CONNECTION_TIMEOUT");
        env_field!(send_timeout, "SEND_TIMEOUT");

        let mut config = ProxyConfig::from_values(values);
        track_sources(&mut config, self.source_type());

        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Environment
    }
}

/// Command line argument configuration source
pub struct CliSource {
    pub args: CliArgs,
}

impl CliSource {
    /// Create a new command line source
    pub fn new(args: CliArgs) -> Self {
        Self { args }
    }
}

impl ConfigSource for CliSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from command line arguments");

        let mut config = ProxyConfig::from_values(self.args.to_values());
        config.config_file = self.args.config_file.clone();
        track_sources(&mut config, self.source_type());

        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::CommandLine
    }
}
