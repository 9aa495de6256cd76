//! Configuration types
//!
//! This module contains the main configuration types used throughout the application.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::defaults::{
    BUFFER_SIZE, CONNECTION_TIMEOUT, FAKE_STR, KEY_TRANSFORM, LISTEN_PORT, LOG_LEVEL_STR, SEND_TIMEOUT_MS,
};
use crate::config::error::{ConfigError, Result};
use crate::protocol::{Address, KeyTransformKind};

/// Relay buffer size class
///
/// Each class is `2^n` KB; the discriminant is `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BufferSize {
    Kb1 = 0,
    Kb2 = 1,
    Kb4 = 2,
    Kb8 = 3,
    Kb16 = 4,
    Kb32 = 5,
    Kb64 = 6,
    Kb128 = 7,
}

impl BufferSize {
    /// All classes, smallest first
    pub const ALL: [BufferSize; 8] = [
        Self::Kb1, Self::Kb2, Self::Kb4, Self::Kb8,
        Self::Kb16, Self::Kb32, Self::Kb64, Self::Kb128,
    ];

    #[inline]
    pub fn exponent(self) -> u8 {
        self as u8
    }

    pub fn from_exponent(exp: u8) -> Option<Self> {
        Self::ALL.get(exp as usize).copied()
    }

    /// Size in kilobytes
    #[inline]
    pub fn kilobytes(self) -> usize {
        1 << self.exponent()
    }

    /// Size in bytes
    #[inline]
    pub fn bytes(self) -> usize {
        self.kilobytes() * 1024
    }

    pub fn from_kilobytes(kb: u64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.kilobytes() as u64 == kb)
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        BUFFER_SIZE
    }
}

impl fmt::Display for BufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}kb", self.kilobytes())
    }
}

impl FromStr for BufferSize {
    type Err = ConfigError;

    /// Accepts `8`, `8kb`, `8KB` or `KB_8`
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        let digits = lower
            .strip_prefix("kb_")
            .or_else(|| lower.strip_suffix("kb"))
            .unwrap_or(&lower);

        digits
            .parse::<u64>()
            .ok()
            .and_then(Self::from_kilobytes)
            .ok_or_else(|| ConfigError::InvalidValue(
                "buffer_size".to_string(),
                format!("Invalid buffer size: {}. Valid values are: 1, 2, 4, 8, 16, 32, 64, 128 (KB)", s),
            ))
    }
}

impl Serialize for BufferSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BufferSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Kilobytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Kilobytes(kb) => BufferSize::from_kilobytes(kb)
                .ok_or_else(|| serde::de::Error::custom(format!("Invalid buffer size: {} KB", kb))),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    /// Default value
    Default,
    /// From configuration file
    File,
    /// From environment variable
    Environment,
    /// From command line argument
    CommandLine,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Default => write!(f, "default"),
            ValueSource::File => write!(f, "file"),
            ValueSource::Environment => write!(f, "environment"),
            ValueSource::CommandLine => write!(f, "command line"),
        }
    }
}

/// Configuration values
///
/// Every field is optional so that sources can be layered; the accessors on
/// [`ProxyConfig`] fill in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigValues {
    // --- Network settings ---

    /// Port to listen on, bound on 0.0.0.0
    #[serde(default, alias = "port")]
    pub listen_port: Option<u16>,

    /// Decoy endpoint (host:port) for connections without the key
    #[serde(default, alias = "fallback")]
    pub fake: Option<String>,

    // --- Handshake settings ---

    /// Shared secret
    #[serde(default)]
    pub key: Option<String>,

    /// Transform from the shared secret to wire key material
    #[serde(default)]
    pub key_transform: Option<KeyTransformKind>,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    #[serde(default)]
    pub log_level: Option<String>,

    /// Relay buffer size class
    #[serde(default)]
    pub buffer_size: Option<BufferSize>,

    /// Upstream connect timeout in seconds
    #[serde(default)]
    pub connection_timeout: Option<u64>,

    /// Timeout for a single write to the client, in milliseconds
    #[serde(default)]
    pub send_timeout: Option<u64>,
}

/// Proxy configuration
///
/// Contains all configuration options needed for the relay server.
/// Supports loading from command-line arguments, environment variables,
/// and configuration files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Configuration values
    pub values: ConfigValues,

    /// Configuration file path
    pub config_file: Option<PathBuf>,

    /// Source tracking for configuration values
    pub sources: HashMap<String, ValueSource>,
}

impl Deref for ProxyConfig {
    type Target = ConfigValues;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl Serialize for ProxyConfig {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.values.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProxyConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = ConfigValues::deserialize(deserializer)?;
        Ok(Self::from_values(values))
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let mut config = Self::from_values(ConfigValues::default());

        // Apply default values and track their source
        config.set_default_values();

        config
    }
}

impl ProxyConfig {
    /// Wrap raw values without applying defaults
    pub fn from_values(values: ConfigValues) -> Self {
        Self {
            values,
            config_file: None,
            sources: HashMap::new(),
        }
    }

    /// Set default values for all configuration options
    ///
    /// The shared secret has no default.
    pub fn set_default_values(&mut self) {
        macro_rules! default_field {
            ($name:ident, $value:expr) => {
                if self.values.$name.is_none() {
                    self.values.$name = Some($value);
                    self.sources.insert(stringify!($name).to_string(), ValueSource::Default);
                }
            };
        }

        default_field!(listen_port, LISTEN_PORT);
        default_field!(fake, FAKE_STR.to_string());
        default_field!(key_transform, KEY_TRANSFORM);
        default_field!(log_level, LOG_LEVEL_STR.to_string());
        default_field!(buffer_size, BUFFER_SIZE);
        default_field!(connection_timeout, CONNECTION_TIMEOUT);
        default_field!(send_timeout, SEND_TIMEOUT_MS);
    }

    /// Get the source of a configuration value
    pub fn source(&self, name: &str) -> &str {
        match self.sources.get(name) {
            Some(source) => match source {
                ValueSource::Default => "default",
                ValueSource::File => "file",
                ValueSource::Environment => "environment",
                ValueSource::CommandLine => "command line",
            },
            None => "unknown",
        }
    }

    /// Get the listen port
    pub fn listen_port(&self) -> u16 {
        self.values.listen_port.unwrap_or(LISTEN_PORT)
    }

    /// Get the decoy endpoint as configured
    pub fn fake(&self) -> &str {
        self.values.fake.as_deref().unwrap_or(FAKE_STR)
    }

    /// Parse the decoy endpoint
    pub fn fake_address(&self) -> Result<Address> {
        self.fake()
            .parse::<Address>()
            .map_err(|e| ConfigError::InvalidValue("fake".to_string(), e.to_string()))
    }

    /// Get the shared secret, if any
    pub fn key(&self) -> Option<&str> {
        self.values.key.as_deref()
    }

    /// Get the key transform
    pub fn key_transform(&self) -> KeyTransformKind {
        self.values.key_transform.unwrap_or(KEY_TRANSFORM)
    }

    /// Get the log level
    pub fn log_level(&self) -> &str {
        self.values.log_level.as_deref().unwrap_or(LOG_LEVEL_STR)
    }

    /// Get the buffer size class
    pub fn buffer_size(&self) -> BufferSize {
        self.values.buffer_size.unwrap_or(BUFFER_SIZE)
    }

    /// Get the upstream connect timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.values.connection_timeout.unwrap_or(CONNECTION_TIMEOUT))
    }

    /// Get the client write timeout
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.values.send_timeout.unwrap_or(SEND_TIMEOUT_MS))
    }

    /// Get the configuration file path
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Merge two configurations
    ///
    /// Fields present in `other` win and are attributed to `source`.
    pub fn merge(&self, other: &ProxyConfig, source: ValueSource) -> Self {
        let mut result = self.clone();

        macro_rules! merge_field {
            ($name:ident) => {
                if other.values.$name.is_some() {
                    result.values.$name = other.values.$name.clone();
                    result.sources.insert(stringify!($name).to_string(), source);
                }
            };
        }

        merge_field!(listen_port);
        merge_field!(fake);
        merge_field!(key);
        merge_field!(key_transform);
        merge_field!(log_level);
        merge_field!(buffer_size);
        merge_field!(connection_timeout);
        merge_field!(send_timeout);

        if let Some(path) = &other.config_file {
            result.config_file = Some(path.clone());
        }

        result
    }

    /// Log the configuration
    pub fn log(&self) {
        debug!("=== Configuration ===");
        debug!("Network settings:");
        debug!("  Listen port: {} (from {})", self.listen_port(), self.source("listen_port"));
        debug!("  Decoy endpoint: {} (from {})", self.fake(), self.source("fake"));

        debug!("Handshake settings:");
        debug!("  Key: {} (from {})", if self.key().is_some() { "<set>" } else { "<unset>" }, self.source("key"));
        debug!("  Key transform: {} (from {})", self.key_transform(), self.source("key_transform"));

        debug!("General settings:");
        debug!("  Log level: {} (from {})", self.log_level(), self.source("log_level"));
        debug!("  Buffer size: {} (from {})", self.buffer_size(), self.source("buffer_size"));
        debug!("  Connection timeout: {:?} (from {})", self.connection_timeout(), self.source("connection_timeout"));
        debug!("  Send timeout: {:?} (from {})", self.send_timeout(), self.source("send_timeout"));

        if let Some(file) = self.config_file() {
            debug!("  Configuration file: {}", file.display());
        }

        debug!("=====================");
    }
}
