//! Layered configuration loading

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::cli::CliArgs;
use crate::config::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
use crate::config::error::Result;
use crate::config::source::{CliSource, ConfigSource, DefaultSource, EnvSource, FileSource};
use crate::config::types::{ConfigValues, ProxyConfig};
use crate::config::validator::validate_config;

/// Stacks configuration sources; a source added later overrides the ones
/// before it.
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    validate: bool,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            validate: true,
        }
    }

    pub fn with_defaults(mut self) -> Self {
        self.sources.push(Box::new(DefaultSource));
        self
    }

    /// JSON file; a missing file contributes nothing
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(Box::new(FileSource::new(path.as_ref())));
        self
    }

    /// `<prefix>LISTEN_PORT`, `<prefix>KEY`, ...
    pub fn with_env(mut self, prefix: &str) -> Self {
        self.sources.push(Box::new(EnvSource::new(prefix)));
        self
    }

    pub fn with_cli(mut self, args: CliArgs) -> Self {
        self.sources.push(Box::new(CliSource::new(args)));
        self
    }

    /// Skip [`validate_config`]
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    pub fn build(self) -> Result<ProxyConfig> {
        let mut config = ProxyConfig::from_values(ConfigValues::default());

        for source in self.sources {
            let kind = source.source_type();
            config = config.merge(&source.load()?, kind);
            debug!("Merged {} configuration", kind);
        }

        // Anything no source set falls back to its default.
        config.set_default_values();

        if self.validate {
            validate_config(&config)?;
        }
        config.log();

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
            .with_defaults()
            .with_file(DEFAULT_CONFIG_FILE)
            .with_env(ENV_PREFIX)
    }
}

/// Defaults, then the config file, then `VEIL_RELAY_*`, then `args`
pub fn auto_load(args: CliArgs) -> Result<ProxyConfig> {
    let config_file = args
        .config_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut builder = ConfigBuilder::new().with_defaults();
    if config_file.exists() {
        info!("Using configuration file: {}", config_file.display());
        builder = builder.with_file(&config_file);
    } else {
        debug!("No configuration file at {}", config_file.display());
    }

    builder.with_env(ENV_PREFIX).with_cli(args).build()
}
