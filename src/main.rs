//! Veil Relay command line tool
//!
//! Loads layered configuration, starts the relay and runs until Ctrl+C.

use clap::Parser;
use log::{info, warn};

use veil_relay::common::{init_logger, ProxyError, Result};
use veil_relay::config::{auto_load, defaults::LOG_LEVEL_STR, CliArgs, ConfigValidator};
use veil_relay::proxy::{ProxyService, StandardProxyService};
use veil_relay::{APP_NAME, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Configuration loading logs too, so start with the command line level
    init_logger(args.log_level.as_deref().unwrap_or(LOG_LEVEL_STR));

    info!("Starting {} v{}", APP_NAME, VERSION);

    let show_config = args.show_config;
    let config = auto_load(args)?;

    for warning in config.check_warnings() {
        warn!("{}", warning);
    }

    if show_config {
        let mut values = config.values.clone();
        if values.key.is_some() {
            values.key = Some("<redacted>".to_string());
        }
        let rendered = serde_json::to_string_pretty(&values)
            .map_err(|e| ProxyError::Other(format!("Failed to render configuration: {}", e)))?;
        println!("{}", rendered);
        return Ok(());
    }

    let service = StandardProxyService::from_config(&config)?;
    let handle = service.start()?;

    info!(
        "Relay ready on {} (buffer {}, key transform {}), press Ctrl+C to stop",
        handle.local_addr(),
        config.buffer_size(),
        config.key_transform()
    );

    tokio::signal::ctrl_c().await?;

    info!("Shutting down, {} active connections", handle.active_connections());
    handle.stop().await?;

    Ok(())
}
