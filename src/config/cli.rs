//! Command line arguments
//!
//! Every option is optional so that unset flags leave lower-priority
//! sources in effect.

use std::path::PathBuf;

use clap::Parser;

use crate::config::types::{BufferSize, ConfigValues};
use crate::protocol::KeyTransformKind;

/// Keyed TCP/UDP-over-TCP relay with decoy fallback
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "veil-relay", version, about, long_about = None)]
pub struct CliArgs {
    /// Port to listen on (bound on 0.0.0.0)
    #[arg(short = 'p', long)]
    pub listen_port: Option<u16>,

    /// Shared secret
    #[arg(short, long)]
    pub key: Option<String>,

    /// Decoy endpoint (host:port) for connections without the key
    #[arg(short, long, value_name = "HOST:PORT")]
    pub fake: Option<String>,

    /// Key transform (sha256, raw)
    #[arg(long)]
    pub key_transform: Option<KeyTransformKind>,

    /// Relay buffer size in KB (1, 2, 4, 8, 16, 32, 64, 128)
    #[arg(long)]
    pub buffer_size: Option<BufferSize>,

    /// Upstream connect timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub connection_timeout: Option<u64>,

    /// Client write timeout in milliseconds
    #[arg(long, value_name = "MILLISECONDS")]
    pub send_timeout: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Configuration file path
    #[arg(long, env = "VEIL_RELAY_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub show_config: bool,
}

impl CliArgs {
    /// Configuration values carried by these arguments
    pub fn to_values(&self) -> ConfigValues {
        ConfigValues {
            listen_port: self.listen_port,
            fake: self.fake.clone(),
            key: self.key.clone(),
            key_transform: self.key_transform,
            log_level: self.log_level.clone(),
            buffer_size: self.buffer_size,
            connection_timeout: self.connection_timeout,
            send_timeout: self.send_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "veil-relay", "-p", "6000", "--key", "k1", "--fake", "example.com:443",
            "--buffer-size", "32kb", "--key-transform", "raw",
        ])
        .unwrap();

        let values = args.to_values();
        assert_eq!(values.listen_port, Some(6000));
        assert_eq!(values.key.as_deref(), Some("k1"));
        assert_eq!(values.fake.as_deref(), Some("example.com:443"));
        assert_eq!(values.buffer_size, Some(BufferSize::Kb32));
        assert_eq!(values.key_transform, Some(KeyTransformKind::Raw));
        assert_eq!(values.send_timeout, None);
    }

    #[test]
    fn test_rejects_bad_buffer_size() {
        assert!(CliArgs::try_parse_from(["veil-relay", "--buffer-size", "3"]).is_err());
    }
}
