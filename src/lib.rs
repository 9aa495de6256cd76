//! Veil Relay: keyed TCP/UDP-over-TCP relay with decoy fallback
//!
//! Every inbound connection is inspected on its first read. If it starts
//! with the wire key derived from the shared secret, the header behind the
//! key names a target and a mode (TCP stream or UDP datagrams carried over
//! the connection) and the relay pumps bytes to that target. Anything else
//! is passed, byte for byte, to a decoy endpoint so the port looks like an
//! ordinary service.
//!
//! # Main Features
//!
//! - Single TCP port, no distinguishable handshake for unkeyed clients
//! - TCP relay and UDP-over-TCP relay to IPv4, IPv6 or domain targets
//! - Pluggable key derivation (SHA-256 by default)
//! - Layered configuration from file, environment and command line
//!
//! # Example
//!
//! ```no_run
//! use veil_relay::config::{ConfigBuilder, ENV_PREFIX};
//! use veil_relay::proxy::{ProxyService, StandardProxyService};
//! use veil_relay::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConfigBuilder::new()
//!         .with_defaults()
//!         .with_file("config.json")
//!         .with_env(ENV_PREFIX)
//!         .build()?;
//!
//!     let handle = StandardProxyService::from_config(&config)?.start()?;
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod protocol;
pub mod proxy;

// Re-export commonly used structures and functions for convenience
pub use common::{ProxyError, Result};
pub use config::{ProxyConfig, RelaySettings};
pub use protocol::{Address, Command, HandshakeCodec, HandshakeHeader, KeyTransform};
pub use proxy::{ProxyHandle, ProxyService, StandardProxyService};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
