//! Default configuration values
//!
//! Single source of truth for defaults, shared by the config types, the
//! sources and the validator.

use super::types::BufferSize;
use crate::protocol::KeyTransformKind;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "VEIL_RELAY_";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default listen port
pub const LISTEN_PORT: u16 = 5413;

/// Default decoy endpoint
pub const FAKE_STR: &str = "127.0.0.1:80";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default buffer size class (8 KB)
pub const BUFFER_SIZE: BufferSize = BufferSize::Kb8;

/// Default upstream connect timeout in seconds
pub const CONNECTION_TIMEOUT: u64 = 30;

/// Default timeout for writes to the client in milliseconds
pub const SEND_TIMEOUT_MS: u64 = 5000;

/// Default key transform
pub const KEY_TRANSFORM: KeyTransformKind = KeyTransformKind::Sha256;
