//! Runtime relay settings
//!
//! [`ProxyConfig`] keeps values as the user wrote them. The relay works from
//! [`RelaySettings`], where the secret has already been turned into key
//! material and the decoy endpoint has been parsed.

use std::time::Duration;

use log::debug;

use crate::config::error::{ConfigError, Result};
use crate::config::types::{BufferSize, ProxyConfig};
use crate::protocol::{Address, HandshakeCodec, KeyTransform};

/// Everything a connection needs, shared read-only across connections
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Handshake inspector bound to the derived key
    pub codec: HandshakeCodec,
    /// Where unrecognised traffic goes
    pub fake: Address,
    pub buffer_size: BufferSize,
    /// Upper bound on an upstream connect
    pub connect_timeout: Duration,
    /// Upper bound on a single write to the client
    pub send_timeout: Duration,
}

impl RelaySettings {
    /// Build settings with an explicit key transform
    pub fn with_transform(config: &ProxyConfig, transform: &dyn KeyTransform) -> Result<Self> {
        let secret = config
            .key()
            .ok_or_else(|| ConfigError::MissingRequiredValue("key".to_string()))?;
        let key = transform.derive(secret.as_bytes());
        if key.is_empty() {
            return Err(ConfigError::InvalidValue(
                "key".to_string(),
                format!("{} transform produced an empty key", transform.name()),
            ));
        }
        debug!("Derived {}-byte wire key with {} transform", key.len(), transform.name());

        Ok(Self {
            codec: HandshakeCodec::new(key),
            fake: config.fake_address()?,
            buffer_size: config.buffer_size(),
            connect_timeout: config.connection_timeout(),
            send_timeout: config.send_timeout(),
        })
    }
}

impl TryFrom<&ProxyConfig> for RelaySettings {
    type Error = ConfigError;

    fn try_from(config: &ProxyConfig) -> Result<Self> {
        let transform = config.key_transform().build();
        Self::with_transform(config, transform.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{KeyTransformKind, SHA256_KEY_LEN};

    #[test]
    fn test_from_config() {
        let mut config = ProxyConfig::default();
        config.values.key = Some("k1".to_string());

        let settings = RelaySettings::try_from(&config).unwrap();
        assert_eq!(settings.codec.key().len(), SHA256_KEY_LEN);
        assert_eq!(settings.fake, "127.0.0.1:80".parse::<Address>().unwrap());
        assert_eq!(settings.buffer_size, BufferSize::Kb8);
        assert_eq!(settings.send_timeout, Duration::from_millis(5000));

        config.values.key_transform = Some(KeyTransformKind::Raw);
        let settings = RelaySettings::try_from(&config).unwrap();
        assert_eq!(settings.codec.key().as_bytes(), b"k1");
    }

    #[test]
    fn test_missing_key() {
        let config = ProxyConfig::default();
        assert!(RelaySettings::try_from(&config).is_err());
    }
}
