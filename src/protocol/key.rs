//! Wire key material
//!
//! The shared secret from configuration never goes on the wire directly: a
//! [`KeyTransform`] turns it into fixed-width key material that prefixes every
//! tunneled connection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fixed-width key material expected at the start of a tunneled connection
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(Bytes);

impl KeyMaterial {
    /// Wrap already derived bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Number of bytes the key occupies on the wire
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte-exact prefix match against the first bytes of a connection
    ///
    /// Data shorter than the key never matches. Runs in time independent of
    /// where the first differing byte is.
    pub fn matches_prefix(&self, data: &[u8]) -> bool {
        if self.0.is_empty() || data.len() < self.0.len() {
            return false;
        }
        let diff = self
            .0
            .iter()
            .zip(data)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        diff == 0
    }
}

// Never print the key itself.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial({} bytes)", self.0.len())
    }
}

/// Derives wire key material from the configured shared secret
pub trait KeyTransform: Send + Sync {
    /// Derive the key material for `secret`
    ///
    /// Every call with the same secret must yield the same bytes, and the
    /// output width must not depend on the secret's content.
    fn derive(&self, secret: &[u8]) -> KeyMaterial;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Shared handle to a key transform
pub type SharedKeyTransform = Arc<dyn KeyTransform>;

/// `SHA-256(secret)`, 32 bytes on the wire
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256KeyTransform;

/// Width of [`Sha256KeyTransform`] output
pub const SHA256_KEY_LEN: usize = 32;

impl KeyTransform for Sha256KeyTransform {
    fn derive(&self, secret: &[u8]) -> KeyMaterial {
        let digest = Sha256::digest(secret);
        KeyMaterial::new(Bytes::copy_from_slice(&digest))
    }

    fn name(&self) -> &'static str {
        "sha256"
    }
}

/// The secret bytes verbatim
///
/// Width is the secret's length, which is fixed for a given deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawKeyTransform;

impl KeyTransform for RawKeyTransform {
    fn derive(&self, secret: &[u8]) -> KeyMaterial {
        KeyMaterial::new(Bytes::copy_from_slice(secret))
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}

/// Key transform selection as it appears in configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyTransformKind {
    #[default]
    Sha256,
    Raw,
}

impl KeyTransformKind {
    /// Build the transform this kind names
    pub fn build(self) -> SharedKeyTransform {
        match self {
            Self::Sha256 => Arc::new(Sha256KeyTransform),
            Self::Raw => Arc::new(RawKeyTransform),
        }
    }
}

impl fmt::Display for KeyTransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

impl FromStr for KeyTransformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "raw" => Ok(Self::Raw),
            _ => Err(format!("Invalid key transform: {}. Valid values are: sha256, raw", s)),
        }
    }
}
