//! Handshake protocol module
//!
//! This module decides, from the first bytes of a connection, whether it is a
//! tunneled request or ordinary traffic, and decodes the target of a tunneled
//! request. It is pure and does no I/O apart from the resolver call on
//! [`Address::resolve`].

mod address;
mod header;
mod key;

pub use address::Address;
pub use header::{Command, Detection, HandshakeCodec, HandshakeHeader, HeaderError};
pub use header::{ADDR_TYPE_DOMAIN, ADDR_TYPE_IPV4, ADDR_TYPE_IPV6, CMD_CONNECT, CMD_UDP_ASSOCIATE};
pub use key::{
    KeyMaterial, KeyTransform, KeyTransformKind, RawKeyTransform, Sha256KeyTransform, SharedKeyTransform,
    SHA256_KEY_LEN,
};
