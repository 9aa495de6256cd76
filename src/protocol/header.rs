//! Handshake header codec
//!
//! A tunneled connection starts with the wire key followed by a short request:
//!
//! ```text
//! +-------------+-----+------+----------+------+
//! | key (N)     | CMD | ATYP | ADDR     | PORT |
//! +-------------+-----+------+----------+------+
//! | fixed width |  1  |  1   | variable |  2   |
//! +-------------+-----+------+----------+------+
//! ```
//!
//! ADDR is 4 bytes for IPv4, 16 for IPv6, and a one byte length followed by
//! the name for a domain. PORT is big endian.
//!
//! Anything that does not start with the key is not a handshake at all; the
//! codec reports [`Detection::Decoy`] and leaves the bytes untouched.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use bytes::{BufMut, BytesMut};
use log::{debug, trace};
use thiserror::Error;

use super::address::Address;
use super::key::KeyMaterial;

#[rustfmt::skip]
mod consts {
    pub const CMD_CONNECT:        u8 = 0x00;
    pub const CMD_UDP_ASSOCIATE:  u8 = 0x01;

    pub const ADDR_TYPE_IPV4:     u8 = 0x00;
    pub const ADDR_TYPE_IPV6:     u8 = 0x01;
    pub const ADDR_TYPE_DOMAIN:   u8 = 0x02;
}

pub use consts::*;

/// Relay mode requested by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// TCP stream to the target
    Connect,
    /// Datagrams to the target carried over the control connection
    UdpAssociate,
}

impl Command {
    #[inline]
    #[rustfmt::skip]
    pub fn as_u8(self) -> u8 {
        match self {
            Command::Connect      => CMD_CONNECT,
            Command::UdpAssociate => CMD_UDP_ASSOCIATE,
        }
    }

    #[inline]
    #[rustfmt::skip]
    pub fn from_u8(code: u8) -> Option<Command> {
        match code {
            CMD_CONNECT       => Some(Command::Connect),
            CMD_UDP_ASSOCIATE => Some(Command::UdpAssociate),
            _                 => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "connect"),
            Command::UdpAssociate => write!(f, "udp-associate"),
        }
    }
}

/// Structural handshake failure, raised only after the key matched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("unsupported command {0:#x}")]
    UnsupportedCommand(u8),
    #[error("address type {0:#x} not supported")]
    AddressTypeNotSupported(u8),
    #[error("address domain name must be UTF-8 encoding")]
    AddressDomainInvalidEncoding,
    #[error("address domain name is longer than 255 bytes")]
    AddressDomainTooLong,
}

/// The request following the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub command: Command,
    pub address: Address,
}

impl HandshakeHeader {
    pub fn new(command: Command, address: impl Into<Address>) -> Self {
        Self {
            command,
            address: address.into(),
        }
    }

    /// Decode the request from the bytes after the key
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), HeaderError> {
        let mut cursor = Cursor::new(data);

        let cmd = cursor.u8()?;
        let command = Command::from_u8(cmd).ok_or(HeaderError::UnsupportedCommand(cmd))?;

        let atyp = cursor.u8()?;
        let address = match atyp {
            ADDR_TYPE_IPV4 => {
                let octets: [u8; 4] = cursor.array()?;
                let port = cursor.u16()?;
                Address::SocketAddress(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port)))
            }
            ADDR_TYPE_IPV6 => {
                let octets: [u8; 16] = cursor.array()?;
                let port = cursor.u16()?;
                Address::SocketAddress(SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0)))
            }
            ADDR_TYPE_DOMAIN => {
                let len = cursor.u8()? as usize;
                let raw = cursor.take(len)?;
                let host = std::str::from_utf8(raw)
                    .map_err(|_| HeaderError::AddressDomainInvalidEncoding)?
                    .to_string();
                let port = cursor.u16()?;
                Address::DomainNameAddress(host, port)
            }
            other => return Err(HeaderError::AddressTypeNotSupported(other)),
        };

        Ok((Self { command, address }, cursor.position()))
    }

    /// Encode key and request, as a client would send them
    pub fn encode(&self, key: &KeyMaterial, buf: &mut BytesMut) -> Result<(), HeaderError> {
        buf.reserve(key.len() + self.serialized_len());
        buf.put_slice(key.as_bytes());
        buf.put_u8(self.command.as_u8());

        match &self.address {
            Address::SocketAddress(SocketAddr::V4(addr)) => {
                buf.put_u8(ADDR_TYPE_IPV4);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Address::SocketAddress(SocketAddr::V6(addr)) => {
                buf.put_u8(ADDR_TYPE_IPV6);
                buf.put_slice(&addr.ip().octets());
                buf.put_u16(addr.port());
            }
            Address::DomainNameAddress(host, port) => {
                if host.len() > u8::MAX as usize {
                    return Err(HeaderError::AddressDomainTooLong);
                }
                buf.put_u8(ADDR_TYPE_DOMAIN);
                buf.put_u8(host.len() as u8);
                buf.put_slice(host.as_bytes());
                buf.put_u16(*port);
            }
        }

        Ok(())
    }

    /// Length of the request part, key excluded
    pub fn serialized_len(&self) -> usize {
        2 + match &self.address {
            Address::SocketAddress(SocketAddr::V4(..)) => 4 + 2,
            Address::SocketAddress(SocketAddr::V6(..)) => 16 + 2,
            Address::DomainNameAddress(host, _) => 1 + host.len() + 2,
        }
    }
}

/// Outcome of inspecting the first read of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Key matched and the request parsed; payload starts at `payload_offset`
    Tunnel {
        header: HandshakeHeader,
        payload_offset: usize,
    },
    /// Key absent or wrong; relay everything to the decoy untouched
    Decoy,
}

/// Stateless handshake inspector bound to one key
#[derive(Debug, Clone)]
pub struct HandshakeCodec {
    key: KeyMaterial,
}

impl HandshakeCodec {
    pub fn new(key: KeyMaterial) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Classify the leading bytes of a connection
    ///
    /// A key mismatch is not an error. An error means the key matched but the
    /// request behind it is malformed.
    pub fn detect(&self, data: &[u8]) -> Result<Detection, HeaderError> {
        if !self.key.matches_prefix(data) {
            trace!("key mismatch on {} leading bytes", data.len());
            return Ok(Detection::Decoy);
        }

        let key_len = self.key.len();
        let (header, len) = HandshakeHeader::decode(&data[key_len..])?;
        debug!("handshake {} {}", header.command, header.address);

        Ok(Detection::Tunnel {
            header,
            payload_offset: key_len + len,
        })
    }
}

/// Bounds-checked reader over a byte slice
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], HeaderError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(HeaderError::Truncated {
                needed: end,
                available: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, HeaderError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, HeaderError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], HeaderError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::key::{KeyTransform, RawKeyTransform, Sha256KeyTransform};

    fn raw_codec(secret: &[u8]) -> HandshakeCodec {
        HandshakeCodec::new(RawKeyTransform.derive(secret))
    }

    #[test]
    fn test_ipv4_connect() {
        let codec = raw_codec(b"k1");
        let data = [b'k', b'1', 0x00, 0x00, 127, 0, 0, 1, 0x23, 0x28, b'h', b'i'];

        match codec.detect(&data).unwrap() {
            Detection::Tunnel { header, payload_offset } => {
                assert_eq!(header.command, Command::Connect);
                assert_eq!(header.address, Address::SocketAddress("127.0.0.1:9000".parse().unwrap()));
                assert_eq!(&data[payload_offset..], b"hi");
            }
            Detection::Decoy => panic!("expected tunnel"),
        }
    }

    #[test]
    fn test_ipv6_udp_associate() {
        let codec = raw_codec(b"k1");
        let mut data = vec![b'k', b'1', CMD_UDP_ASSOCIATE, ADDR_TYPE_IPV6];
        data.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        data.extend_from_slice(&53u16.to_be_bytes());

        match codec.detect(&data).unwrap() {
            Detection::Tunnel { header, payload_offset } => {
                assert_eq!(header.command, Command::UdpAssociate);
                assert_eq!(header.address, Address::SocketAddress("[::1]:53".parse().unwrap()));
                assert_eq!(payload_offset, data.len());
            }
            Detection::Decoy => panic!("expected tunnel"),
        }
    }

    #[test]
    fn test_domain() {
        let codec = raw_codec(b"k1");
        let mut data = vec![b'k', b'1', CMD_CONNECT, ADDR_TYPE_DOMAIN, 9];
        data.extend_from_slice(b"localhost");
        data.extend_from_slice(&80u16.to_be_bytes());

        let detection = codec.detect(&data).unwrap();
        assert_eq!(
            detection,
            Detection::Tunnel {
                header: HandshakeHeader::new(Command::Connect, Address::DomainNameAddress("localhost".into(), 80)),
                payload_offset: data.len(),
            }
        );
    }

    #[test]
    fn test_key_mismatch_is_decoy() {
        let codec = raw_codec(b"k1");
        assert_eq!(codec.detect(b"GET / HTTP/1.1\r\n\r\n").unwrap(), Detection::Decoy);
        // Shorter than the key counts as absent.
        assert_eq!(codec.detect(b"k").unwrap(), Detection::Decoy);
        assert_eq!(codec.detect(b"").unwrap(), Detection::Decoy);
    }

    #[test]
    fn test_structural_errors() {
        let codec = raw_codec(b"k1");

        assert_eq!(
            codec.detect(&[b'k', b'1', 0x00, 0x07, 1, 2, 3, 4, 0, 80]).unwrap_err(),
            HeaderError::AddressTypeNotSupported(0x07)
        );
        assert_eq!(
            codec.detect(&[b'k', b'1', 0x05, 0x00, 1, 2, 3, 4, 0, 80]).unwrap_err(),
            HeaderError::UnsupportedCommand(0x05)
        );
        assert!(matches!(
            codec.detect(&[b'k', b'1', 0x00, 0x00, 127, 0]).unwrap_err(),
            HeaderError::Truncated { .. }
        ));
        assert!(matches!(codec.detect(b"k1").unwrap_err(), HeaderError::Truncated { .. }));
        assert_eq!(
            codec.detect(&[b'k', b'1', 0x00, 0x02, 2, 0xff, 0xfe, 0, 80]).unwrap_err(),
            HeaderError::AddressDomainInvalidEncoding
        );
    }

    #[test]
    fn test_encode_matches_decode() {
        let key = Sha256KeyTransform.derive(b"shared secret");
        let codec = HandshakeCodec::new(key.clone());
        let header = HandshakeHeader::new(Command::UdpAssociate, Address::DomainNameAddress("example.com".into(), 443));

        let mut buf = BytesMut::new();
        header.encode(&key, &mut buf).unwrap();
        assert_eq!(buf.len(), key.len() + header.serialized_len());

        assert_eq!(
            codec.detect(&buf).unwrap(),
            Detection::Tunnel { header, payload_offset: buf.len() }
        );
    }

    #[test]
    fn test_encode_rejects_long_domain() {
        let key = RawKeyTransform.derive(b"k1");
        let header = HandshakeHeader::new(Command::Connect, Address::DomainNameAddress("a".repeat(256), 80));
        let mut buf = BytesMut::new();
        assert_eq!(header.encode(&key, &mut buf).unwrap_err(), HeaderError::AddressDomainTooLong);
    }
}
