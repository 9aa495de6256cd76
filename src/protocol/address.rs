//! Target addresses
//!
//! An address is either a literal socket address or a domain name that still
//! needs a lookup. Lookups go through tokio's resolver so a slow DNS answer
//! only parks the task that asked for it.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use log::trace;
use tokio::net::lookup_host;

use crate::common::{ProxyError, Result};

/// Upstream address as carried in the handshake or configured as the decoy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Literal IPv4/IPv6 address and port
    SocketAddress(SocketAddr),
    /// Domain name and port, resolved on use
    DomainNameAddress(String, u16),
}

impl Address {
    /// Port component
    pub fn port(&self) -> u16 {
        match self {
            Self::SocketAddress(addr) => addr.port(),
            Self::DomainNameAddress(_, port) => *port,
        }
    }

    /// Resolve to a concrete endpoint, taking the first answer for domains
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            Self::SocketAddress(addr) => Ok(*addr),
            Self::DomainNameAddress(host, port) => {
                let mut addrs = lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| ProxyError::Resolve(format!("{}:{}: {}", host, port, e)))?;

                match addrs.next() {
                    Some(addr) => {
                        trace!("resolved {}:{} to {}", host, port, addr);
                        Ok(addr)
                    }
                    None => Err(ProxyError::Resolve(format!("{}:{}: no addresses returned", host, port))),
                }
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SocketAddress(addr) => write!(f, "{}", addr),
            Self::DomainNameAddress(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self::SocketAddress(addr)
    }
}

impl FromStr for Address {
    type Err = ProxyError;

    /// Parse `ip:port`, `[v6]:port` or `host:port`
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self::SocketAddress(addr));
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ProxyError::Config(format!("Invalid port in address: {}", s)))?;
                Ok(Self::DomainNameAddress(host.to_string(), port))
            }
            _ => Err(ProxyError::Config(format!("Invalid address, expected host:port: {}", s))),
        }
    }
}
