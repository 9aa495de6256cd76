//! Relay module
//!
//! The acceptor, the per-connection state machine and the two relay pumps.
//!
//! Control goes through a message channel: [`ProxyService::start`] binds and
//! spawns the service task, and the returned [`ProxyHandle`] stops it.

mod context;
mod forwarder;
mod handler;
mod message;
mod service;
mod udp;

pub use context::{ConnectionContext, ConnectionInfo, Step, Upstream, UDP_RECV_BUFFER_SIZE};
pub use handler::handle_connection;
pub use message::{ProxyHandle, ProxyMessage};
pub use service::{ProxyService, StandardProxyService};
