//! Per-connection state
//!
//! A [`ConnectionContext`] owns everything one accepted connection uses: the
//! client stream, the upstream socket once there is one, and the relay
//! buffers. Closing it (explicitly or by dropping it) releases all of that
//! exactly once.

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::BytesMut;
use log::debug;
use tokio::net::{TcpStream, UdpSocket};

use crate::common::safe_shutdown;
use crate::config::BufferSize;
use crate::protocol::Command;

/// Largest UDP payload a single datagram can carry
pub const UDP_RECV_BUFFER_SIZE: usize = 65535;

/// Protocol step of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Waiting for the first read to decide what the connection is
    Handshake,
    /// Relaying to the upstream
    Forward,
    /// Sockets shut down and buffers released
    Closed,
}

/// Upstream side of a connection
#[derive(Debug)]
pub enum Upstream {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Identity of an accepted connection, for logs
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer: SocketAddr,
    pub accepted_at: Instant,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.peer)
    }
}

/// State of one accepted connection
pub struct ConnectionContext {
    pub(crate) info: ConnectionInfo,
    pub(crate) client: Option<TcpStream>,
    pub(crate) target: Option<Upstream>,
    step: Step,
    command: Option<Command>,
    target_endpoint: Option<SocketAddr>,
    /// Reads from the client
    pub(crate) buffer: BytesMut,
    /// Reads from the upstream, allocated on entering `Forward`
    pub(crate) upstream_buffer: BytesMut,
    /// Sender of the last datagram received on the UDP upstream
    pub(crate) pending_udp_remote: Option<SocketAddr>,
    /// Client to upstream
    pub(crate) bytes_up: u64,
    /// Upstream to client
    pub(crate) bytes_down: u64,
}

impl ConnectionContext {
    pub fn new(info: ConnectionInfo, client: TcpStream, buffer_size: BufferSize) -> Self {
        Self {
            info,
            client: Some(client),
            target: None,
            step: Step::Handshake,
            command: None,
            target_endpoint: None,
            buffer: BytesMut::zeroed(buffer_size.bytes()),
            upstream_buffer: BytesMut::new(),
            pending_udp_remote: None,
            bytes_up: 0,
            bytes_down: 0,
        }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Relay mode, set once the context is forwarding
    pub fn command(&self) -> Option<Command> {
        self.command
    }

    pub fn target_endpoint(&self) -> Option<SocketAddr> {
        self.target_endpoint
    }

    pub fn pending_udp_remote(&self) -> Option<SocketAddr> {
        self.pending_udp_remote
    }

    /// Bytes relayed as `(client to upstream, upstream to client)`
    pub fn byte_counts(&self) -> (u64, u64) {
        (self.bytes_up, self.bytes_down)
    }

    pub fn is_closed(&self) -> bool {
        self.step == Step::Closed
    }

    /// Attach the upstream and move to `Forward`
    ///
    /// Only valid from `Handshake`; a second call is ignored and the new
    /// upstream is dropped.
    pub fn begin_forward(&mut self, command: Command, endpoint: SocketAddr, upstream: Upstream) {
        if self.step != Step::Handshake {
            debug!("{} ignoring forward transition from {:?}", self.info, self.step);
            return;
        }

        let upstream_len = match upstream {
            Upstream::Tcp(..) => self.buffer.len(),
            Upstream::Udp(..) => UDP_RECV_BUFFER_SIZE,
        };

        self.upstream_buffer = BytesMut::zeroed(upstream_len);
        self.command = Some(command);
        self.target_endpoint = Some(endpoint);
        self.target = Some(upstream);
        self.step = Step::Forward;
    }

    /// Shut down both sockets and release the buffers
    ///
    /// Errors from an already closed peer are ignored. A second call is a
    /// no-op.
    pub async fn close(&mut self) {
        if self.step == Step::Closed {
            return;
        }

        if let Some(mut client) = self.client.take() {
            safe_shutdown(&mut client).await;
        }

        match self.target.take() {
            Some(Upstream::Tcp(mut stream)) => safe_shutdown(&mut stream).await,
            Some(Upstream::Udp(socket)) => drop(socket),
            None => {}
        }

        self.release();
    }

    fn release(&mut self) {
        self.client = None;
        self.target = None;
        self.buffer = BytesMut::new();
        self.upstream_buffer = BytesMut::new();
        self.pending_udp_remote = None;
        self.step = Step::Closed;

        debug!(
            "{} closed after {:?}, {} bytes up, {} bytes down",
            self.info,
            self.info.accepted_at.elapsed(),
            self.bytes_up,
            self.bytes_down
        );
    }
}

impl Drop for ConnectionContext {
    fn drop(&mut self) {
        // Aborted mid-relay; dropping the sockets closes them.
        if self.step != Step::Closed {
            self.release();
        }
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("info", &self.info)
            .field("step", &self.step)
            .field("command", &self.command)
            .field("target_endpoint", &self.target_endpoint)
            .field("buffer", &self.buffer.len())
            .finish()
    }
}
