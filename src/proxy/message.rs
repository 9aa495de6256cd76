//! Proxy message types
//!
//! This module defines the message types that can be sent to the proxy service.
//! The service task owns the listener and every connection task; the handle
//! only talks to it through a channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::{mpsc, oneshot};

use crate::common::{ProxyError, Result};

/// Messages that can be sent to the proxy service
#[derive(Debug)]
pub enum ProxyMessage {
    /// Close the listener, abort all connections, then acknowledge
    Shutdown(oneshot::Sender<()>),
}

/// Proxy control handle
///
/// Cheap to clone. Dropping every handle leaves the service running.
#[derive(Debug, Clone)]
pub struct ProxyHandle {
    /// Message sender
    sender: mpsc::Sender<ProxyMessage>,
    local_addr: SocketAddr,
    active: Arc<AtomicUsize>,
}

impl ProxyHandle {
    /// Create a new proxy handle
    pub(crate) fn new(sender: mpsc::Sender<ProxyMessage>, local_addr: SocketAddr, active: Arc<AtomicUsize>) -> Self {
        Self {
            sender,
            local_addr,
            active,
        }
    }

    /// Send a message to the proxy service
    pub async fn send(&self, message: ProxyMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| ProxyError::Other("Failed to send message to proxy service".to_string()))
    }

    /// Stop the service
    ///
    /// Resolves once the listener is closed and every connection task has
    /// been aborted. Calling it again, from any clone, is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();

        if self.send(ProxyMessage::Shutdown(ack)).await.is_err() {
            debug!("Proxy service already stopped");
            return Ok(());
        }

        // A dropped ack means another stop got there first.
        let _ = done.await;
        Ok(())
    }

    /// Whether the service task has exited
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Create a new proxy message channel
pub(crate) fn create_channel(
    local_addr: SocketAddr,
    active: Arc<AtomicUsize>,
) -> (ProxyHandle, mpsc::Receiver<ProxyMessage>) {
    let (tx, rx) = mpsc::channel(16);
    (ProxyHandle::new(tx, local_addr, active), rx)
}
