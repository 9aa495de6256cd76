//! Proxy service implementation
//!
//! The acceptor: binds the listening socket, accepts forever and runs each
//! connection in its own task. A message channel carries control requests
//! from [`ProxyHandle`]s.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::common::{bind_listener, ProxyError, Result};
use crate::config::{ProxyConfig, RelaySettings};
use super::context::{ConnectionContext, ConnectionInfo};
use super::handler::handle_connection;
use super::message::{create_channel, ProxyHandle, ProxyMessage};

/// Proxy service trait
///
/// This trait defines the interface for a proxy service.
pub trait ProxyService {
    /// Bind and start accepting
    ///
    /// Must be called from within a tokio runtime. Bind failures are
    /// returned here; everything after that is handled by the service task.
    fn start(self) -> Result<ProxyHandle>;
}

/// Counts a connection as active for as long as it lives
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Standard proxy service implementation
pub struct StandardProxyService {
    /// Listen address for the relay
    listen_addr: SocketAddr,
    /// Settings shared by every connection
    settings: Arc<RelaySettings>,
}

impl StandardProxyService {
    /// Create a new proxy service
    pub fn new(listen_addr: impl Into<SocketAddr>, settings: RelaySettings) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            settings: Arc::new(settings),
        }
    }

    /// Create a service listening on `0.0.0.0:<listen_port>`
    pub fn from_config(config: &ProxyConfig) -> Result<Self> {
        let settings = RelaySettings::try_from(config)?;
        let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port()));
        Ok(Self::new(listen_addr, settings))
    }

    async fn run_service(
        listener: TcpListener,
        settings: Arc<RelaySettings>,
        active: Arc<AtomicUsize>,
        mut rx: mpsc::Receiver<ProxyMessage>,
    ) {
        let mut tasks = JoinSet::new();
        let mut next_id: u64 = 0;

        let ack: oneshot::Sender<()> = loop {
            select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((client_stream, peer)) => {
                            next_id += 1;
                            let info = ConnectionInfo { id: next_id, peer, accepted_at: Instant::now() };
                            debug!("{} accepted", info);

                            let ctx = ConnectionContext::new(info.clone(), client_stream, settings.buffer_size);
                            let settings = Arc::clone(&settings);
                            let guard = ActiveGuard::new(&active);

                            tasks.spawn(async move {
                                let _guard = guard;
                                if let Err(e) = handle_connection(ctx, &settings).await {
                                    debug!("{} ended with error: {}", info, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }

                Some(message) = rx.recv() => {
                    match message {
                        ProxyMessage::Shutdown(ack) => break ack,
                    }
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Connection task panicked: {}", e);
                        }
                    }
                }
            }
        };

        drop(listener);
        info!("Listener closed, aborting {} connections", tasks.len());

        // Aborting drops each task's context, which closes its sockets.
        tasks.shutdown().await;

        // Later stop requests see a closed channel.
        drop(rx);

        info!("Proxy service shutdown complete");
        let _ = ack.send(());
    }
}

impl ProxyService for StandardProxyService {
    fn start(self) -> Result<ProxyHandle> {
        let listener = bind_listener(self.listen_addr)
            .map_err(|e| ProxyError::Io(std::io::Error::new(e.kind(), format!("failed to bind {}: {}", self.listen_addr, e))))?;
        let local_addr = listener.local_addr()?;

        info!("Relay listening on {}, decoy {}", local_addr, self.settings.fake);

        let active = Arc::new(AtomicUsize::new(0));
        let (handle, rx) = create_channel(local_addr, Arc::clone(&active));

        tokio::spawn(Self::run_service(listener, self.settings, active, rx));

        Ok(handle)
    }
}
