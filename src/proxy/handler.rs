//! Connection handler module
//!
//! This module drives one accepted connection from its first read to close.

use std::net::SocketAddr;
use std::ops::Range;
use std::time::Duration;

use log::debug;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::common::{create_udp_socket, ProxyError, Result};
use crate::config::RelaySettings;
use crate::protocol::{Address, Command, Detection};
use super::context::{ConnectionContext, Upstream};
use super::forwarder::relay_tcp;
use super::udp::relay_udp;

/// Handle a single client connection
///
/// The context is closed before returning, whatever the outcome.
pub async fn handle_connection(mut ctx: ConnectionContext, settings: &RelaySettings) -> Result<()> {
    let result = serve(&mut ctx, settings).await;
    ctx.close().await;
    result
}

async fn serve(ctx: &mut ConnectionContext, settings: &RelaySettings) -> Result<()> {
    let Some((command, address, initial)) = handshake(ctx, settings).await? else {
        return Ok(());
    };

    let endpoint = address.resolve().await?;
    debug!("{} {} to {} ({})", ctx.info(), command, address, endpoint);

    match command {
        Command::Connect => {
            let stream = connect_upstream(endpoint, settings.connect_timeout).await?;
            ctx.begin_forward(command, endpoint, Upstream::Tcp(stream));
            relay_tcp(ctx, initial, settings.send_timeout).await
        }
        Command::UdpAssociate => {
            let socket = create_udp_socket(&endpoint)?;
            ctx.begin_forward(command, endpoint, Upstream::Udp(socket));
            relay_udp(ctx, initial, settings.send_timeout).await
        }
    }
}

/// Read once and classify the connection
///
/// Returns `None` when the client closed before sending anything. The range
/// is the part of the buffer to forward as the first payload.
async fn handshake(
    ctx: &mut ConnectionContext,
    settings: &RelaySettings,
) -> Result<Option<(Command, Address, Range<usize>)>> {
    let client = ctx
        .client
        .as_mut()
        .ok_or_else(|| ProxyError::Other("client stream already released".to_string()))?;

    let n = client.read(&mut ctx.buffer[..]).await?;
    if n == 0 {
        debug!("{} closed before sending anything", ctx.info);
        return Ok(None);
    }

    match settings.codec.detect(&ctx.buffer[..n]) {
        Ok(Detection::Tunnel { header, payload_offset }) => {
            Ok(Some((header.command, header.address, payload_offset..n)))
        }
        Ok(Detection::Decoy) => {
            debug!("{} no key in first {} bytes, relaying to decoy {}", ctx.info, n, settings.fake);
            Ok(Some((Command::Connect, settings.fake.clone(), 0..n)))
        }
        Err(err) => {
            debug!("{} malformed handshake: {}", ctx.info, err);
            Err(err.into())
        }
    }
}

/// Connect to the upstream, bounded by `limit`
async fn connect_upstream(endpoint: SocketAddr, limit: Duration) -> Result<TcpStream> {
    let stream = timeout(limit, TcpStream::connect(endpoint))
        .await
        .map_err(|_| ProxyError::Connect(format!("{}: timed out after {:?}", endpoint, limit)))?
        .map_err(|e| ProxyError::Connect(format!("{}: {}", endpoint, e)))?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay on {} failed: {}", endpoint, e);
    }

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        // Grab a free port, then release it so nothing listens there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect_upstream(addr, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProxyError::Connect(_)));
    }
}
