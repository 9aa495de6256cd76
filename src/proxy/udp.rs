//! UDP relay pump
//!
//! Each read on the control connection becomes one datagram to the target.
//! Each datagram received on the upstream socket is written back to the
//! client unmodified. There is no framing; the client relies on read
//! boundaries.

use std::io;
use std::net::SocketAddr;
use std::ops::Range;
use std::time::Duration;

use futures::future::{self, Either};
use futures::pin_mut;
use log::{debug, trace};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::UdpSocket;

use crate::common::{ProxyError, Result};
use super::context::{ConnectionContext, Upstream};
use super::forwarder::write_chunk;

/// Relay between the client and the UDP upstream of `ctx`
///
/// `initial` is the range of `ctx.buffer` that arrived with the handshake;
/// when non-empty it is sent as the first datagram.
pub(crate) async fn relay_udp(ctx: &mut ConnectionContext, initial: Range<usize>, send_timeout: Duration) -> Result<()> {
    let endpoint = ctx
        .target_endpoint()
        .ok_or_else(|| ProxyError::Other("no target endpoint resolved".to_string()))?;

    let ConnectionContext {
        info,
        client,
        target,
        buffer,
        upstream_buffer,
        pending_udp_remote,
        bytes_up,
        bytes_down,
        ..
    } = ctx;

    let client = client
        .as_mut()
        .ok_or_else(|| ProxyError::Other("client stream already released".to_string()))?;
    let socket = match target {
        Some(Upstream::Udp(socket)) => &*socket,
        _ => return Err(ProxyError::Other("no UDP upstream attached".to_string())),
    };

    if !initial.is_empty() {
        let sent = socket.send_to(&buffer[initial], endpoint).await?;
        *bytes_up += sent as u64;
        trace!("{} sent {} byte handshake datagram to {}", info, sent, endpoint);
    }

    let (mut client_reader, mut client_writer) = client.split();

    let outbound = client_to_datagrams(&mut client_reader, socket, endpoint, &mut buffer[..], bytes_up);
    let inbound = datagrams_to_client(
        socket,
        &mut client_writer,
        &mut upstream_buffer[..],
        pending_udp_remote,
        bytes_down,
        send_timeout,
    );
    pin_mut!(outbound, inbound);

    let result = match future::select(outbound, inbound).await {
        Either::Left((r, _)) => {
            debug!("{} client side finished", info);
            r
        }
        Either::Right((r, _)) => {
            debug!("{} udp side finished", info);
            r
        }
    };

    result.map_err(ProxyError::from)
}

async fn client_to_datagrams(
    reader: &mut ReadHalf<'_>,
    socket: &UdpSocket,
    endpoint: SocketAddr,
    buf: &mut [u8],
    count: &mut u64,
) -> io::Result<()> {
    loop {
        let n = reader.read(buf).await?;
        if n == 0 {
            return Ok(());
        }
        let sent = socket.send_to(&buf[..n], endpoint).await?;
        *count += sent as u64;
    }
}

async fn datagrams_to_client(
    socket: &UdpSocket,
    writer: &mut WriteHalf<'_>,
    buf: &mut [u8],
    remote: &mut Option<SocketAddr>,
    count: &mut u64,
    send_timeout: Duration,
) -> io::Result<()> {
    loop {
        let (n, from) = socket.recv_from(buf).await?;
        *remote = Some(from);
        write_chunk(writer, &buf[..n], Some(send_timeout)).await?;
        *count += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::create_udp_socket;
    use crate::config::BufferSize;
    use crate::protocol::Command;
    use crate::proxy::context::ConnectionInfo;
    use std::time::Instant;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn test_datagram_echo() {
        let echo = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = echo.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let (n, from) = echo.recv_from(&mut buf).await.unwrap();
                echo.send_to(&buf[..n], from).await.unwrap();
            }
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (app, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let mut app = app.unwrap();
        let (accepted, peer) = accepted.unwrap();

        let info = ConnectionInfo { id: 1, peer, accepted_at: Instant::now() };
        let mut ctx = ConnectionContext::new(info, accepted, BufferSize::Kb1);
        ctx.buffer[..3].copy_from_slice(b"one");
        let socket = create_udp_socket(&echo_addr).unwrap();
        ctx.begin_forward(Command::UdpAssociate, echo_addr, Upstream::Udp(socket));

        let relay = tokio::spawn(async move {
            let _ = relay_udp(&mut ctx, 0..3, Duration::from_secs(5)).await;
            let remote = ctx.pending_udp_remote();
            ctx.close().await;
            remote
        });

        let mut buf = [0u8; 3];
        app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"one");

        app.write_all(b"two").await.unwrap();
        app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"two");

        drop(app);
        assert_eq!(relay.await.unwrap(), Some(echo_addr));
    }
}
