//! TCP relay pump
//!
//! Copies bytes between the client and a TCP upstream until either side
//! reaches EOF or fails. Each direction is strictly read, write, re-arm.

use std::io;
use std::ops::Range;
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time;

use crate::common::{ProxyError, Result};
use super::context::{ConnectionContext, Upstream};

/// Relay between the client and the TCP upstream of `ctx`
///
/// `initial` is the range of `ctx.buffer` that arrived with the handshake
/// and goes to the upstream first. Returns when either direction ends; the
/// caller closes the context.
pub(crate) async fn relay_tcp(ctx: &mut ConnectionContext, initial: Range<usize>, send_timeout: Duration) -> Result<()> {
    let ConnectionContext {
        info,
        client,
        target,
        buffer,
        upstream_buffer,
        bytes_up,
        bytes_down,
        ..
    } = ctx;

    let client = client
        .as_mut()
        .ok_or_else(|| ProxyError::Other("client stream already released".to_string()))?;
    let upstream = match target {
        Some(Upstream::Tcp(stream)) => stream,
        _ => return Err(ProxyError::Other("no TCP upstream attached".to_string())),
    };

    if !initial.is_empty() {
        let len = initial.len();
        upstream.write_all(&buffer[initial]).await?;
        *bytes_up += len as u64;
        trace!("{} forwarded {} handshake bytes", info, len);
    }

    let (mut client_reader, mut client_writer) = client.split();
    let (mut upstream_reader, mut upstream_writer) = upstream.split();

    let result = tokio::select! {
        r = copy_direction(&mut client_reader, &mut upstream_writer, &mut buffer[..], bytes_up, None) => {
            debug!("{} client side finished", info);
            r
        }
        r = copy_direction(&mut upstream_reader, &mut client_writer, &mut upstream_buffer[..], bytes_down, Some(send_timeout)) => {
            debug!("{} upstream side finished", info);
            r
        }
    };

    result.map_err(ProxyError::from)
}

/// Copy one direction until EOF or error
///
/// After each read, bytes the socket already holds are pulled in with
/// non-blocking reads so they go out in the same write.
async fn copy_direction(
    reader: &mut ReadHalf<'_>,
    writer: &mut WriteHalf<'_>,
    buf: &mut [u8],
    count: &mut u64,
    write_timeout: Option<Duration>,
) -> io::Result<()> {
    loop {
        let mut filled = reader.read(buf).await?;
        if filled == 0 {
            return Ok(());
        }

        let (more, eof) = drain_available(reader.as_ref(), &mut buf[filled..])?;
        filled += more;

        write_chunk(writer, &buf[..filled], write_timeout).await?;
        *count += filled as u64;

        if eof {
            return Ok(());
        }
    }
}

/// Read whatever is ready without waiting
///
/// Returns the number of bytes read and whether EOF was seen.
fn drain_available(stream: &TcpStream, buf: &mut [u8]) -> io::Result<(usize, bool)> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.try_read(&mut buf[filled..]) {
            Ok(0) => return Ok((filled, true)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok((filled, false))
}

/// Write all of `data`, optionally bounded by `limit`
pub(super) async fn write_chunk(writer: &mut WriteHalf<'_>, data: &[u8], limit: Option<Duration>) -> io::Result<()> {
    match limit {
        Some(limit) => time::timeout(limit, writer.write_all(data))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write to client timed out"))?,
        None => writer.write_all(data).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferSize;
    use crate::protocol::Command;
    use crate::proxy::context::ConnectionInfo;
    use std::time::Instant;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (mut app_client, accepted) = pair().await;
        let (mut app_target, upstream) = pair().await;

        let info = ConnectionInfo { id: 7, peer: accepted.peer_addr().unwrap(), accepted_at: Instant::now() };
        let endpoint = upstream.peer_addr().unwrap();
        let mut ctx = ConnectionContext::new(info, accepted, BufferSize::Kb1);
        ctx.buffer[..5].copy_from_slice(b"hello");
        ctx.begin_forward(Command::Connect, endpoint, Upstream::Tcp(upstream));

        let relay = tokio::spawn(async move {
            let result = relay_tcp(&mut ctx, 0..5, Duration::from_secs(5)).await;
            ctx.close().await;
            (result.is_ok(), ctx.byte_counts())
        });

        let mut buf = [0u8; 5];
        app_target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        app_client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        app_target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        app_target.write_all(b"pong").await.unwrap();
        app_client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(app_client);
        let (ok, counts) = relay.await.unwrap();
        assert!(ok);
        assert_eq!(counts, (9, 4));

        let mut rest = Vec::new();
        app_target.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_drain_available() {
        let (mut writer, reader) = pair().await;
        writer.write_all(b"abcdef").await.unwrap();
        reader.readable().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = [0u8; 4];
        let (n, eof) = drain_available(&reader, &mut buf).unwrap();
        assert_eq!((n, eof), (4, false));
        assert_eq!(&buf, b"abcd");

        drop(writer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut buf = [0u8; 16];
        let (n, eof) = drain_available(&reader, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ef");
        assert!(eof);
    }
}
