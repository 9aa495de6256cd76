//! Shared helpers for the relay integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use veil_relay::config::{BufferSize, RelaySettings};
use veil_relay::protocol::{Address, Command, HandshakeCodec, HandshakeHeader, KeyMaterial, KeyTransform, RawKeyTransform};
use veil_relay::proxy::{ProxyHandle, ProxyService, StandardProxyService};

pub const SECRET: &[u8] = b"k1";

/// Upper bound on any single wait in these tests
pub const WAIT: Duration = Duration::from_secs(5);

pub fn raw_key() -> KeyMaterial {
    RawKeyTransform.derive(SECRET)
}

pub fn settings_with(key: KeyMaterial, fake: SocketAddr) -> RelaySettings {
    RelaySettings {
        codec: HandshakeCodec::new(key),
        fake: Address::SocketAddress(fake),
        buffer_size: BufferSize::Kb4,
        connect_timeout: Duration::from_secs(2),
        send_timeout: Duration::from_secs(2),
    }
}

/// Start a relay on an ephemeral loopback port with the raw `k1` key
pub fn start_relay(fake: SocketAddr) -> ProxyHandle {
    start_relay_with(raw_key(), fake)
}

pub fn start_relay_with(key: KeyMaterial, fake: SocketAddr) -> ProxyHandle {
    start_relay_with_settings(settings_with(key, fake))
}

pub fn start_relay_with_settings(settings: RelaySettings) -> ProxyHandle {
    StandardProxyService::new(([127, 0, 0, 1], 0), settings)
        .start()
        .expect("relay should bind")
}

/// Key followed by the request header
pub fn handshake(key: &KeyMaterial, command: Command, target: impl Into<Address>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    HandshakeHeader::new(command, target)
        .encode(key, &mut buf)
        .expect("header should encode");
    buf.to_vec()
}

/// TCP echo server on loopback, one task per connection
pub async fn tcp_echo_server() -> SocketAddr {
    tcp_echo_server_at("127.0.0.1:0".parse().unwrap()).await
}

/// TCP echo server bound to `addr`
pub async fn tcp_echo_server_at(addr: SocketAddr) -> SocketAddr {
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// UDP echo server
pub async fn udp_echo_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            if socket.send_to(&buf[..n], from).await.is_err() {
                break;
            }
        }
    });
    addr
}

/// An address with nothing listening on it
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Read exactly `len` bytes within [`WAIT`]
pub async fn read_n(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    buf
}

/// Whether the peer closed the stream within [`WAIT`]
///
/// EOF and a reset both count as closed.
pub async fn closed_by_peer(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match tokio::time::timeout(WAIT, stream.read(&mut buf)).await {
            Err(_) => return false,
            Ok(Ok(0)) | Ok(Err(_)) => return true,
            Ok(Ok(_)) => continue,
        }
    }
}
