//! Start and stop behaviour of the relay service

mod support;

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use veil_relay::protocol::Command;

use support::*;

#[tokio::test]
async fn test_stop_without_connections() {
    let relay = start_relay(closed_port());
    let addr = relay.local_addr();

    relay.stop().await.unwrap();
    assert!(relay.is_stopped());
    assert!(TcpStream::connect(addr).await.is_err(), "listener should be closed");

    relay.stop().await.unwrap();
    relay.clone().stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_with_active_relays() {
    let echo = tcp_echo_server().await;
    let relay = start_relay(closed_port());

    let mut clients = Vec::new();
    for _ in 0..4 {
        let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
        let mut first = handshake(&raw_key(), Command::Connect, echo);
        first.extend_from_slice(b"up");
        client.write_all(&first).await.unwrap();
        assert_eq!(read_n(&mut client, 2).await, b"up");
        clients.push(client);
    }

    // One more still in its handshake
    clients.push(TcpStream::connect(relay.local_addr()).await.unwrap());

    for _ in 0..100 {
        if relay.active_connections() == 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(relay.active_connections(), 5);

    relay.stop().await.unwrap();
    assert_eq!(relay.active_connections(), 0);

    for client in clients.iter_mut() {
        assert!(closed_by_peer(client).await, "aborted connections should be closed");
    }
}

#[tokio::test]
async fn test_concurrent_stops() {
    let relay = start_relay(closed_port());
    let other = relay.clone();

    let (a, b) = tokio::join!(relay.stop(), other.stop());
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert!(relay.is_stopped());
}

#[tokio::test]
async fn test_active_count_drops_after_close() {
    let echo = tcp_echo_server().await;
    let relay = start_relay(closed_port());

    let mut client = TcpStream::connect(relay.local_addr()).await.unwrap();
    let mut first = handshake(&raw_key(), Command::Connect, echo);
    first.extend_from_slice(b"x");
    client.write_all(&first).await.unwrap();
    assert_eq!(read_n(&mut client, 1).await, b"x");
    drop(client);

    for _ in 0..100 {
        if relay.active_connections() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(relay.active_connections(), 0);

    relay.stop().await.unwrap();
}
