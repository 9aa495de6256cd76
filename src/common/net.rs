//! Network utility functions
//!
//! Socket construction and teardown helpers shared by the acceptor and the pumps.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use log::debug;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};

/// Backlog handed to `listen(2)`, same as mio's default
pub const LISTEN_BACKLOG: u32 = 1024;

/// Bind a listening TCP socket with a large backlog
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(..) => TcpSocket::new_v4()?,
        SocketAddr::V6(..) => TcpSocket::new_v6()?,
    };

    #[cfg(not(windows))]
    socket.set_reuseaddr(true)?;

    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Create an outbound UDP socket for datagrams towards `target`
///
/// The socket is bound to the unspecified address of the target's family,
/// has `SO_BROADCAST` set, and on Windows ignores `WSAECONNRESET` so an
/// ICMP port-unreachable does not abort subsequent receives.
pub fn create_udp_socket(target: &SocketAddr) -> io::Result<UdpSocket> {
    let (domain, bind_addr) = match target {
        SocketAddr::V4(..) => (Domain::IPV4, SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
        SocketAddr::V6(..) => (Domain::IPV6, SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))),
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;

    apply_udp_platform_fixes(&socket);

    socket.bind(&bind_addr.into())?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

#[cfg(windows)]
fn apply_udp_platform_fixes(socket: &Socket) {
    if let Err(err) = disable_connection_reset(socket) {
        log::warn!("failed to disable SIO_UDP_CONNRESET on udp socket: {}", err);
    }
}

#[cfg(not(windows))]
fn apply_udp_platform_fixes(_socket: &Socket) {}

#[cfg(windows)]
fn disable_connection_reset(socket: &Socket) -> io::Result<()> {
    use std::os::windows::io::AsRawSocket;
    use std::{mem, ptr};
    use windows_sys::Win32::Networking::WinSock::{
        WSAGetLastError, WSAIoctl, SIO_UDP_CONNRESET, SOCKET, SOCKET_ERROR,
    };

    let handle = socket.as_raw_socket() as SOCKET;
    let mut bytes_returned: u32 = 0;
    let enable: i32 = 0;

    let ret = unsafe {
        WSAIoctl(
            handle,
            SIO_UDP_CONNRESET,
            &enable as *const _ as *const std::ffi::c_void,
            mem::size_of_val(&enable) as u32,
            ptr::null_mut(),
            0,
            &mut bytes_returned as *mut _,
            ptr::null_mut(),
            None,
        )
    };

    if ret == SOCKET_ERROR {
        let err_code = unsafe { WSAGetLastError() };
        return Err(io::Error::from_raw_os_error(err_code));
    }

    Ok(())
}

/// Shut down a TCP stream, ignoring errors from an already closed peer
pub async fn safe_shutdown(stream: &mut TcpStream) {
    if let Err(err) = stream.shutdown().await {
        match err.kind() {
            io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {}
            _ => debug!("shutdown failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_udp_socket_matches_family() {
        let v4 = create_udp_socket(&"127.0.0.1:53".parse().unwrap()).unwrap();
        assert!(v4.local_addr().unwrap().is_ipv4());
        assert!(v4.broadcast().unwrap());
    }

    #[tokio::test]
    async fn test_bind_listener_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
