//! UDP socket setup
//!
//! Sockets are built with socket2 so address reuse, broadcast and the
//! multicast membership can be set before binding, then handed to tokio.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};
use tokio::net::UdpSocket;

use crate::error::NetworkError;

fn new_socket(recv_buffer_size: usize) -> Result<Socket, NetworkError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_broadcast(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
        tracing::warn!("Failed to set receive buffer size: {}", e);
    }

    socket
        .set_nonblocking(true)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    Ok(socket)
}

fn into_tokio(socket: Socket, addr: SocketAddrV4) -> Result<UdpSocket, NetworkError> {
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    let std_socket: StdUdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(|e| NetworkError::BindFailed(e.to_string()))
}

/// Socket bound to the device's own address; only unicast datagrams reach it
pub fn create_unicast_socket(
    local_ip: Ipv4Addr,
    port: u16,
    recv_buffer_size: usize,
) -> Result<UdpSocket, NetworkError> {
    let socket = new_socket(recv_buffer_size)?;
    into_tokio(socket, SocketAddrV4::new(local_ip, port))
}

/// Wildcard socket joined to `group`; receives broadcast and multicast
pub fn create_group_socket(
    port: u16,
    group: Ipv4Addr,
    interface: Ipv4Addr,
    recv_buffer_size: usize,
) -> Result<UdpSocket, NetworkError> {
    let socket = new_socket(recv_buffer_size)?;

    socket
        .join_multicast_v4(&group, &interface)
        .map_err(|e| NetworkError::BindFailed(format!("join {}: {}", group, e)))?;

    // Our own announcements are not interesting
    if let Err(e) = socket.set_multicast_loop_v4(false) {
        tracing::debug!("Failed to disable multicast loop: {}", e);
    }

    into_tokio(socket, SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
}

/// Address of the interface the default route leaves through.
/// Nothing is sent; connecting a UDP socket only selects a route.
pub fn detect_local_ipv4(route_target: Ipv4Addr) -> Option<Ipv4Addr> {
    let socket = StdUdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(SocketAddrV4::new(route_target, 9)).ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(addr) if !addr.ip().is_unspecified() => Some(*addr.ip()),
        _ => None,
    }
}
