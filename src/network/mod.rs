//! UDP input socket setup.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::bail;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Binds a nonblocking UDP socket for TS reception. Joins the multicast
/// group on the default interface when the address is multicast.
/// Must be called from within a tokio runtime.
pub fn create_udp_socket(addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    let IpAddr::V4(ip) = addr.ip() else {
        bail!("only IPv4 is supported");
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;

    if ip.is_multicast() {
        socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
    }

    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket.into())?)
}
