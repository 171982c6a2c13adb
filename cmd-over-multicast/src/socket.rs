//! Datagram transport abstraction.
//!
//! [`Transport`] is the seam between the protocol and the network: byte
//! datagrams in, byte datagrams out, no guarantees.  [`UdpTransport`] is the
//! real implementation, a thin wrapper around `tokio::net::UdpSocket` that can
//! also join a multicast group.  All protocol logic lives elsewhere; this
//! module owns only byte I/O.

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;

/// Maximum UDP payload size (theoretical limit; commands are far smaller).
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    /// A group operation was given a unicast address.
    #[error("{0} is not a multicast address")]
    NotMulticast(IpAddr),
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Unreliable datagram delivery: may lose, duplicate or reorder.
///
/// Methods take `&self` so one transport can serve a receive loop and its
/// senders at the same time.
pub trait Transport: Send + Sync + 'static {
    /// Send one datagram to `dest`.
    fn send_to(
        &self,
        datagram: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the next datagram.  Returns `(bytes, source_address)`.
    fn recv_from(
        &self,
    ) -> impl Future<Output = Result<(Vec<u8>, SocketAddr), TransportError>> + Send;

    /// Address this transport is bound to.
    fn local_addr(&self) -> SocketAddr;
}

impl<T: Transport> Transport for Arc<T> {
    fn send_to(
        &self,
        datagram: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).send_to(datagram, dest)
    }

    fn recv_from(
        &self,
    ) -> impl Future<Output = Result<(Vec<u8>, SocketAddr), TransportError>> + Send {
        (**self).recv_from()
    }

    fn local_addr(&self) -> SocketAddr {
        (**self).local_addr()
    }
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

/// An async UDP socket, optionally a member of a multicast group.
#[derive(Debug)]
pub struct UdpTransport {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    local_addr: SocketAddr,
    inner: UdpSocket,
}

impl UdpTransport {
    /// Bind a plain unicast socket to `local_addr`.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        Self::from_tokio(inner)
    }

    /// Bind `port` on the wildcard address and join `group`.
    ///
    /// `interface` is the IPv6 interface index (0 = OS default); it is
    /// ignored for IPv4 groups, which join on the default interface.  The
    /// port is opened with `SO_REUSEADDR` so several receivers on one host
    /// can share it.
    pub async fn join_group(
        group: IpAddr,
        port: u16,
        interface: u32,
    ) -> Result<Self, TransportError> {
        if !group.is_multicast() {
            return Err(TransportError::NotMulticast(group));
        }

        let socket = new_udp_socket(group)?;
        socket.set_reuse_address(true)?;
        let wildcard = match group {
            IpAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port),
            IpAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), port),
        };
        socket.bind(&SockAddr::from(wildcard))?;

        match group {
            IpAddr::V4(v4) => socket.join_multicast_v4(&v4, &Ipv4Addr::UNSPECIFIED)?,
            IpAddr::V6(v6) => socket.join_multicast_v6(&v6, interface)?,
        }
        log::info!("joined multicast group {group} on port {port}");

        Self::from_socket2(socket)
    }

    /// Bind an ephemeral socket suitable for sending to `group`.
    ///
    /// `hops` is the multicast TTL (IPv4) or hop limit (IPv6).  Loopback is
    /// enabled so a receiver on the same host sees the traffic.
    pub async fn multicast_sender(
        group: IpAddr,
        hops: u32,
        interface: u32,
    ) -> Result<Self, TransportError> {
        if !group.is_multicast() {
            return Err(TransportError::NotMulticast(group));
        }

        let socket = new_udp_socket(group)?;
        let local = match group {
            IpAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
            IpAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
        };
        socket.bind(&SockAddr::from(local))?;

        match group {
            IpAddr::V4(_) => {
                socket.set_multicast_ttl_v4(hops)?;
                socket.set_multicast_loop_v4(true)?;
            }
            IpAddr::V6(_) => {
                socket.set_multicast_hops_v6(hops)?;
                socket.set_multicast_loop_v6(true)?;
                socket.set_multicast_if_v6(interface)?;
            }
        }

        Self::from_socket2(socket)
    }

    fn from_socket2(socket: Socket) -> Result<Self, TransportError> {
        socket.set_nonblocking(true)?;
        let inner = UdpSocket::from_std(socket.into())?;
        Self::from_tokio(inner)
    }

    fn from_tokio(inner: UdpSocket) -> Result<Self, TransportError> {
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.inner.send_to(datagram, dest).await?;
        Ok(())
    }

    /// Datagrams are returned as-is; decoding is the caller's job.
    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn new_udp_socket(group: IpAddr) -> io::Result<Socket> {
    let domain = match group {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };
    Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
}
