//! UDP socket construction
//!
//! Every StageLink socket is built through socket2 so that address reuse is
//! set before bind; several receivers (or a receiver plus a lighting console
//! on the same host) commonly share 6454/5568/56565.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Local address sentinel meaning "all interfaces"
pub const ANY_ADDRESS: &str = "any";

/// Options applied before bind
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// SO_REUSEADDR (and SO_REUSEPORT where available)
    pub reuse_address: bool,
    /// SO_BROADCAST, needed for Art-Net broadcast output
    pub broadcast: bool,
    /// Receive buffer size hint
    pub recv_buffer_size: Option<usize>,
    /// Multicast TTL for outbound sockets
    pub multicast_ttl: Option<u32>,
    /// Deliver our own multicast traffic back to local listeners
    pub multicast_loop: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            reuse_address: true,
            broadcast: false,
            recv_buffer_size: Some(256 * 1024),
            multicast_ttl: None,
            multicast_loop: true,
        }
    }
}

impl SocketOptions {
    /// Defaults for a sending socket
    pub fn sender() -> Self {
        Self {
            reuse_address: false,
            recv_buffer_size: None,
            multicast_ttl: Some(16),
            ..Default::default()
        }
    }

    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }
}

/// Parse a local interface address, accepting `"any"` and the empty string
pub fn parse_local_ip(value: &str) -> Result<Ipv4Addr> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(ANY_ADDRESS) {
        return Ok(Ipv4Addr::UNSPECIFIED);
    }
    parse_ipv4(value)
}

/// Parse a dotted-quad IPv4 address
pub fn parse_ipv4(value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| TransportError::InvalidAddress(value.to_string()))
}

/// Create a non-blocking UDP socket bound to `addr` and register it with tokio.
///
/// Must be called from within a tokio runtime.
pub fn bind_udp(addr: SocketAddrV4, options: &SocketOptions) -> Result<UdpSocket> {
    let bind_err = |source: std::io::Error| TransportError::Bind {
        addr: SocketAddr::V4(addr),
        source,
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;

    if options.reuse_address {
        socket.set_reuse_address(true).map_err(bind_err)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true).map_err(bind_err)?;
    }
    if options.broadcast {
        socket.set_broadcast(true).map_err(bind_err)?;
    }
    if let Some(size) = options.recv_buffer_size {
        // Best effort; the OS may clamp or refuse the size
        if let Err(e) = socket.set_recv_buffer_size(size) {
            debug!("Could not set receive buffer to {} bytes: {}", size, e);
        }
    }
    if let Some(ttl) = options.multicast_ttl {
        socket.set_multicast_ttl_v4(ttl).map_err(bind_err)?;
        // Outbound multicast leaves through the bound interface
        if !addr.ip().is_unspecified() {
            socket.set_multicast_if_v4(addr.ip()).map_err(bind_err)?;
        }
    }
    socket
        .set_multicast_loop_v4(options.multicast_loop)
        .map_err(bind_err)?;

    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&SockAddr::from(addr)).map_err(bind_err)?;

    let socket = UdpSocket::from_std(socket.into()).map_err(bind_err)?;
    debug!("UDP bound to {}", addr);
    Ok(socket)
}
