//! Common test helpers for StageLink tests
//!
//! - UDP port allocation on loopback
//! - Condition-based waiting (no hardcoded sleeps)
//! - A loopback sender for feeding datagrams into receive loops

use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available UDP port on loopback
pub fn find_available_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

/// Loopback socket address for `port`
pub fn loopback(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for a synchronous predicate
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    wait_for(|| std::future::ready(check()), DEFAULT_CHECK_INTERVAL, max_wait).await
}

/// Wait for a boolean flag to become true
pub async fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_until(|| flag.load(Ordering::SeqCst), max_wait).await
}

/// Wait for a counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU64, target: u64, max_wait: Duration) -> bool {
    wait_until(|| counter.load(Ordering::SeqCst) >= target, max_wait).await
}

// ============================================================================
// Datagram Sender
// ============================================================================

/// Unconnected loopback socket for pushing raw datagrams at a receiver
pub struct TestSender {
    socket: UdpSocket,
}

impl TestSender {
    pub async fn new() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self { socket }
    }

    pub async fn send(&self, data: &[u8], port: u16) {
        self.socket.send_to(data, loopback(port)).await.unwrap();
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }
}

/// Loopback socket that collects datagrams sent to it
pub struct TestReceiver {
    socket: UdpSocket,
}

impl TestReceiver {
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self { socket }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Next datagram, or `None` after `max_wait`
    pub async fn recv(&self, max_wait: Duration) -> Option<Bytes> {
        let mut buf = vec![0u8; 65536];
        match tokio::time::timeout(max_wait, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(Bytes::copy_from_slice(&buf[..len])),
            _ => None,
        }
    }

    /// Collect datagrams until `count` arrived or `max_wait` elapsed
    pub async fn recv_many(&self, count: usize, max_wait: Duration) -> Vec<Bytes> {
        let deadline = Instant::now() + max_wait;
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.recv(left).await {
                Some(datagram) => out.push(datagram),
                None => break,
            }
        }
        out
    }
}
