//! Receiving operators
//!
//! Each input owns a store, a receive loop and its status. A pull applies
//! the tick's configuration, sweeps stale entries and composes the result:
//!
//! ```text
//! socket ──► ReceiveLoop ──► ingest() ──► Store ──► dirty
//!                                           │
//!                      pull(config) ──► reaper ──► compositor ──► caller
//! ```

#[cfg(feature = "artnet")]
pub mod artnet;

#[cfg(feature = "sacn")]
pub mod sacn;

#[cfg(feature = "psn")]
pub mod psn;

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stagelink_transport::{DatagramHandler, ReceiveConfig, ReceiveLoop};
use tokio::net::UdpSocket;
use tracing::info;

use crate::status::StatusReporter;

/// Minimum time between bind attempts on an address that failed
const REBIND_INTERVAL: Duration = Duration::from_secs(1);

/// What one datagram did to a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// A universe was written
    Universe(u16),
    /// A universe was dropped by its source
    Removed(u16),
    /// This many trackers were updated
    Trackers(usize),
    /// Names were updated
    Info,
    /// Valid packet with nothing for this input
    Ignored,
}

/// Outcome of [`Listener::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerState {
    /// Running on the requested address; `fresh` when bound during this call
    Running { fresh: bool },
    Down,
}

/// A receive loop that follows the configured bind address
pub(crate) struct Listener {
    receiver: ReceiveLoop,
    bound: Option<SocketAddrV4>,
    last_attempt: Option<(SocketAddrV4, Instant)>,
}

impl Listener {
    pub(crate) fn new() -> Self {
        Self {
            receiver: ReceiveLoop::new(),
            bound: None,
            last_attempt: None,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.receiver.is_running()
    }

    pub(crate) fn socket(&self) -> Option<&Arc<UdpSocket>> {
        self.receiver.socket()
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        if self.receiver.is_running() {
            self.receiver.local_addr()
        } else {
            None
        }
    }

    /// Make sure a loop is running on `addr`, restarting it if the address changed.
    ///
    /// Bind failures are reported once through `status` and retried at
    /// most once per second.
    pub(crate) async fn ensure<H, F>(&mut self, addr: SocketAddrV4, handler: F, status: &mut StatusReporter) -> ListenerState
    where
        H: DatagramHandler,
        F: FnOnce() -> Arc<H>,
    {
        if self.receiver.is_running() && self.bound == Some(addr) {
            return ListenerState::Running { fresh: false };
        }

        if self.bound.is_some() {
            info!("{}: rebinding to {}", status.operator(), addr);
            self.receiver.stop().await;
            self.bound = None;
        }

        if let Some((last, at)) = self.last_attempt {
            if last == addr && at.elapsed() < REBIND_INTERVAL {
                return ListenerState::Down;
            }
        }
        self.last_attempt = Some((addr, Instant::now()));

        match self.receiver.start(&ReceiveConfig::new(addr), handler()) {
            Ok(()) => {
                self.bound = Some(addr);
                self.last_attempt = None;
                let local = self.receiver.local_addr().map_or_else(|| addr.to_string(), |a| a.to_string());
                status.info(format!("Listening on {}", local));
                ListenerState::Running { fresh: true }
            }
            Err(e) => {
                status.error(format!("Cannot listen on {}: {}", addr, e));
                ListenerState::Down
            }
        }
    }

    pub(crate) async fn stop(&mut self) {
        self.receiver.stop().await;
        self.bound = None;
        self.last_attempt = None;
    }
}
