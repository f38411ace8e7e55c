//! Sending operators
//!
//! An output owns one [`OutboundSession`]: a bound socket, its sequence
//! counter and its pacer. Each `send` waits for the pacer, encodes the
//! frame and fires every datagram. Failed sends downgrade
//! [`Connectivity`] but never stop the output.

#[cfg(feature = "artnet")]
pub mod artnet;

#[cfg(feature = "sacn")]
pub mod sacn;

#[cfg(feature = "psn")]
pub mod psn;

use bytes::Bytes;
use stagelink_core::{SequenceCounter, WrapRule};
use stagelink_transport::{bind_udp, SocketOptions, TransmitPacer};
use std::net::{SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::status::StatusReporter;
use crate::traits::Connectivity;

/// Minimum time between attempts to open a socket that failed
const REOPEN_INTERVAL: Duration = Duration::from_secs(1);

/// Result of sending one frame's datagrams
#[derive(Debug, Default)]
pub(crate) struct SendReport {
    pub sent: usize,
    pub failures: Vec<EngineError>,
}

/// Socket, sequence and pacing state owned by one output
#[derive(Debug)]
pub(crate) struct OutboundSession {
    socket: UdpSocket,
    local: SocketAddrV4,
    broadcast: bool,
    pub sequence: SequenceCounter,
    pub pacer: TransmitPacer,
    opened: Instant,
}

impl OutboundSession {
    pub fn open(local: SocketAddrV4, broadcast: bool, rule: WrapRule) -> Result<Self> {
        let options = SocketOptions::sender().with_broadcast(broadcast);
        let socket = bind_udp(local, &options)?;
        Ok(Self {
            socket,
            local,
            broadcast,
            sequence: SequenceCounter::new(rule),
            pacer: TransmitPacer::new(0.0),
            opened: Instant::now(),
        })
    }

    /// Whether this session was opened with the same socket settings
    pub fn matches(&self, local: SocketAddrV4, broadcast: bool) -> bool {
        self.local == local && self.broadcast == broadcast
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Apply `rate` and wait for the next send slot
    pub async fn pace(&mut self, rate: f64) {
        self.pacer.set_rate(rate);
        self.pacer.wait().await;
    }

    /// Microseconds since the session was opened
    pub fn elapsed_micros(&self) -> u64 {
        self.opened.elapsed().as_micros() as u64
    }

    /// Send every datagram, continuing past failures
    pub async fn send_all(&self, datagrams: &[(Bytes, SocketAddr)]) -> SendReport {
        let mut report = SendReport::default();
        for (bytes, target) in datagrams {
            match self.socket.send_to(bytes, target).await {
                Ok(_) => report.sent += 1,
                Err(source) => {
                    debug!("Send to {} failed: {}", target, source);
                    report.failures.push(EngineError::Send {
                        target: *target,
                        source,
                    });
                }
            }
        }
        report
    }
}

/// Lazily opened session that follows the configured socket settings
#[derive(Debug, Default)]
pub(crate) struct SessionSlot {
    session: Option<OutboundSession>,
    last_failure: Option<(SocketAddrV4, Instant)>,
    connectivity: Connectivity,
}

impl SessionSlot {
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn session(&self) -> Option<&OutboundSession> {
        self.session.as_ref()
    }

    /// Return a session bound with these settings, reopening if they changed.
    ///
    /// Open failures are reported once and retried at most once per second.
    pub fn ensure(
        &mut self,
        local: SocketAddrV4,
        broadcast: bool,
        rule: WrapRule,
        status: &mut StatusReporter,
    ) -> Option<&mut OutboundSession> {
        if matches!(&self.session, Some(session) if !session.matches(local, broadcast)) {
            info!("{}: reopening socket on {}", status.operator(), local);
            self.session = None;
            self.connectivity = Connectivity::Idle;
        }

        if self.session.is_none() {
            if let Some((addr, at)) = self.last_failure {
                if addr == local && at.elapsed() < REOPEN_INTERVAL {
                    return None;
                }
            }
            match OutboundSession::open(local, broadcast, rule) {
                Ok(session) => {
                    self.last_failure = None;
                    self.session = Some(session);
                }
                Err(e) => {
                    self.last_failure = Some((local, Instant::now()));
                    self.connectivity = Connectivity::Degraded;
                    status.error(format!("Cannot open socket on {}: {}", local, e));
                    return None;
                }
            }
        }
        self.session.as_mut()
    }

    /// Fold a frame's send report into connectivity and status
    pub fn record(&mut self, report: SendReport, destination: &str, status: &mut StatusReporter) {
        if report.sent == 0 && report.failures.is_empty() {
            return;
        }
        match report.failures.first() {
            None => {
                self.connectivity = Connectivity::Connected;
                status.info(format!("Sending to {}", destination));
            }
            Some(first) => {
                self.connectivity = Connectivity::Degraded;
                status.warn(format!(
                    "{} of {} packets failed: {}",
                    report.failures.len(),
                    report.sent + report.failures.len(),
                    first
                ));
            }
        }
    }

    /// Take the session out, leaving the slot idle
    pub fn take(&mut self) -> Option<OutboundSession> {
        self.last_failure = None;
        self.connectivity = Connectivity::Idle;
        self.session.take()
    }
}
