//! Background UDP receive loop
//!
//! ```text
//!   start()                      stop()
//! Stopped ──► Starting ──► Running ──► Stopping ──► Stopped
//!                │                                  ▲
//!                └──── bind failed ─────────────────┘
//! ```
//!
//! One tokio task per loop awaits `recv_from` and hands every datagram to a
//! [`DatagramHandler`] before receiving the next one. Stopping signals the
//! task over a shutdown channel, which wakes the pending receive, then waits
//! a bounded time for the task to finish and aborts it if it does not.

use parking_lot::Mutex;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::socket::{bind_udp, SocketOptions};

/// Largest UDP payload
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Default bound on how long stop waits for the worker
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Receive loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Consumer of received datagrams.
///
/// Called on the receive task for every datagram, in arrival order. Handlers
/// decode and store synchronously; malformed input is theirs to drop.
pub trait DatagramHandler: Send + Sync + 'static {
    fn handle(&self, datagram: &[u8], from: SocketAddr);
}

impl<F> DatagramHandler for F
where
    F: Fn(&[u8], SocketAddr) + Send + Sync + 'static,
{
    fn handle(&self, datagram: &[u8], from: SocketAddr) {
        self(datagram, from)
    }
}

/// Receive loop configuration
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    /// Local address and port to bind
    pub bind: SocketAddrV4,
    /// Socket options applied before bind
    pub socket: SocketOptions,
    /// Receive buffer length
    pub max_datagram: usize,
    /// How long stop waits for the worker before abandoning it
    pub stop_timeout: Duration,
}

impl ReceiveConfig {
    pub fn new(bind: SocketAddrV4) -> Self {
        Self {
            bind,
            socket: SocketOptions::default(),
            max_datagram: MAX_DATAGRAM_SIZE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// A UDP socket plus the task draining it
pub struct ReceiveLoop {
    state: Arc<Mutex<LoopState>>,
    socket: Option<Arc<UdpSocket>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

impl Default for ReceiveLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveLoop {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopState::Stopped)),
            socket: None,
            shutdown_tx: None,
            task: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// The bound socket while running, for multicast membership changes
    pub fn socket(&self) -> Option<&Arc<UdpSocket>> {
        if self.is_running() {
            self.socket.as_ref()
        } else {
            None
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket().and_then(|s| s.local_addr().ok())
    }

    /// Drop the task and socket left behind by a loop that ended on a receive error
    fn release_dead_loop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shutdown_tx = None;
        self.socket = None;
    }

    /// Bind and spawn the receive task. A no-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<H: DatagramHandler>(&mut self, config: &ReceiveConfig, handler: Arc<H>) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                LoopState::Running | LoopState::Starting => return Ok(()),
                _ => *state = LoopState::Starting,
            }
        }
        self.release_dead_loop();

        let socket = match bind_udp(config.bind, &config.socket) {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                *self.state.lock() = LoopState::Stopped;
                return Err(e);
            }
        };

        let local = socket.local_addr().ok();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task_socket = socket.clone();
        let state = self.state.clone();
        let max_datagram = config.max_datagram.max(1);

        *self.state.lock() = LoopState::Running;

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; max_datagram];

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Receive loop shutdown requested");
                        break;
                    }
                    result = task_socket.recv_from(&mut buf) => {
                        match result {
                            Ok((len, from)) => handler.handle(&buf[..len], from),
                            Err(e) if is_transient(&e) => {
                                debug!("Transient receive error: {}", e);
                            }
                            Err(e) => {
                                error!("Receive error, stopping loop: {}", e);
                                let mut state = state.lock();
                                if *state == LoopState::Running {
                                    *state = LoopState::Stopped;
                                }
                                break;
                            }
                        }
                    }
                }
            }
        });

        self.socket = Some(socket);
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        self.stop_timeout = config.stop_timeout;

        match local {
            Some(addr) => info!("Receive loop listening on {}", addr),
            None => info!("Receive loop listening on {}", config.bind),
        }
        Ok(())
    }

    /// Signal the task, wait up to the stop timeout, then release the socket
    pub async fn stop(&mut self) {
        if self.state() == LoopState::Stopped {
            self.release_dead_loop();
            return;
        }
        let Some(mut task) = self.task.take() else {
            *self.state.lock() = LoopState::Stopped;
            self.socket = None;
            return;
        };

        *self.state.lock() = LoopState::Stopping;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }

        if tokio::time::timeout(self.stop_timeout, &mut task).await.is_err() {
            warn!("Receive task did not stop within {:?}, abandoning it", self.stop_timeout);
            task.abort();
        }

        self.socket = None;
        *self.state.lock() = LoopState::Stopped;
        debug!("Receive loop stopped");
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Errors that do not mean the socket is unusable
fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        // Windows reports ICMP port unreachable on the next receive
        ErrorKind::ConnectionReset | ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}
