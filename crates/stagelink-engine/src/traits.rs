//! Operator trait definitions

use async_trait::async_trait;
use std::sync::Arc;

use crate::dirty::DirtySignal;

/// Whether an output's last frame made it onto the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Nothing sent yet
    #[default]
    Idle,
    /// Last frame sent without error
    Connected,
    /// Last frame had at least one failed send
    Degraded,
}

/// A receiving operator, pulled once per evaluation tick
#[async_trait]
pub trait Input: Send {
    type Config: Send + Sync;
    type Output: Send;

    /// Apply `config` (rebinding or re-joining as needed), evict stale
    /// entries and return the composed current state
    async fn pull(&mut self, config: &Self::Config) -> Self::Output;

    /// Raised whenever received data or evictions change the result of `pull`
    fn dirty(&self) -> &Arc<DirtySignal>;

    /// Check if the receive loop is running
    fn is_running(&self) -> bool;

    /// Stop receiving and release the socket
    async fn stop(&mut self);
}

/// A sending operator, pushed once per evaluation tick
#[async_trait]
pub trait Output: Send {
    type Config: Send + Sync;
    type Frame: ?Sized + Sync;

    /// Wait for the next send slot, then transmit `frame`
    async fn send(&mut self, config: &Self::Config, frame: &Self::Frame);

    fn connectivity(&self) -> Connectivity;

    /// Release the socket, sending any protocol goodbyes first
    async fn close(&mut self);
}
