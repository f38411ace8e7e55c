//! Frame-rate pacing for outbound traffic
//!
//! A pacer keeps a deadline schedule at `1 / rate` intervals. Waiting sleeps
//! on the tokio timer until about a millisecond before the deadline and
//! yields for the remainder, which keeps frame spacing tight without parking
//! a worker thread.

use std::time::Duration;
use tokio::time::Instant;

/// Below this the timer is too coarse to trust
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// Longest gap between frames; slower rates are clamped to it
pub const MAX_PERIOD: Duration = Duration::from_secs(3600);

/// Deadline-based send pacer
#[derive(Debug, Clone)]
pub struct TransmitPacer {
    rate: f64,
    period: Option<Duration>,
    next_deadline: Option<Instant>,
}

impl TransmitPacer {
    /// A pacer for `rate` frames per second; zero, negative or non-finite disables pacing
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            period: period_for(rate),
            next_deadline: None,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn is_enabled(&self) -> bool {
        self.period.is_some()
    }

    /// Change the rate, restarting the schedule if it differs
    pub fn set_rate(&mut self, rate: f64) {
        if rate != self.rate {
            self.rate = rate;
            self.period = period_for(rate);
            self.next_deadline = None;
        }
    }

    /// Forget the schedule; the next wait returns immediately
    pub fn reset(&mut self) {
        self.next_deadline = None;
    }

    /// Claim the next slot relative to `now` and return when it starts.
    ///
    /// The first call, and any call arriving more than one period late,
    /// re-anchors the schedule at `now` so a stalled sender does not burst
    /// to catch up.
    pub fn schedule(&mut self, now: Instant) -> Option<Instant> {
        let period = self.period?;
        let deadline = match self.next_deadline {
            Some(deadline) if now.saturating_duration_since(deadline) <= period => deadline,
            _ => now,
        };
        self.next_deadline = deadline.checked_add(period);
        Some(deadline)
    }

    /// Wait for the next send slot
    pub async fn wait(&mut self) {
        let Some(deadline) = self.schedule(Instant::now()) else {
            return;
        };

        let now = Instant::now();
        if deadline <= now {
            return;
        }
        if deadline - now > SPIN_THRESHOLD {
            tokio::time::sleep_until(deadline - SPIN_THRESHOLD).await;
        }
        while Instant::now() < deadline {
            tokio::task::yield_now().await;
        }
    }
}

fn period_for(rate: f64) -> Option<Duration> {
    if rate.is_finite() && rate > 0.0 {
        let period = Duration::try_from_secs_f64(1.0 / rate).unwrap_or(MAX_PERIOD);
        Some(period.min(MAX_PERIOD))
    } else {
        None
    }
}
