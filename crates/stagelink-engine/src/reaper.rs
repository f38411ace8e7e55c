//! Staleness eviction

use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::secs;
use crate::store::Store;

/// Removes store entries that have not been written within a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessReaper {
    timeout: Option<Duration>,
}

impl StalenessReaper {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Timeout in seconds; <= 0 disables eviction
    pub fn from_secs(timeout: f64) -> Self {
        Self::new(secs(timeout))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn sweep<V: Clone + Default>(&self, store: &Store<V>) -> usize {
        self.sweep_at(store, Instant::now())
    }

    /// Sweep as if the current time were `now`
    pub fn sweep_at<V: Clone + Default>(&self, store: &Store<V>, now: Instant) -> usize {
        let Some(timeout) = self.timeout else {
            return 0;
        };
        let removed = store.evict_older_than(timeout, now);
        if removed > 0 {
            debug!("Evicted {} stale entries (timeout {:?})", removed, timeout);
        }
        removed
    }
}
