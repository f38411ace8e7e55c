//! Edge-triggered "new data" signal between receive tasks and the puller
//!
//! Writers bump a generation counter; a reader remembers the last
//! generation it saw. Any number of raises between two checks collapse into
//! a single "changed".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct DirtySignal {
    generation: AtomicU64,
}

impl DirtySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Reader side of a [`DirtySignal`]
#[derive(Debug, Clone)]
pub struct DirtyWatch {
    signal: Arc<DirtySignal>,
    seen: u64,
}

impl DirtyWatch {
    /// Start watching; raises before this point are not reported
    pub fn new(signal: Arc<DirtySignal>) -> Self {
        let seen = signal.generation();
        Self { signal, seen }
    }

    /// Whether the signal was raised since the last [`DirtyWatch::take`]
    pub fn is_dirty(&self) -> bool {
        self.signal.generation() != self.seen
    }

    /// Consume the pending change, if any
    pub fn take(&mut self) -> bool {
        let current = self.signal.generation();
        let changed = current != self.seen;
        self.seen = current;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raises_collapse() {
        let signal = Arc::new(DirtySignal::new());
        let mut watch = DirtyWatch::new(signal.clone());
        assert!(!watch.take());

        signal.raise();
        signal.raise();
        signal.raise();
        assert!(watch.is_dirty());
        assert!(watch.take());
        assert!(!watch.take());
    }

    #[test]
    fn test_watchers_are_independent() {
        let signal = Arc::new(DirtySignal::new());
        let mut a = DirtyWatch::new(signal.clone());
        let mut b = DirtyWatch::new(signal.clone());

        signal.raise();
        assert!(a.take());
        assert!(b.is_dirty());
        assert!(b.take());
    }
}
