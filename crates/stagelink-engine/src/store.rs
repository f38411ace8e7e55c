//! Per-id live state shared between a receive task and the puller
//!
//! The map itself is a `DashMap`, but each entry also has its own mutex so
//! that copying one universe never waits on a write to another, and a
//! writer holds only the lock of the id it is updating.

use dashmap::DashMap;
use parking_lot::Mutex;
use stagelink_core::psn::TrackerPose;
use stagelink_core::ChannelFrame;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dirty::DirtySignal;

/// One id's value and when it was last written
#[derive(Debug, Clone)]
pub struct Entry<V> {
    pub value: V,
    pub last_seen: Instant,
}

/// Concurrent id -> entry map that raises a dirty signal on every change
#[derive(Debug)]
pub struct Store<V> {
    entries: DashMap<u16, Arc<Mutex<Entry<V>>>>,
    dirty: Arc<DirtySignal>,
}

/// DMX universes
pub type UniverseStore = Store<ChannelFrame>;

/// PSN trackers
pub type TrackerStore = Store<TrackerPose>;

impl<V: Clone + Default> Store<V> {
    pub fn new(dirty: Arc<DirtySignal>) -> Self {
        Self {
            entries: DashMap::new(),
            dirty,
        }
    }

    pub fn dirty(&self) -> &Arc<DirtySignal> {
        &self.dirty
    }

    /// Create or update the entry for `id` in place
    pub fn update<F>(&self, id: u16, f: F)
    where
        F: FnOnce(&mut V),
    {
        self.update_at(id, Instant::now(), f)
    }

    pub fn update_at<F>(&self, id: u16, now: Instant, f: F)
    where
        F: FnOnce(&mut V),
    {
        let entry = self
            .entries
            .entry(id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Entry {
                    value: V::default(),
                    last_seen: now,
                }))
            })
            .clone();

        {
            let mut entry = entry.lock();
            f(&mut entry.value);
            entry.last_seen = now;
        }
        self.dirty.raise();
    }

    /// Copy of the value for `id`
    pub fn get(&self, id: u16) -> Option<V> {
        let entry = self.entries.get(&id)?.value().clone();
        let value = entry.lock().value.clone();
        Some(value)
    }

    pub fn last_seen(&self, id: u16) -> Option<Instant> {
        let entry = self.entries.get(&id)?.value().clone();
        let last_seen = entry.lock().last_seen;
        Some(last_seen)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.entries.contains_key(&id)
    }

    /// Remove `id`; returns whether it was present
    pub fn remove(&self, id: u16) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            self.dirty.raise();
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty.raise();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids currently present, ascending
    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Remove entries not written for longer than `timeout`; returns how many went
    pub(crate) fn evict_older_than(&self, timeout: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.lock().last_seen) <= timeout);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.dirty.raise();
        }
        removed
    }
}
