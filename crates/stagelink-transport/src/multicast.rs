//! Multicast group membership for sACN receivers
//!
//! Each sACN universe has its own group `239.255.hi.lo`. A receiver asked
//! for `[start, start + count)` must be a member of exactly those groups;
//! [`MulticastSubscriptions::reconcile`] diffs the wanted set against what
//! is currently joined and only touches the socket for the difference, so
//! calling it every tick with an unchanged range costs nothing.

use stagelink_core::sacn::universe_group;
use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Socket-level join/leave, abstracted for testing
pub trait MulticastMembership {
    fn join(&self, group: Ipv4Addr, interface: Ipv4Addr) -> std::io::Result<()>;
    fn leave(&self, group: Ipv4Addr, interface: Ipv4Addr) -> std::io::Result<()>;
}

impl MulticastMembership for UdpSocket {
    fn join(&self, group: Ipv4Addr, interface: Ipv4Addr) -> std::io::Result<()> {
        self.join_multicast_v4(group, interface)
    }

    fn leave(&self, group: Ipv4Addr, interface: Ipv4Addr) -> std::io::Result<()> {
        self.leave_multicast_v4(group, interface)
    }
}

impl<T: MulticastMembership + ?Sized> MulticastMembership for Arc<T> {
    fn join(&self, group: Ipv4Addr, interface: Ipv4Addr) -> std::io::Result<()> {
        (**self).join(group, interface)
    }

    fn leave(&self, group: Ipv4Addr, interface: Ipv4Addr) -> std::io::Result<()> {
        (**self).leave(group, interface)
    }
}

/// What a reconcile pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub joined: Vec<Ipv4Addr>,
    pub left: Vec<Ipv4Addr>,
    /// Groups whose join failed; they stay unjoined and are retried next pass
    pub failed: Vec<Ipv4Addr>,
}

impl ReconcileReport {
    /// True when the pass performed no socket operations
    pub fn is_noop(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty() && self.failed.is_empty()
    }
}

/// Groups for sACN universes `[start, start + count)`, clipped to the valid universe range
pub fn universe_groups(start: u32, count: u32) -> BTreeSet<Ipv4Addr> {
    let first = start.max(1);
    let end = start.saturating_add(count).min(64000);
    (first..end).map(|u| universe_group(u as u16)).collect()
}

/// Tracks which groups a receive socket has joined
#[derive(Debug)]
pub struct MulticastSubscriptions {
    interface: Ipv4Addr,
    joined: BTreeSet<Ipv4Addr>,
    /// Groups whose join failure has already been reported
    warned: HashSet<Ipv4Addr>,
}

impl MulticastSubscriptions {
    pub fn new(interface: Ipv4Addr) -> Self {
        Self {
            interface,
            joined: BTreeSet::new(),
            warned: HashSet::new(),
        }
    }

    pub fn interface(&self) -> Ipv4Addr {
        self.interface
    }

    pub fn joined(&self) -> &BTreeSet<Ipv4Addr> {
        &self.joined
    }

    pub fn is_joined(&self, group: Ipv4Addr) -> bool {
        self.joined.contains(&group)
    }

    /// Join/leave so that membership matches universes `[start, start + count)`
    pub fn reconcile<M>(&mut self, socket: &M, start: u32, count: u32) -> ReconcileReport
    where
        M: MulticastMembership + ?Sized,
    {
        self.reconcile_groups(socket, &universe_groups(start, count))
    }

    /// Join/leave so that membership matches `wanted` exactly
    pub fn reconcile_groups<M>(&mut self, socket: &M, wanted: &BTreeSet<Ipv4Addr>) -> ReconcileReport
    where
        M: MulticastMembership + ?Sized,
    {
        let mut report = ReconcileReport::default();

        let stale: Vec<Ipv4Addr> = self.joined.difference(wanted).copied().collect();
        for group in stale {
            if let Err(e) = socket.leave(group, self.interface) {
                debug!("Leaving multicast group {} failed: {}", group, e);
            }
            self.joined.remove(&group);
            report.left.push(group);
        }

        let missing: Vec<Ipv4Addr> = wanted.difference(&self.joined).copied().collect();
        for group in missing {
            match socket.join(group, self.interface) {
                Ok(()) => {
                    self.joined.insert(group);
                    self.warned.remove(&group);
                    report.joined.push(group);
                }
                Err(e) => {
                    if self.warned.insert(group) {
                        warn!("Failed to join multicast group {} on {}: {}", group, self.interface, e);
                    } else {
                        debug!("Retrying multicast group {} failed again: {}", group, e);
                    }
                    report.failed.push(group);
                }
            }
        }

        if !report.joined.is_empty() || !report.left.is_empty() {
            info!(
                "Multicast membership: +{} -{} ({} joined)",
                report.joined.len(),
                report.left.len(),
                self.joined.len()
            );
        }

        report
    }

    /// Leave every joined group
    pub fn leave_all<M>(&mut self, socket: &M) -> ReconcileReport
    where
        M: MulticastMembership + ?Sized,
    {
        self.reconcile_groups(socket, &BTreeSet::new())
    }

    /// Forget membership without touching a socket (the socket was closed)
    pub fn clear(&mut self) {
        self.joined.clear();
        self.warned.clear();
    }
}
