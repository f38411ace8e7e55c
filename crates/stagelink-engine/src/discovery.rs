//! sACN universe discovery listener
//!
//! Sources announce the universes they transmit on 239.255.250.214 every
//! 10 seconds, possibly split across several pages. The directory merges
//! pages per source (keyed by CID) and forgets sources that stop announcing.

use async_trait::async_trait;
use dashmap::DashMap;
use stagelink_core::sacn::{DiscoveryPacket, Packet, DISCOVERY_GROUP};
use stagelink_core::DecodeError;
use stagelink_transport::MulticastSubscriptions;
use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{secs, SacnDiscoveryConfig};
use crate::dirty::DirtySignal;
use crate::input::{Ingested, Listener, ListenerState};
use crate::status::{StatusReporter, StatusSink};
use crate::traits::Input;

/// One announcing source, as presented to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub cid: [u8; 16],
    pub name: String,
    pub address: SocketAddr,
    /// Sorted, deduplicated across all pages
    pub universes: Vec<u16>,
}

#[derive(Debug)]
struct SourceRecord {
    name: String,
    address: SocketAddr,
    last_page: u8,
    pages: BTreeMap<u8, Vec<u16>>,
    last_seen: Instant,
}

/// Sources seen on the discovery universe
#[derive(Debug)]
pub struct SourceDirectory {
    sources: DashMap<[u8; 16], SourceRecord>,
    dirty: Arc<DirtySignal>,
}

impl SourceDirectory {
    pub fn new(dirty: Arc<DirtySignal>) -> Self {
        Self {
            sources: DashMap::new(),
            dirty,
        }
    }

    pub fn dirty(&self) -> &Arc<DirtySignal> {
        &self.dirty
    }

    pub fn announce(&self, packet: DiscoveryPacket, address: SocketAddr) {
        self.announce_at(packet, address, Instant::now());
    }

    /// Record one discovery page received at `now`
    pub fn announce_at(&self, packet: DiscoveryPacket, address: SocketAddr, now: Instant) {
        let name = packet.source_name.as_str().into_owned();
        let mut record = self.sources.entry(packet.cid).or_insert_with(|| SourceRecord {
            name: name.clone(),
            address,
            last_page: packet.last_page,
            pages: BTreeMap::new(),
            last_seen: now,
        });

        // A different page count means the source's universe list changed shape
        if record.last_page != packet.last_page {
            record.pages.clear();
            record.last_page = packet.last_page;
        }
        record.pages.retain(|&page, _| page <= packet.last_page);
        record.pages.insert(packet.page, packet.universes);
        record.name = name;
        record.address = address;
        record.last_seen = now;
        drop(record);

        self.dirty.raise();
    }

    /// Forget sources not heard from within `timeout`
    pub fn expire_at(&self, timeout: Duration, now: Instant) -> usize {
        let before = self.sources.len();
        self.sources
            .retain(|_, record| now.saturating_duration_since(record.last_seen) <= timeout);
        let removed = before.saturating_sub(self.sources.len());
        if removed > 0 {
            self.dirty.raise();
        }
        removed
    }

    /// Every known source, ordered by name then CID
    pub fn sources(&self) -> Vec<SourceInfo> {
        let mut sources: Vec<SourceInfo> = self
            .sources
            .iter()
            .map(|entry| {
                let universes: BTreeSet<u16> = entry.pages.values().flatten().copied().collect();
                SourceInfo {
                    cid: *entry.key(),
                    name: entry.name.clone(),
                    address: entry.address,
                    universes: universes.into_iter().collect(),
                }
            })
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name).then(a.cid.cmp(&b.cid)));
        sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Apply one datagram from the discovery port to `directory`
pub fn ingest(directory: &SourceDirectory, datagram: &[u8], from: SocketAddr) -> Result<Ingested, DecodeError> {
    match Packet::decode(datagram)? {
        Packet::Discovery(packet) => {
            directory.announce(packet, from);
            Ok(Ingested::Info)
        }
        _ => Ok(Ingested::Ignored),
    }
}

/// Listens for universe discovery announcements
pub struct SacnDiscovery {
    listener: Listener,
    directory: Arc<SourceDirectory>,
    status: StatusReporter,
    subscriptions: MulticastSubscriptions,
}

impl SacnDiscovery {
    pub fn new(status: Arc<dyn StatusSink>) -> Self {
        Self {
            listener: Listener::new(),
            directory: Arc::new(SourceDirectory::new(Arc::new(DirtySignal::new()))),
            status: StatusReporter::new("sacn-discovery", status),
            subscriptions: MulticastSubscriptions::new(Ipv4Addr::UNSPECIFIED),
        }
    }

    pub fn directory(&self) -> &Arc<SourceDirectory> {
        &self.directory
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Input for SacnDiscovery {
    type Config = SacnDiscoveryConfig;
    type Output = Vec<SourceInfo>;

    async fn pull(&mut self, config: &SacnDiscoveryConfig) -> Vec<SourceInfo> {
        let addr = match config.validate().and_then(|_| config.bind_addr()) {
            Ok(addr) => addr,
            Err(e) => {
                self.status.warn(format!("Invalid configuration: {}", e));
                return Vec::new();
            }
        };

        let directory = self.directory.clone();
        let handler = move || {
            Arc::new(move |datagram: &[u8], from: SocketAddr| {
                if let Err(e) = ingest(&directory, datagram, from) {
                    debug!("Dropped sACN datagram from {}: {}", from, e);
                }
            })
        };

        if let ListenerState::Running { fresh } = self.listener.ensure(addr, handler, &mut self.status).await {
            if fresh {
                self.subscriptions = MulticastSubscriptions::new(*addr.ip());
            }
            if let Some(socket) = self.listener.socket() {
                let wanted = BTreeSet::from([DISCOVERY_GROUP]);
                let report = self.subscriptions.reconcile_groups(socket.as_ref(), &wanted);
                if !report.failed.is_empty() {
                    self.status
                        .warn(format!("Could not join discovery group {}", DISCOVERY_GROUP));
                }
            }
        }

        if let Some(timeout) = secs(config.timeout_secs) {
            self.directory.expire_at(timeout, Instant::now());
        }
        self.directory.sources()
    }

    fn dirty(&self) -> &Arc<DirtySignal> {
        self.directory.dirty()
    }

    fn is_running(&self) -> bool {
        self.listener.is_running()
    }

    async fn stop(&mut self) {
        if let Some(socket) = self.listener.socket() {
            self.subscriptions.leave_all(socket.as_ref());
        }
        self.subscriptions.clear();
        self.listener.stop().await;
    }
}
