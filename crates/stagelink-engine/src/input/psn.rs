//! PosiStageNet input

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use stagelink_core::psn::{flip_z, Packet, TrackerPose, TrackerUpdate};
use stagelink_core::DecodeError;
use stagelink_transport::MulticastSubscriptions;
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

use super::{Ingested, Listener, ListenerState};
use crate::compositor::compose_trackers;
use crate::config::PsnInputConfig;
use crate::dirty::DirtySignal;
use crate::reaper::StalenessReaper;
use crate::status::{StatusReporter, StatusSink};
use crate::store::TrackerStore;
use crate::traits::Input;

/// Names announced in PSN_INFO packets
#[derive(Debug, Default)]
pub struct TrackerNames {
    system: Mutex<Option<String>>,
    trackers: DashMap<u16, String>,
}

impl TrackerNames {
    pub fn system_name(&self) -> Option<String> {
        self.system.lock().clone()
    }

    pub fn get(&self, id: u16) -> Option<String> {
        self.trackers.get(&id).map(|name| name.value().clone())
    }
}

/// Wire coordinates to scene coordinates
fn to_scene(update: &TrackerUpdate) -> TrackerUpdate {
    TrackerUpdate {
        position: update.position.map(flip_z),
        orientation: update.orientation.map(flip_z),
        ..*update
    }
}

/// Apply one PSN datagram to `store` and `names`
pub fn ingest(store: &TrackerStore, names: &TrackerNames, datagram: &[u8]) -> Result<Ingested, DecodeError> {
    match Packet::decode(datagram)? {
        Packet::Data(packet) => {
            for update in &packet.trackers {
                let update = to_scene(update);
                store.update(update.id, |pose| pose.apply(&update));
            }
            Ok(Ingested::Trackers(packet.trackers.len()))
        }
        Packet::Info(packet) => {
            *names.system.lock() = Some(packet.system_name);
            for tracker in packet.trackers {
                names.trackers.insert(tracker.id, tracker.name);
            }
            Ok(Ingested::Info)
        }
    }
}

/// Receives PSN tracker poses
pub struct PsnInput {
    listener: Listener,
    store: Arc<TrackerStore>,
    names: Arc<TrackerNames>,
    status: StatusReporter,
    subscriptions: MulticastSubscriptions,
}

impl PsnInput {
    pub fn new(status: Arc<dyn StatusSink>) -> Self {
        Self {
            listener: Listener::new(),
            store: Arc::new(TrackerStore::new(Arc::new(DirtySignal::new()))),
            names: Arc::new(TrackerNames::default()),
            status: StatusReporter::new("psn-in", status),
            subscriptions: MulticastSubscriptions::new(Ipv4Addr::UNSPECIFIED),
        }
    }

    pub fn store(&self) -> &Arc<TrackerStore> {
        &self.store
    }

    pub fn names(&self) -> &Arc<TrackerNames> {
        &self.names
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl Input for PsnInput {
    type Config = PsnInputConfig;
    type Output = Vec<(u16, TrackerPose)>;

    async fn pull(&mut self, config: &PsnInputConfig) -> Vec<(u16, TrackerPose)> {
        let (addr, group) = match config
            .validate()
            .and_then(|_| Ok((config.bind_addr()?, config.group()?)))
        {
            Ok(resolved) => resolved,
            Err(e) => {
                self.status.warn(format!("Invalid configuration: {}", e));
                return Vec::new();
            }
        };

        let store = self.store.clone();
        let names = self.names.clone();
        let handler = move || {
            Arc::new(move |datagram: &[u8], from: SocketAddr| {
                if let Err(e) = ingest(&store, &names, datagram) {
                    debug!("Dropped PSN datagram from {}: {}", from, e);
                }
            })
        };

        if let ListenerState::Running { fresh } = self.listener.ensure(addr, handler, &mut self.status).await {
            if fresh {
                self.subscriptions = MulticastSubscriptions::new(*addr.ip());
            }
            if let Some(socket) = self.listener.socket() {
                let wanted: BTreeSet<Ipv4Addr> = group.into_iter().collect();
                let report = self.subscriptions.reconcile_groups(socket.as_ref(), &wanted);
                if !report.failed.is_empty() {
                    self.status
                        .warn(format!("Could not join multicast group {}", config.multicast_group));
                }
            }
        }

        StalenessReaper::from_secs(config.timeout_secs).sweep(&self.store);
        compose_trackers(&self.store, config.start_tracker, config.tracker_count)
    }

    fn dirty(&self) -> &Arc<DirtySignal> {
        self.store.dirty()
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

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use stagelink_core::psn::{DataPacket, InfoPacket, PacketHeader, TrackerName};

    fn setup() -> (TrackerStore, TrackerNames) {
        (TrackerStore::new(Arc::new(DirtySignal::new())), TrackerNames::default())
    }

    #[test]
    fn test_position_only_update_keeps_orientation() {
        let (store, names) = setup();
        let full = DataPacket::new(
            PacketHeader::new(0, 0, 1),
            vec![TrackerUpdate::pose(3, Vec3::new(1.0, 1.0, 1.0), Vec3::new(0.0, 0.7, 0.0))],
        );
        ingest(&store, &names, &full.encode().unwrap()).unwrap();

        let partial = DataPacket::new(
            PacketHeader::new(0, 1, 1),
            vec![TrackerUpdate {
                position: Some(Vec3::new(2.0, 3.0, 4.0)),
                ..TrackerUpdate::new(3)
            }],
        );
        assert_eq!(
            ingest(&store, &names, &partial.encode().unwrap()),
            Ok(Ingested::Trackers(1))
        );

        let pose = store.get(3).unwrap();
        assert_eq!(pose.position, Vec3::new(2.0, 3.0, -4.0));
        assert_eq!(pose.axis_angle, Vec3::new(0.0, 0.7, 0.0));
    }

    #[test]
    fn test_z_is_flipped_on_the_way_in() {
        let (store, names) = setup();
        let packet = DataPacket::new(
            PacketHeader::new(0, 0, 1),
            vec![TrackerUpdate::pose(1, Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.1, 0.2, 0.3))],
        );
        ingest(&store, &names, &packet.encode().unwrap()).unwrap();

        let pose = store.get(1).unwrap();
        assert_eq!(pose.position, Vec3::new(1.0, 2.0, -3.0));
        assert_eq!(pose.axis_angle, Vec3::new(0.1, 0.2, -0.3));
    }

    #[test]
    fn test_info_names() {
        let (store, names) = setup();
        let info = InfoPacket::new(
            PacketHeader::new(0, 0, 1),
            "Tracking PC",
            vec![TrackerName::new(4, "Singer")],
        );
        assert_eq!(
            ingest(&store, &names, &info.encode().unwrap()),
            Ok(Ingested::Info)
        );
        assert_eq!(names.system_name().as_deref(), Some("Tracking PC"));
        assert_eq!(names.get(4).as_deref(), Some("Singer"));
        assert!(store.is_empty());
    }
}
