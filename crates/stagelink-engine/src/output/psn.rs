//! PosiStageNet output

use async_trait::async_trait;
use bytes::Bytes;
use stagelink_core::psn::{DataPacket, InfoPacket, TrackerPose, TrackerUpdate};
use stagelink_core::{SequenceCounter, WrapRule};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::SessionSlot;
use crate::compositor::assign_trackers;
use crate::config::PsnOutputConfig;
use crate::status::{StatusReporter, StatusSink};
use crate::traits::{Connectivity, Output};

/// Scene pose to the update sent on the wire
pub fn to_wire(id: u16, pose: &TrackerPose) -> TrackerUpdate {
    let wire = pose.flipped_z();
    TrackerUpdate::pose(id, wire.position, wire.axis_angle)
}

/// Encode one frame of addressed trackers as PSN_DATA packets
pub fn encode_data(timestamp: u64, frame_id: u8, trackers: &[(u16, TrackerPose)]) -> Vec<Bytes> {
    let updates = trackers.iter().map(|(id, pose)| to_wire(*id, pose)).collect();
    DataPacket::split_frame(timestamp, frame_id, updates)
        .iter()
        .filter_map(|packet| match packet.encode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("Skipping PSN data packet: {}", e);
                None
            }
        })
        .collect()
}

/// Encode the PSN_INFO packets naming `trackers`
pub fn encode_info(timestamp: u64, frame_id: u8, config: &PsnOutputConfig, trackers: &[(u16, TrackerPose)]) -> Vec<Bytes> {
    let names = trackers
        .iter()
        .enumerate()
        .map(|(index, (id, _))| config.tracker_name(index, *id))
        .collect();
    InfoPacket::split_frame(timestamp, frame_id, &config.system_name, names)
        .iter()
        .filter_map(|packet| match packet.encode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("Skipping PSN info packet: {}", e);
                None
            }
        })
        .collect()
}

/// Sends tracker poses as PSN_DATA, with PSN_INFO at the configured interval
pub struct PsnOutput {
    slot: SessionSlot,
    status: StatusReporter,
    info_sequence: SequenceCounter,
    last_info: Option<Instant>,
}

impl PsnOutput {
    pub fn new(status: Arc<dyn StatusSink>) -> Self {
        Self {
            slot: SessionSlot::default(),
            status: StatusReporter::new("psn-out", status),
            info_sequence: SequenceCounter::new(WrapRule::PsnFrame),
            last_info: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.slot.session().and_then(|session| session.local_addr())
    }
}

#[async_trait]
impl Output for PsnOutput {
    type Config = PsnOutputConfig;
    type Frame = [TrackerPose];

    async fn send(&mut self, config: &PsnOutputConfig, frame: &[TrackerPose]) {
        let (local, target) = match config
            .validate()
            .and_then(|_| Ok((config.local_addr()?, config.target()?)))
        {
            Ok(resolved) => resolved,
            Err(e) => {
                self.status.warn(format!("Invalid configuration: {}", e));
                return;
            }
        };
        if frame.is_empty() {
            return;
        }

        let Some(session) = self.slot.ensure(local, false, WrapRule::PsnFrame, &mut self.status) else {
            return;
        };
        session.pace(config.max_fps).await;

        let trackers = assign_trackers(frame, config.start_tracker);
        let timestamp = session.elapsed_micros();
        let frame_id = session.sequence.advance();
        let mut packets = encode_data(timestamp, frame_id, &trackers);

        let info_due = match (config.info_interval(), self.last_info) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(interval), Some(at)) => at.elapsed() >= interval,
        };
        if info_due {
            let info_frame = self.info_sequence.advance();
            packets.extend(encode_info(timestamp, info_frame, config, &trackers));
            self.last_info = Some(Instant::now());
        }

        let target = SocketAddr::V4(target);
        let datagrams: Vec<(Bytes, SocketAddr)> = packets.into_iter().map(|bytes| (bytes, target)).collect();
        let report = session.send_all(&datagrams).await;
        self.slot.record(report, &target.to_string(), &mut self.status);
    }

    fn connectivity(&self) -> Connectivity {
        self.slot.connectivity()
    }

    async fn close(&mut self) {
        self.slot.take();
        self.last_info = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use stagelink_core::psn::Packet;

    #[test]
    fn test_wire_update_flips_z() {
        let pose = TrackerPose::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 0.0, 0.5));
        let update = to_wire(4, &pose);
        assert_eq!(update.id, 4);
        assert_eq!(update.position, Some(Vec3::new(1.0, 2.0, -3.0)));
        assert_eq!(update.orientation, Some(Vec3::new(0.0, 0.0, -0.5)));
        assert_eq!(update.speed, None);
    }

    #[test]
    fn test_large_frame_is_split() {
        let poses = vec![TrackerPose::default(); 100];
        let trackers = assign_trackers(&poses, 0);
        let packets = encode_data(1_000, 3, &trackers);
        assert!(packets.len() > 1);

        let mut seen = 0;
        for bytes in &packets {
            assert!(bytes.len() <= stagelink_core::psn::MAX_PACKET_SIZE);
            let Packet::Data(packet) = Packet::decode(bytes).unwrap() else {
                panic!("expected a data packet");
            };
            assert_eq!(packet.header.frame_id, 3);
            assert_eq!(packet.header.frame_packet_count as usize, packets.len());
            seen += packet.trackers.len();
        }
        assert_eq!(seen, 100);
    }

    #[test]
    fn test_info_uses_configured_names() {
        let config = PsnOutputConfig {
            system_name: "Stage".into(),
            tracker_names: vec!["Lead".into()],
            ..Default::default()
        };
        let trackers = assign_trackers(&[TrackerPose::default(); 2], 10);
        let packets = encode_info(0, 0, &config, &trackers);
        assert_eq!(packets.len(), 1);

        let Packet::Info(info) = Packet::decode(&packets[0]).unwrap() else {
            panic!("expected an info packet");
        };
        assert_eq!(info.system_name, "Stage");
        assert_eq!(info.trackers[0].id, 10);
        assert_eq!(info.trackers[0].name, "Lead");
        assert_eq!(info.trackers[1].name, "Tracker 11");
    }
}
