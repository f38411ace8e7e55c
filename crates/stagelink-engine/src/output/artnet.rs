//! Art-Net output

use async_trait::async_trait;
use bytes::Bytes;
use stagelink_core::artnet::encode_dmx;
use stagelink_core::{clamp_channels, Protocol, WrapRule};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use super::SessionSlot;
use crate::compositor::split_channels;
use crate::config::ArtNetOutputConfig;
use crate::status::{StatusReporter, StatusSink};
use crate::traits::{Connectivity, Output};

/// Encode a flat channel array as ArtDmx datagrams, one per universe.
///
/// All universes of one frame share `sequence`.
pub fn encode_frame(channels: &[u8], start_universe: u32, sequence: u8) -> Vec<(u16, Bytes)> {
    split_channels(channels, start_universe, Protocol::ArtNet)
        .into_iter()
        .filter_map(|(universe, chunk)| match encode_dmx(sequence, universe, chunk) {
            Ok(bytes) => Some((universe, bytes)),
            Err(e) => {
                debug!("Skipping universe {}: {}", universe, e);
                None
            }
        })
        .collect()
}

/// Sends a flat channel array as consecutive ArtDmx universes
pub struct ArtNetOutput {
    slot: SessionSlot,
    status: StatusReporter,
}

impl ArtNetOutput {
    pub fn new(status: Arc<dyn StatusSink>) -> Self {
        Self {
            slot: SessionSlot::default(),
            status: StatusReporter::new("artnet-out", status),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.slot.session().and_then(|session| session.local_addr())
    }
}

#[async_trait]
impl Output for ArtNetOutput {
    type Config = ArtNetOutputConfig;
    type Frame = [i32];

    async fn send(&mut self, config: &ArtNetOutputConfig, frame: &[i32]) {
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

        let Some(session) = self.slot.ensure(local, config.broadcast, WrapRule::ArtNet, &mut self.status) else {
            return;
        };
        session.pace(config.max_fps).await;

        let channels = clamp_channels(frame);
        let sequence = session.sequence.advance();
        let target = SocketAddr::V4(target);
        let datagrams: Vec<(Bytes, SocketAddr)> = encode_frame(&channels, config.start_universe, sequence)
            .into_iter()
            .map(|(_, bytes)| (bytes, target))
            .collect();

        let report = session.send_all(&datagrams).await;
        self.slot.record(report, &target.to_string(), &mut self.status);
    }

    fn connectivity(&self) -> Connectivity {
        self.slot.connectivity()
    }

    async fn close(&mut self) {
        self.slot.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagelink_core::artnet::ArtDmx;

    #[test]
    fn test_encode_frame_splits_universes() {
        let channels: Vec<u8> = (0..600).map(|i| (i % 256) as u8).collect();
        let packets = encode_frame(&channels, 3, 9);
        assert_eq!(packets.len(), 2);

        let first = ArtDmx::decode(&packets[0].1).unwrap();
        assert_eq!(first.universe, 3);
        assert_eq!(first.sequence, 9);
        assert_eq!(first.data.len(), 512);

        let second = ArtDmx::decode(&packets[1].1).unwrap();
        assert_eq!(second.universe, 4);
        assert_eq!(second.sequence, 9);
        assert_eq!(second.data.len(), 88);
        assert_eq!(second.data[0], channels[512]);
    }

    #[test]
    fn test_encode_frame_stops_at_last_universe() {
        let channels = vec![1u8; 1024];
        let packets = encode_frame(&channels, 32767, 1);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].0, 32767);
    }
}
