//! sACN (E1.31) output

use async_trait::async_trait;
use bytes::Bytes;
use stagelink_core::sacn::{universe_group, DataPacket, DiscoveryPacket, SourceName, SyncPacket, DISCOVERY_GROUP};
use stagelink_core::{clamp_channels, Protocol, SequenceCounter, WrapRule};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use super::SessionSlot;
use crate::compositor::split_channels;
use crate::config::SacnOutputConfig;
use crate::error::ConfigError;
use crate::status::{StatusReporter, StatusSink};
use crate::traits::{Connectivity, Output};

/// Universe discovery announcement period from E1.31
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(10);

/// How many stream-terminated packets announce a source going away
const TERMINATE_REPEATS: usize = 3;

/// Where an output's packets go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Per-universe multicast groups on this port
    Multicast(u16),
    Unicast(SocketAddrV4),
}

impl Destination {
    pub fn from_config(config: &SacnOutputConfig) -> Result<Self, ConfigError> {
        if config.multicast {
            Ok(Destination::Multicast(config.port))
        } else {
            config.unicast_target().map(Destination::Unicast)
        }
    }

    pub fn for_universe(self, universe: u16) -> SocketAddr {
        match self {
            Destination::Multicast(port) => SocketAddr::V4(SocketAddrV4::new(universe_group(universe), port)),
            Destination::Unicast(addr) => SocketAddr::V4(addr),
        }
    }

    pub fn discovery(self) -> SocketAddr {
        match self {
            Destination::Multicast(port) => SocketAddr::V4(SocketAddrV4::new(DISCOVERY_GROUP, port)),
            Destination::Unicast(addr) => SocketAddr::V4(addr),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Multicast(port) => write!(f, "multicast port {}", port),
            Destination::Unicast(addr) => write!(f, "{}", addr),
        }
    }
}

/// Encode a flat channel array as E1.31 data packets, one per universe
pub fn encode_frame(
    cid: [u8; 16],
    config: &SacnOutputConfig,
    sequence: u8,
    channels: &[u8],
) -> Vec<(u16, Bytes)> {
    let source_name = SourceName::new(&config.source_name);
    split_channels(channels, config.start_universe, Protocol::Sacn)
        .into_iter()
        .filter_map(|(universe, chunk)| {
            let mut packet = DataPacket::new(cid, source_name, universe, sequence, chunk);
            packet.priority = config.priority;
            packet.sync_address = sync_address(config);
            packet.options.preview = config.preview;
            match packet.encode() {
                Ok(bytes) => Some((universe, bytes)),
                Err(e) => {
                    debug!("Skipping universe {}: {}", universe, e);
                    None
                }
            }
        })
        .collect()
}

fn sync_address(config: &SacnOutputConfig) -> u16 {
    if config.sync_enabled {
        config.sync_universe as u16
    } else {
        0
    }
}

/// What the last frame was sent as, for the goodbye on close
#[derive(Debug)]
struct Stream {
    source_name: SourceName,
    destination: Destination,
    universes: Vec<u16>,
}

/// Sends a flat channel array as consecutive E1.31 universes
pub struct SacnOutput {
    slot: SessionSlot,
    status: StatusReporter,
    cid: [u8; 16],
    sync_sequence: SequenceCounter,
    last_discovery: Option<Instant>,
    stream: Option<Stream>,
}

impl SacnOutput {
    pub fn new(status: Arc<dyn StatusSink>) -> Self {
        Self {
            slot: SessionSlot::default(),
            status: StatusReporter::new("sacn-out", status),
            cid: *Uuid::new_v4().as_bytes(),
            sync_sequence: SequenceCounter::new(WrapRule::Sacn),
            last_discovery: None,
            stream: None,
        }
    }

    /// Component identifier carried in every packet
    pub fn cid(&self) -> [u8; 16] {
        self.cid
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.slot.session().and_then(|session| session.local_addr())
    }
}

#[async_trait]
impl Output for SacnOutput {
    type Config = SacnOutputConfig;
    type Frame = [i32];

    async fn send(&mut self, config: &SacnOutputConfig, frame: &[i32]) {
        let (local, destination) = match config
            .validate()
            .and_then(|_| Ok((config.local_addr()?, Destination::from_config(config)?)))
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

        let Some(session) = self.slot.ensure(local, false, WrapRule::Sacn, &mut self.status) else {
            return;
        };
        session.pace(config.max_fps).await;

        let channels = clamp_channels(frame);
        let sequence = session.sequence.advance();
        let packets = encode_frame(self.cid, config, sequence, &channels);
        let universes: Vec<u16> = packets.iter().map(|(universe, _)| *universe).collect();
        let mut datagrams: Vec<(Bytes, SocketAddr)> = packets
            .into_iter()
            .map(|(universe, bytes)| (bytes, destination.for_universe(universe)))
            .collect();

        let sync = sync_address(config);
        if sync != 0 && !datagrams.is_empty() {
            let packet = SyncPacket {
                cid: self.cid,
                sequence: self.sync_sequence.advance(),
                sync_address: sync,
            };
            datagrams.push((packet.encode(), destination.for_universe(sync)));
        }

        let source_name = SourceName::new(&config.source_name);
        let discovery_due = self
            .last_discovery
            .map_or(true, |at| at.elapsed() >= DISCOVERY_INTERVAL);
        if config.discovery && discovery_due {
            for page in DiscoveryPacket::pages(self.cid, source_name, &universes) {
                match page.encode() {
                    Ok(bytes) => datagrams.push((bytes, destination.discovery())),
                    Err(e) => debug!("Skipping discovery page {}: {}", page.page, e),
                }
            }
            self.last_discovery = Some(Instant::now());
        }

        let report = session.send_all(&datagrams).await;
        self.slot.record(report, &destination.to_string(), &mut self.status);
        self.stream = Some(Stream {
            source_name,
            destination,
            universes,
        });
    }

    fn connectivity(&self) -> Connectivity {
        self.slot.connectivity()
    }

    async fn close(&mut self) {
        let Some(mut session) = self.slot.take() else {
            return;
        };
        let Some(stream) = self.stream.take() else {
            return;
        };

        let mut datagrams = Vec::new();
        for _ in 0..TERMINATE_REPEATS {
            let sequence = session.sequence.advance();
            for &universe in &stream.universes {
                let mut packet = DataPacket::new(self.cid, stream.source_name, universe, sequence, &[]);
                packet.options.stream_terminated = true;
                if let Ok(bytes) = packet.encode() {
                    datagrams.push((bytes, stream.destination.for_universe(universe)));
                }
            }
        }
        let report = session.send_all(&datagrams).await;
        debug!(
            "Sent {} stream-terminated packets ({} failed)",
            report.sent,
            report.failures.len()
        );
        self.last_discovery = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagelink_core::sacn::Packet;
    use std::net::Ipv4Addr;

    #[test]
    fn test_destination() {
        let multicast = Destination::from_config(&SacnOutputConfig::default()).unwrap();
        assert_eq!(
            multicast.for_universe(0x0102),
            "239.255.1.2:5568".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            multicast.discovery(),
            "239.255.250.214:5568".parse::<SocketAddr>().unwrap()
        );

        let config = SacnOutputConfig {
            multicast: false,
            target_ip: "10.0.0.9".into(),
            ..Default::default()
        };
        let unicast = Destination::from_config(&config).unwrap();
        assert_eq!(
            unicast,
            Destination::Unicast(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 5568))
        );
        assert_eq!(unicast.for_universe(7), unicast.discovery());
    }

    #[test]
    fn test_encode_frame_fields() {
        let config = SacnOutputConfig {
            start_universe: 10,
            priority: 150,
            preview: true,
            sync_enabled: true,
            sync_universe: 500,
            source_name: "Desk".into(),
            ..Default::default()
        };
        let channels = vec![42u8; 700];
        let packets = encode_frame([5; 16], &config, 17, &channels);
        assert_eq!(packets.len(), 2);

        let Packet::Data(second) = Packet::decode(&packets[1].1).unwrap() else {
            panic!("expected a data packet");
        };
        assert_eq!(second.universe, 11);
        assert_eq!(second.sequence, 17);
        assert_eq!(second.priority, 150);
        assert_eq!(second.sync_address, 500);
        assert!(second.options.preview);
        assert_eq!(second.source_name.as_str(), "Desk");
        assert_eq!(second.cid, [5; 16]);
        assert_eq!(second.data.len(), 188);
    }

    #[test]
    fn test_outputs_get_distinct_cids() {
        let sink: Arc<dyn StatusSink> = Arc::new(crate::status::TracingStatus);
        let a = SacnOutput::new(sink.clone());
        let b = SacnOutput::new(sink);
        assert_ne!(a.cid(), b.cid());
    }
}
