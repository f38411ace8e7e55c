//! PSN_DATA packets

use bytes::{BufMut, Bytes, BytesMut};
use glam::Vec3;

use super::chunk::{self, Chunk, ChunkHeader};
use super::{batch_by_size, PacketHeader, MAX_PACKET_SIZE, PACKET_HEADER, PACKET_HEADER_CHUNK_SIZE, PSN_DATA_PACKET};
use crate::cursor::Reader;
use crate::{DecodeError, EncodeError, Result};

pub const TRACKER_LIST: u16 = 0x0001;

pub const TRACKER_POS: u16 = 0x0000;
pub const TRACKER_SPEED: u16 = 0x0001;
pub const TRACKER_ORI: u16 = 0x0002;
pub const TRACKER_STATUS: u16 = 0x0003;
pub const TRACKER_ACCEL: u16 = 0x0004;
pub const TRACKER_TRGTPOS: u16 = 0x0005;
pub const TRACKER_TIMESTAMP: u16 = 0x0006;

const VEC3_FIELD_SIZE: usize = ChunkHeader::SIZE + 12;
const F32_FIELD_SIZE: usize = ChunkHeader::SIZE + 4;
const U64_FIELD_SIZE: usize = ChunkHeader::SIZE + 8;

/// Fields received for one tracker in one packet
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackerUpdate {
    pub id: u16,
    pub position: Option<Vec3>,
    pub speed: Option<Vec3>,
    /// Rotation vector in radians
    pub orientation: Option<Vec3>,
    pub validity: Option<f32>,
    pub acceleration: Option<Vec3>,
    pub target_position: Option<Vec3>,
    pub timestamp: Option<u64>,
}

impl TrackerUpdate {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Position and orientation, the pair an output sends every frame
    pub fn pose(id: u16, position: Vec3, orientation: Vec3) -> Self {
        Self {
            id,
            position: Some(position),
            orientation: Some(orientation),
            ..Default::default()
        }
    }

    /// Encoded size including the tracker chunk header
    pub fn encoded_len(&self) -> usize {
        let vec3_fields = [self.position, self.speed, self.orientation, self.acceleration, self.target_position]
            .iter()
            .filter(|v| v.is_some())
            .count();
        ChunkHeader::SIZE
            + vec3_fields * VEC3_FIELD_SIZE
            + self.validity.map_or(0, |_| F32_FIELD_SIZE)
            + self.timestamp.map_or(0, |_| U64_FIELD_SIZE)
    }

    fn decode(tracker: Chunk<'_>) -> Result<Self> {
        let mut update = TrackerUpdate::new(tracker.id());
        tracker.children(|field| {
            match field.id() {
                TRACKER_POS => update.position = Some(read_vec3(field.reader())?),
                TRACKER_SPEED => update.speed = Some(read_vec3(field.reader())?),
                TRACKER_ORI => update.orientation = Some(read_vec3(field.reader())?),
                TRACKER_STATUS => update.validity = Some(field.reader().f32_le()?),
                TRACKER_ACCEL => update.acceleration = Some(read_vec3(field.reader())?),
                TRACKER_TRGTPOS => update.target_position = Some(read_vec3(field.reader())?),
                TRACKER_TIMESTAMP => update.timestamp = Some(field.reader().u64_le()?),
                _ => {}
            }
            Ok(())
        })?;
        Ok(update)
    }

    fn encode(&self, buf: &mut BytesMut) -> std::result::Result<(), EncodeError> {
        chunk::write_chunk(buf, self.id, true, |buf| {
            let vec3_fields = [
                (TRACKER_POS, self.position),
                (TRACKER_SPEED, self.speed),
                (TRACKER_ORI, self.orientation),
                (TRACKER_ACCEL, self.acceleration),
                (TRACKER_TRGTPOS, self.target_position),
            ];
            for (id, value) in vec3_fields {
                if let Some(v) = value {
                    write_vec3(buf, id, v)?;
                }
            }
            if let Some(validity) = self.validity {
                chunk::write_chunk(buf, TRACKER_STATUS, false, |buf| {
                    buf.put_f32_le(validity);
                    Ok(())
                })?;
            }
            if let Some(timestamp) = self.timestamp {
                chunk::write_chunk(buf, TRACKER_TIMESTAMP, false, |buf| {
                    buf.put_u64_le(timestamp);
                    Ok(())
                })?;
            }
            Ok(())
        })
    }
}

fn read_vec3(mut r: Reader<'_>) -> Result<Vec3> {
    Ok(Vec3::new(r.f32_le()?, r.f32_le()?, r.f32_le()?))
}

fn write_vec3(buf: &mut BytesMut, id: u16, v: Vec3) -> std::result::Result<(), EncodeError> {
    chunk::write_chunk(buf, id, false, |buf| {
        buf.put_f32_le(v.x);
        buf.put_f32_le(v.y);
        buf.put_f32_le(v.z);
        Ok(())
    })
}

/// A decoded or outbound PSN_DATA packet
#[derive(Debug, Clone, PartialEq)]
pub struct DataPacket {
    pub header: PacketHeader,
    pub trackers: Vec<TrackerUpdate>,
}

impl DataPacket {
    pub fn new(header: PacketHeader, trackers: Vec<TrackerUpdate>) -> Self {
        Self { header, trackers }
    }

    /// Decode a PSN_DATA datagram. Unknown chunks at any level are skipped.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (root, _) = chunk::read_chunk(buf, 0, buf.len())?;
        if root.id() != PSN_DATA_PACKET {
            return Err(DecodeError::UnexpectedChunk(root.id()));
        }

        let mut header = None;
        let mut trackers = Vec::new();
        root.children(|child| {
            match child.id() {
                PACKET_HEADER => header = Some(PacketHeader::decode(child.reader())?),
                TRACKER_LIST => {
                    child.children(|tracker| {
                        trackers.push(TrackerUpdate::decode(tracker)?);
                        Ok(())
                    })?;
                }
                _ => {}
            }
            Ok(())
        })?;

        Ok(Self {
            header: header.ok_or(DecodeError::InvalidField("packet header"))?,
            trackers,
        })
    }

    pub fn encode(&self) -> std::result::Result<Bytes, EncodeError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        chunk::write_chunk(&mut buf, PSN_DATA_PACKET, true, |buf| {
            self.header.encode(buf)?;
            chunk::write_chunk(buf, TRACKER_LIST, true, |buf| {
                for tracker in &self.trackers {
                    tracker.encode(buf)?;
                }
                Ok(())
            })
        })?;
        Ok(buf.freeze())
    }

    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.trackers.iter().map(TrackerUpdate::encoded_len).sum::<usize>()
    }

    /// Build the packets for one frame, keeping each under [`MAX_PACKET_SIZE`].
    ///
    /// Every packet shares `frame_id` and carries the packet count of the frame.
    pub fn split_frame(timestamp: u64, frame_id: u8, trackers: Vec<TrackerUpdate>) -> Vec<DataPacket> {
        let batches = batch_by_size(trackers, MAX_PACKET_SIZE - FRAME_OVERHEAD, TrackerUpdate::encoded_len);
        let count = batches.len().min(u8::MAX as usize) as u8;
        batches
            .into_iter()
            .map(|trackers| DataPacket::new(PacketHeader::new(timestamp, frame_id, count), trackers))
            .collect()
    }
}

/// Root header + packet header chunk + tracker list header
const FRAME_OVERHEAD: usize = ChunkHeader::SIZE + PACKET_HEADER_CHUNK_SIZE + ChunkHeader::SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_and_orientation_roundtrip() {
        let packet = DataPacket::new(
            PacketHeader::new(123_456, 7, 1),
            vec![
                TrackerUpdate::pose(3, Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 1.5, 0.0)),
                TrackerUpdate::pose(9, Vec3::new(-1.0, 0.0, 0.5), Vec3::ZERO),
            ],
        );
        let bytes = packet.encode().unwrap();
        assert_eq!(bytes.len(), packet.encoded_len());

        let decoded = DataPacket::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.header.version_high, 2);
    }

    #[test]
    fn test_all_fields_roundtrip() {
        let update = TrackerUpdate {
            id: 1,
            position: Some(Vec3::X),
            speed: Some(Vec3::Y),
            orientation: Some(Vec3::Z),
            validity: Some(0.75),
            acceleration: Some(Vec3::ONE),
            target_position: Some(Vec3::NEG_ONE),
            timestamp: Some(99),
        };
        let packet = DataPacket::new(PacketHeader::new(0, 0, 1), vec![update]);
        let decoded = DataPacket::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded.trackers, vec![update]);
    }

    #[test]
    fn test_wire_layout() {
        let packet = DataPacket::new(
            PacketHeader::new(1, 2, 1),
            vec![TrackerUpdate {
                position: Some(Vec3::new(1.0, 0.0, 0.0)),
                ..TrackerUpdate::new(5)
            }],
        );
        let bytes = packet.encode().unwrap();

        // Root: id 0x6755, children flag, length excludes its own header
        let root = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(root & 0xffff, 0x6755);
        assert_ne!(root & 0x8000_0000, 0);
        assert_eq!(((root >> 16) & 0x7fff) as usize, bytes.len() - 4);

        // Header chunk: 12 byte terminal payload
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 12, 0x00]);
        assert_eq!(&bytes[8..16], &1u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &[2, 3, 2, 1]);

        // Position x as little-endian f32 at the very end
        assert_eq!(&bytes[bytes.len() - 12..bytes.len() - 8], &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let mut buf = BytesMut::new();
        chunk::write_chunk(&mut buf, PSN_DATA_PACKET, true, |buf| {
            PacketHeader::new(0, 0, 1).encode(buf)?;
            chunk::write_chunk(buf, 0x0042, false, |buf| {
                buf.put_slice(&[0xde, 0xad, 0xbe, 0xef, 0x01]);
                Ok(())
            })?;
            chunk::write_chunk(buf, TRACKER_LIST, true, |buf| {
                chunk::write_chunk(buf, 3, true, |buf| {
                    chunk::write_chunk(buf, 0x0077, false, |buf| {
                        buf.put_u32_le(1);
                        Ok(())
                    })?;
                    write_vec3(buf, TRACKER_POS, Vec3::new(1.0, 2.0, 3.0))
                })
            })
        })
        .unwrap();

        let packet = DataPacket::decode(&buf).unwrap();
        assert_eq!(packet.trackers.len(), 1);
        assert_eq!(packet.trackers[0].id, 3);
        assert_eq!(packet.trackers[0].position, Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(packet.trackers[0].orientation, None);
    }

    #[test]
    fn test_truncated_packet_is_rejected() {
        let packet = DataPacket::new(
            PacketHeader::new(0, 0, 1),
            vec![TrackerUpdate::pose(1, Vec3::ONE, Vec3::ZERO)],
        );
        let bytes = packet.encode().unwrap();
        assert!(DataPacket::decode(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_missing_header_is_rejected() {
        let mut buf = BytesMut::new();
        chunk::write_chunk(&mut buf, PSN_DATA_PACKET, true, |buf| {
            chunk::write_chunk(buf, TRACKER_LIST, true, |_| Ok(()))
        })
        .unwrap();
        assert_eq!(
            DataPacket::decode(&buf),
            Err(DecodeError::InvalidField("packet header"))
        );
    }

    #[test]
    fn test_split_frame_respects_packet_limit() {
        let trackers: Vec<_> = (0..100)
            .map(|id| TrackerUpdate::pose(id, Vec3::splat(id as f32), Vec3::ZERO))
            .collect();
        let packets = DataPacket::split_frame(10, 4, trackers);

        assert!(packets.len() > 1);
        let total: usize = packets.iter().map(|p| p.trackers.len()).sum();
        assert_eq!(total, 100);

        for packet in &packets {
            assert_eq!(packet.header.frame_id, 4);
            assert_eq!(packet.header.frame_packet_count as usize, packets.len());
            assert!(packet.encode().unwrap().len() <= MAX_PACKET_SIZE);
        }

        // Trackers stay in order across packets
        let ids: Vec<u16> = packets.iter().flat_map(|p| p.trackers.iter().map(|t| t.id)).collect();
        assert_eq!(ids, (0..100).collect::<Vec<u16>>());
    }
}
