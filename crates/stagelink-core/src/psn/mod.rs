//! PosiStageNet (PSN) encoding/decoding
//!
//! PSN datagrams are trees of TLV chunks (see [`chunk`]). Two packet kinds
//! exist: `PSN_DATA` carries tracker poses at frame rate, `PSN_INFO` carries
//! the system and tracker names roughly once per second.
//!
//! ```text
//! PSN_DATA 0x6755                      PSN_INFO 0x6756
//! ├── 0x0000 packet header             ├── 0x0000 packet header
//! └── 0x0001 tracker list              ├── 0x0001 system name
//!     └── <tracker id>                 └── 0x0002 tracker list
//!         ├── 0x0000 position              └── <tracker id>
//!         ├── 0x0001 speed                     └── 0x0000 tracker name
//!         ├── 0x0002 orientation
//!         ├── 0x0003 status
//!         ├── 0x0004 acceleration
//!         ├── 0x0005 target position
//!         └── 0x0006 timestamp
//! ```

pub mod chunk;
pub mod data;
pub mod info;
pub mod orientation;

use bytes::{BufMut, BytesMut};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::cursor::Reader;
use crate::{DecodeError, EncodeError, Result};

pub use data::{DataPacket, TrackerUpdate};
pub use info::{InfoPacket, TrackerName};
pub use orientation::{axis_angle_to_quat, flip_z, quat_to_axis_angle, ANGLE_EPSILON};

/// Root chunk id of a data packet
pub const PSN_DATA_PACKET: u16 = 0x6755;

/// Root chunk id of an info packet
pub const PSN_INFO_PACKET: u16 = 0x6756;

/// Packet header chunk id, shared by both packet kinds
pub const PACKET_HEADER: u16 = 0x0000;

/// Protocol version sent in the packet header
pub const VERSION_HIGH: u8 = 2;
pub const VERSION_LOW: u8 = 3;

/// Upper bound for one PSN datagram
pub const MAX_PACKET_SIZE: usize = 1500;

/// Size of the header chunk including its own chunk header
pub const PACKET_HEADER_CHUNK_SIZE: usize = chunk::ChunkHeader::SIZE + 12;

/// Contents of the 0x0000 header chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    /// Sender timestamp in microseconds
    pub timestamp: u64,
    pub version_high: u8,
    pub version_low: u8,
    pub frame_id: u8,
    /// Number of packets making up this frame
    pub frame_packet_count: u8,
}

impl PacketHeader {
    pub fn new(timestamp: u64, frame_id: u8, frame_packet_count: u8) -> Self {
        Self {
            timestamp,
            version_high: VERSION_HIGH,
            version_low: VERSION_LOW,
            frame_id,
            frame_packet_count,
        }
    }

    fn decode(mut r: Reader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: r.u64_le()?,
            version_high: r.u8()?,
            version_low: r.u8()?,
            frame_id: r.u8()?,
            frame_packet_count: r.u8()?,
        })
    }

    fn encode(&self, buf: &mut BytesMut) -> std::result::Result<(), EncodeError> {
        chunk::write_chunk(buf, PACKET_HEADER, false, |buf| {
            buf.put_u64_le(self.timestamp);
            buf.put_u8(self.version_high);
            buf.put_u8(self.version_low);
            buf.put_u8(self.frame_id);
            buf.put_u8(self.frame_packet_count);
            Ok(())
        })
    }
}

/// Either kind of PSN packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Data(DataPacket),
    Info(InfoPacket),
}

impl Packet {
    /// Decode a datagram by its root chunk id
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (root, _) = chunk::read_chunk(buf, 0, buf.len())?;
        match root.id() {
            PSN_DATA_PACKET => DataPacket::decode(buf).map(Packet::Data),
            PSN_INFO_PACKET => InfoPacket::decode(buf).map(Packet::Info),
            other => Err(DecodeError::UnexpectedChunk(other)),
        }
    }
}

/// Last known state of one tracker
///
/// Fields absent from an update keep their previous value, so a pose is
/// built up across packets rather than replaced by each one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackerPose {
    pub position: Vec3,
    /// Rotation vector (axis scaled by angle in radians)
    pub axis_angle: Vec3,
    pub speed: Vec3,
    pub acceleration: Vec3,
    pub target_position: Vec3,
    pub validity: f32,
    pub timestamp: u64,
}

impl TrackerPose {
    pub fn new(position: Vec3, axis_angle: Vec3) -> Self {
        Self {
            position,
            axis_angle,
            ..Default::default()
        }
    }

    pub fn from_rotation(position: Vec3, rotation: Quat) -> Self {
        Self::new(position, quat_to_axis_angle(rotation))
    }

    pub fn orientation(&self) -> Quat {
        axis_angle_to_quat(self.axis_angle)
    }

    /// Merge the fields present in `update`
    pub fn apply(&mut self, update: &TrackerUpdate) {
        if let Some(v) = update.position {
            self.position = v;
        }
        if let Some(v) = update.orientation {
            self.axis_angle = v;
        }
        if let Some(v) = update.speed {
            self.speed = v;
        }
        if let Some(v) = update.acceleration {
            self.acceleration = v;
        }
        if let Some(v) = update.target_position {
            self.target_position = v;
        }
        if let Some(v) = update.validity {
            self.validity = v;
        }
        if let Some(v) = update.timestamp {
            self.timestamp = v;
        }
    }

    /// Same pose with position and orientation mirrored on Z
    pub fn flipped_z(&self) -> Self {
        Self {
            position: flip_z(self.position),
            axis_angle: flip_z(self.axis_angle),
            ..*self
        }
    }
}

/// Split `items` into consecutive batches whose summed size stays within `budget`.
///
/// An item larger than the budget gets a batch of its own. Always returns at
/// least one (possibly empty) batch so a frame is never silently skipped.
pub fn batch_by_size<T>(items: Vec<T>, budget: usize, size_of: impl Fn(&T) -> usize) -> Vec<Vec<T>> {
    let mut batches = vec![Vec::new()];
    let mut used = 0;

    for item in items {
        let size = size_of(&item);
        let current = batches.len() - 1;
        if !batches[current].is_empty() && used + size > budget {
            batches.push(Vec::new());
            used = 0;
        }
        used += size;
        let last = batches.len() - 1;
        batches[last].push(item);
    }

    batches
}
