//! PSN_INFO packets

use bytes::{BufMut, Bytes, BytesMut};

use super::chunk::{self, ChunkHeader};
use super::{batch_by_size, PacketHeader, MAX_PACKET_SIZE, PACKET_HEADER, PACKET_HEADER_CHUNK_SIZE, PSN_INFO_PACKET};
use crate::{DecodeError, EncodeError, Result};

pub const SYSTEM_NAME: u16 = 0x0001;
pub const TRACKER_LIST: u16 = 0x0002;
pub const TRACKER_NAME: u16 = 0x0000;

/// Display name of one tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerName {
    pub id: u16,
    pub name: String,
}

impl TrackerName {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    fn encoded_len(&self) -> usize {
        2 * ChunkHeader::SIZE + self.name.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoPacket {
    pub header: PacketHeader,
    pub system_name: String,
    pub trackers: Vec<TrackerName>,
}

impl InfoPacket {
    pub fn new(header: PacketHeader, system_name: impl Into<String>, trackers: Vec<TrackerName>) -> Self {
        Self {
            header,
            system_name: system_name.into(),
            trackers,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (root, _) = chunk::read_chunk(buf, 0, buf.len())?;
        if root.id() != PSN_INFO_PACKET {
            return Err(DecodeError::UnexpectedChunk(root.id()));
        }

        let mut header = None;
        let mut system_name = String::new();
        let mut trackers = Vec::new();
        root.children(|child| {
            match child.id() {
                PACKET_HEADER => header = Some(PacketHeader::decode(child.reader())?),
                SYSTEM_NAME => system_name = String::from_utf8_lossy(child.payload()).into_owned(),
                TRACKER_LIST => {
                    child.children(|tracker| {
                        let mut name = String::new();
                        tracker.children(|field| {
                            if field.id() == TRACKER_NAME {
                                name = String::from_utf8_lossy(field.payload()).into_owned();
                            }
                            Ok(())
                        })?;
                        trackers.push(TrackerName { id: tracker.id(), name });
                        Ok(())
                    })?;
                }
                _ => {}
            }
            Ok(())
        })?;

        Ok(Self {
            header: header.ok_or(DecodeError::InvalidField("packet header"))?,
            system_name,
            trackers,
        })
    }

    pub fn encode(&self) -> std::result::Result<Bytes, EncodeError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        chunk::write_chunk(&mut buf, PSN_INFO_PACKET, true, |buf| {
            self.header.encode(buf)?;
            chunk::write_chunk(buf, SYSTEM_NAME, false, |buf| {
                buf.put_slice(self.system_name.as_bytes());
                Ok(())
            })?;
            chunk::write_chunk(buf, TRACKER_LIST, true, |buf| {
                for tracker in &self.trackers {
                    chunk::write_chunk(buf, tracker.id, true, |buf| {
                        chunk::write_chunk(buf, TRACKER_NAME, false, |buf| {
                            buf.put_slice(tracker.name.as_bytes());
                            Ok(())
                        })
                    })?;
                }
                Ok(())
            })
        })?;
        Ok(buf.freeze())
    }

    pub fn encoded_len(&self) -> usize {
        overhead(&self.system_name) + self.trackers.iter().map(TrackerName::encoded_len).sum::<usize>()
    }

    /// Build the info packets for one frame, keeping each under [`MAX_PACKET_SIZE`]
    pub fn split_frame(timestamp: u64, frame_id: u8, system_name: &str, trackers: Vec<TrackerName>) -> Vec<InfoPacket> {
        let budget = MAX_PACKET_SIZE.saturating_sub(overhead(system_name));
        let batches = batch_by_size(trackers, budget, TrackerName::encoded_len);
        let count = batches.len().min(u8::MAX as usize) as u8;
        batches
            .into_iter()
            .map(|trackers| InfoPacket::new(PacketHeader::new(timestamp, frame_id, count), system_name, trackers))
            .collect()
    }
}

fn overhead(system_name: &str) -> usize {
    ChunkHeader::SIZE + PACKET_HEADER_CHUNK_SIZE + ChunkHeader::SIZE + system_name.len() + ChunkHeader::SIZE
}
