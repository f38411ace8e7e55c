//! sACN / ANSI E1.31 encoding/decoding
//!
//! Three packet kinds share the ACN root layer and are told apart by the
//! root and framing vectors:
//!
//! ```text
//! root vector 0x04 + framing 0x02  -> data packet (DMP layer with DMX512)
//! root vector 0x08 + framing 0x01  -> synchronization packet
//! root vector 0x08 + framing 0x02  -> universe discovery packet
//! ```
//!
//! Data packet offsets (all multi-byte fields big-endian):
//! ```text
//!   0  preamble size (0x0010)      38  framing flags+length
//!   2  postamble size (0)          40  framing vector
//!   4  ACN packet identifier (12)  44  source name (64)
//!  16  root flags+length          108  priority
//!  18  root vector                109  synchronization address
//!  22  CID (16)                   111  sequence number
//!                                 112  options
//!                                 113  universe
//! 115  DMP flags+length  117 vector  118 address/data type
//! 119  first address     121 increment  123 property value count
//! 125  start code        126 DMX data
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::net::Ipv4Addr;

use crate::cursor::Reader;
use crate::{DecodeError, EncodeError, Result, DMX_CHANNELS};

/// ACN packet identifier at offset 4
pub const ACN_PACKET_ID: [u8; 12] = [
    0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00,
];

pub const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;
pub const VECTOR_ROOT_E131_EXTENDED: u32 = 0x0000_0008;
pub const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;
pub const VECTOR_E131_EXTENDED_SYNCHRONIZATION: u32 = 0x0000_0001;
pub const VECTOR_E131_EXTENDED_DISCOVERY: u32 = 0x0000_0002;
pub const VECTOR_UNIVERSE_DISCOVERY_UNIVERSE_LIST: u32 = 0x0000_0001;
pub const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;

/// Address type and data type byte for DMX data
pub const DMP_ADDRESS_DATA_TYPE: u8 = 0xa1;

/// Smallest data packet: headers plus the start code
pub const DATA_HEADER_SIZE: usize = 126;

/// Size of a synchronization packet
pub const SYNC_PACKET_SIZE: usize = 49;

/// Discovery packet size without the universe list
pub const DISCOVERY_HEADER_SIZE: usize = 120;

/// Maximum universes listed in one discovery page
pub const DISCOVERY_UNIVERSES_PER_PAGE: usize = 512;

/// Multicast group for universe discovery
pub const DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 250, 214);

/// Universe number reserved for discovery
pub const DISCOVERY_UNIVERSE: u16 = 64214;

/// Default source priority
pub const DEFAULT_PRIORITY: u8 = 100;

const ROOT_LAYER_SIZE: usize = 38;
const FLAGS: u16 = 0x7000;

/// Multicast group carrying universe `universe`: 239.255.hi.lo
pub fn universe_group(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(239, 255, hi, lo)
}

/// 64-byte, NUL-padded UTF-8 source name
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SourceName([u8; 64]);

impl SourceName {
    /// Truncates to 63 bytes on a character boundary so the field stays NUL-terminated
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(63);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let mut raw = [0u8; 64];
        raw[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self(raw)
    }

    pub fn from_raw(raw: [u8; 64]) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn as_str(&self) -> Cow<'_, str> {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(64);
        String::from_utf8_lossy(&self.0[..end])
    }
}

impl Default for SourceName {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl std::fmt::Debug for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// Framing layer options byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub preview: bool,
    pub stream_terminated: bool,
    pub force_sync: bool,
}

impl Options {
    pub fn to_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.preview {
            byte |= 0x80;
        }
        if self.stream_terminated {
            byte |= 0x40;
        }
        if self.force_sync {
            byte |= 0x20;
        }
        byte
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            preview: (byte & 0x80) != 0,
            stream_terminated: (byte & 0x40) != 0,
            force_sync: (byte & 0x20) != 0,
        }
    }
}

/// Any sACN packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet<'a> {
    Data(DataPacket<'a>),
    Sync(SyncPacket),
    Discovery(DiscoveryPacket),
}

impl<'a> Packet<'a> {
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        let mut r = read_root(buf)?;
        let root_vector = r.u32_be()?;
        match root_vector {
            VECTOR_ROOT_E131_DATA => DataPacket::decode(buf).map(Packet::Data),
            VECTOR_ROOT_E131_EXTENDED => {
                r.seek(40)?;
                match r.u32_be()? {
                    VECTOR_E131_EXTENDED_SYNCHRONIZATION => SyncPacket::decode(buf).map(Packet::Sync),
                    VECTOR_E131_EXTENDED_DISCOVERY => {
                        DiscoveryPacket::decode(buf).map(Packet::Discovery)
                    }
                    other => Err(DecodeError::UnsupportedVector(other)),
                }
            }
            other => Err(DecodeError::UnsupportedVector(other)),
        }
    }
}

/// Check the root layer and leave the reader at the root vector (offset 18)
fn read_root(buf: &[u8]) -> Result<Reader<'_>> {
    if buf.len() < ROOT_LAYER_SIZE {
        return Err(DecodeError::BufferTooSmall {
            needed: ROOT_LAYER_SIZE,
            have: buf.len(),
        });
    }
    let mut r = Reader::new(buf);
    r.skip(4)?;
    if r.bytes(12)? != ACN_PACKET_ID {
        return Err(DecodeError::InvalidSignature);
    }
    r.skip(2)?;
    Ok(r)
}

fn expect_vector(found: u32, expected: u32) -> Result<()> {
    if found != expected {
        return Err(DecodeError::UnsupportedVector(found));
    }
    Ok(())
}

fn put_root(buf: &mut BytesMut, total: usize, vector: u32, cid: &[u8; 16]) {
    buf.put_u16(0x0010);
    buf.put_u16(0x0000);
    buf.put_slice(&ACN_PACKET_ID);
    buf.put_u16(FLAGS | (total - 16) as u16);
    buf.put_u32(vector);
    buf.put_slice(cid);
}

/// E1.31 data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPacket<'a> {
    pub cid: [u8; 16],
    pub source_name: SourceName,
    pub priority: u8,
    pub sync_address: u16,
    pub sequence: u8,
    pub options: Options,
    pub universe: u16,
    pub start_code: u8,
    pub data: &'a [u8],
}

impl<'a> DataPacket<'a> {
    /// Packet with default priority, no sync and start code 0
    pub fn new(cid: [u8; 16], source_name: SourceName, universe: u16, sequence: u8, data: &'a [u8]) -> Self {
        Self {
            cid,
            source_name,
            priority: DEFAULT_PRIORITY,
            sync_address: 0,
            sequence,
            options: Options::default(),
            universe,
            start_code: 0x00,
            data,
        }
    }

    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < DATA_HEADER_SIZE {
            return Err(DecodeError::BufferTooSmall {
                needed: DATA_HEADER_SIZE,
                have: buf.len(),
            });
        }

        let mut r = read_root(buf)?;
        expect_vector(r.u32_be()?, VECTOR_ROOT_E131_DATA)?;
        let cid = r.array::<16>()?;

        r.skip(2)?;
        expect_vector(r.u32_be()?, VECTOR_E131_DATA_PACKET)?;
        let source_name = SourceName::from_raw(r.array::<64>()?);
        let priority = r.u8()?;
        let sync_address = r.u16_be()?;
        let sequence = r.u8()?;
        let options = Options::from_byte(r.u8()?);
        let universe = r.u16_be()?;

        r.skip(2)?;
        let dmp_vector = r.u8()?;
        if dmp_vector != VECTOR_DMP_SET_PROPERTY {
            return Err(DecodeError::UnsupportedVector(dmp_vector as u32));
        }
        r.skip(5)?;
        let count = r.u16_be()? as usize;
        let start_code = r.u8()?;

        // The property value count includes the start code
        let length = count
            .checked_sub(1)
            .ok_or(DecodeError::InvalidField("property value count"))?;
        if length > DMX_CHANNELS || length > r.remaining() {
            return Err(DecodeError::LengthOverflow {
                declared: length,
                available: r.remaining().min(DMX_CHANNELS),
            });
        }

        Ok(Self {
            cid,
            source_name,
            priority,
            sync_address,
            sequence,
            options,
            universe,
            start_code,
            data: r.bytes(length)?,
        })
    }

    pub fn encode(&self) -> std::result::Result<Bytes, EncodeError> {
        if self.data.len() > DMX_CHANNELS {
            return Err(EncodeError::PayloadTooLarge(self.data.len()));
        }
        if !(1..=63999).contains(&self.universe) {
            return Err(EncodeError::UniverseOutOfRange(self.universe));
        }

        let total = DATA_HEADER_SIZE + self.data.len();
        let mut buf = BytesMut::with_capacity(total);

        put_root(&mut buf, total, VECTOR_ROOT_E131_DATA, &self.cid);

        // Framing layer
        buf.put_u16(FLAGS | (total - ROOT_LAYER_SIZE) as u16);
        buf.put_u32(VECTOR_E131_DATA_PACKET);
        buf.put_slice(self.source_name.as_raw());
        buf.put_u8(self.priority.min(200));
        buf.put_u16(self.sync_address);
        buf.put_u8(self.sequence);
        buf.put_u8(self.options.to_byte());
        buf.put_u16(self.universe);

        // DMP layer
        buf.put_u16(FLAGS | (total - 115) as u16);
        buf.put_u8(VECTOR_DMP_SET_PROPERTY);
        buf.put_u8(DMP_ADDRESS_DATA_TYPE);
        buf.put_u16(0x0000);
        buf.put_u16(0x0001);
        buf.put_u16(self.data.len() as u16 + 1);
        buf.put_u8(self.start_code);
        buf.put_slice(self.data);

        Ok(buf.freeze())
    }
}

/// E1.31 synchronization packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPacket {
    pub cid: [u8; 16],
    pub sequence: u8,
    pub sync_address: u16,
}

impl SyncPacket {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < SYNC_PACKET_SIZE {
            return Err(DecodeError::BufferTooSmall {
                needed: SYNC_PACKET_SIZE,
                have: buf.len(),
            });
        }
        let mut r = read_root(buf)?;
        expect_vector(r.u32_be()?, VECTOR_ROOT_E131_EXTENDED)?;
        let cid = r.array::<16>()?;
        r.skip(2)?;
        expect_vector(r.u32_be()?, VECTOR_E131_EXTENDED_SYNCHRONIZATION)?;
        let sequence = r.u8()?;
        let sync_address = r.u16_be()?;
        Ok(Self {
            cid,
            sequence,
            sync_address,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SYNC_PACKET_SIZE);
        put_root(&mut buf, SYNC_PACKET_SIZE, VECTOR_ROOT_E131_EXTENDED, &self.cid);
        buf.put_u16(FLAGS | (SYNC_PACKET_SIZE - ROOT_LAYER_SIZE) as u16);
        buf.put_u32(VECTOR_E131_EXTENDED_SYNCHRONIZATION);
        buf.put_u8(self.sequence);
        buf.put_u16(self.sync_address);
        buf.put_u16(0);
        buf.freeze()
    }
}

/// E1.31 universe discovery packet (one page)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryPacket {
    pub cid: [u8; 16],
    pub source_name: SourceName,
    pub page: u8,
    pub last_page: u8,
    pub universes: Vec<u16>,
}

impl DiscoveryPacket {
    /// Split a universe list into sorted discovery pages of at most 512 entries
    pub fn pages(cid: [u8; 16], source_name: SourceName, universes: &[u16]) -> Vec<Self> {
        let mut sorted = universes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let chunks: Vec<&[u16]> = if sorted.is_empty() {
            vec![sorted.as_slice()]
        } else {
            sorted.chunks(DISCOVERY_UNIVERSES_PER_PAGE).collect()
        };
        let last_page = (chunks.len() - 1).min(255) as u8;

        chunks
            .into_iter()
            .take(256)
            .enumerate()
            .map(|(page, list)| Self {
                cid,
                source_name,
                page: page as u8,
                last_page,
                universes: list.to_vec(),
            })
            .collect()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < DISCOVERY_HEADER_SIZE {
            return Err(DecodeError::BufferTooSmall {
                needed: DISCOVERY_HEADER_SIZE,
                have: buf.len(),
            });
        }
        let mut r = read_root(buf)?;
        expect_vector(r.u32_be()?, VECTOR_ROOT_E131_EXTENDED)?;
        let cid = r.array::<16>()?;
        r.skip(2)?;
        expect_vector(r.u32_be()?, VECTOR_E131_EXTENDED_DISCOVERY)?;
        let source_name = SourceName::from_raw(r.array::<64>()?);
        r.skip(4)?;

        let layer_length = (r.u16_be()? & 0x0fff) as usize;
        expect_vector(r.u32_be()?, VECTOR_UNIVERSE_DISCOVERY_UNIVERSE_LIST)?;
        let page = r.u8()?;
        let last_page = r.u8()?;

        // Layer length counts from its own flags field at offset 112
        let list_bytes = layer_length
            .checked_sub(DISCOVERY_HEADER_SIZE - 112)
            .ok_or(DecodeError::InvalidField("discovery layer length"))?;
        if list_bytes > r.remaining() || list_bytes / 2 > DISCOVERY_UNIVERSES_PER_PAGE {
            return Err(DecodeError::LengthOverflow {
                declared: list_bytes,
                available: r.remaining(),
            });
        }
        let mut list = r.sub(list_bytes)?;
        let mut universes = Vec::with_capacity(list_bytes / 2);
        while list.remaining() >= 2 {
            universes.push(list.u16_be()?);
        }

        Ok(Self {
            cid,
            source_name,
            page,
            last_page,
            universes,
        })
    }

    pub fn encode(&self) -> std::result::Result<Bytes, EncodeError> {
        if self.universes.len() > DISCOVERY_UNIVERSES_PER_PAGE {
            return Err(EncodeError::PayloadTooLarge(self.universes.len()));
        }
        let total = DISCOVERY_HEADER_SIZE + self.universes.len() * 2;
        let mut buf = BytesMut::with_capacity(total);

        put_root(&mut buf, total, VECTOR_ROOT_E131_EXTENDED, &self.cid);

        buf.put_u16(FLAGS | (total - ROOT_LAYER_SIZE) as u16);
        buf.put_u32(VECTOR_E131_EXTENDED_DISCOVERY);
        buf.put_slice(self.source_name.as_raw());
        buf.put_u32(0);

        buf.put_u16(FLAGS | (total - 112) as u16);
        buf.put_u32(VECTOR_UNIVERSE_DISCOVERY_UNIVERSE_LIST);
        buf.put_u8(self.page);
        buf.put_u8(self.last_page);
        for universe in &self.universes {
            buf.put_u16(*universe);
        }

        Ok(buf.freeze())
    }
}
