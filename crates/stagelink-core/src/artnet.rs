//! Art-Net ArtDmx encoding/decoding
//!
//! ArtDmx packet format:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Byte 0-7:   ID "Art-Net\0"                                      │
//! │ Byte 8-9:   OpCode 0x5000 (little-endian)                       │
//! │ Byte 10-11: Protocol version 14 (big-endian)                    │
//! │ Byte 12:    Sequence (0 = disabled)                             │
//! │ Byte 13:    Physical input port                                 │
//! │ Byte 14-15: Port-Address / universe (little-endian)             │
//! │ Byte 16-17: Data length (big-endian, even, 2..=512)             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Data (length bytes)                                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::cursor::Reader;
use crate::{DecodeError, EncodeError, Result, DMX_CHANNELS};

/// Packet identifier
pub const ARTNET_ID: &[u8; 8] = b"Art-Net\0";

/// OpDmx
pub const OP_DMX: u16 = 0x5000;

/// Protocol revision sent in every packet
pub const PROTOCOL_VERSION: u16 = 14;

/// Header size up to and including the length field
pub const HEADER_SIZE: usize = 18;

/// A decoded ArtDmx packet borrowing its payload from the datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtDmx<'a> {
    pub sequence: u8,
    pub physical: u8,
    pub universe: u16,
    pub data: &'a [u8],
}

impl<'a> ArtDmx<'a> {
    /// Decode an ArtDmx datagram.
    ///
    /// The declared length is clamped to 512 before it is checked against
    /// the bytes actually present.
    pub fn decode(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::BufferTooSmall {
                needed: HEADER_SIZE,
                have: buf.len(),
            });
        }

        let mut r = Reader::new(buf);
        if r.bytes(8)? != ARTNET_ID {
            return Err(DecodeError::InvalidSignature);
        }

        let opcode = r.u16_le()?;
        if opcode != OP_DMX {
            return Err(DecodeError::UnsupportedOpcode(opcode));
        }

        let _version = r.u16_be()?;
        let sequence = r.u8()?;
        let physical = r.u8()?;
        let universe = r.u16_le()?;
        let length = (r.u16_be()? as usize).min(DMX_CHANNELS);

        if length > r.remaining() {
            return Err(DecodeError::LengthOverflow {
                declared: length,
                available: r.remaining(),
            });
        }

        Ok(Self {
            sequence,
            physical,
            universe,
            data: r.bytes(length)?,
        })
    }

    /// Encode to a complete datagram
    pub fn encode(&self) -> std::result::Result<Bytes, EncodeError> {
        encode_dmx(self.sequence, self.universe, self.data)
    }
}

/// Encoded data length for `channels` payload bytes: even, at least 2
pub fn wire_length(channels: usize) -> usize {
    (channels.max(2) + 1) & !1
}

/// Build an ArtDmx datagram for one universe
pub fn encode_dmx(sequence: u8, universe: u16, data: &[u8]) -> std::result::Result<Bytes, EncodeError> {
    if data.len() > DMX_CHANNELS {
        return Err(EncodeError::PayloadTooLarge(data.len()));
    }
    if universe > 0x7fff {
        return Err(EncodeError::UniverseOutOfRange(universe));
    }

    let length = wire_length(data.len());
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + length);

    buf.put_slice(ARTNET_ID);
    buf.put_u16_le(OP_DMX);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u8(sequence);
    buf.put_u8(0);
    buf.put_u16_le(universe);
    buf.put_u16(length as u16);
    buf.put_slice(data);
    buf.put_bytes(0, length - data.len());

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = encode_dmx(7, 0x0102, &[0xff; 512]).unwrap();

        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x50]);
        assert_eq!(&packet[10..12], &[0x00, 14]);
        assert_eq!(packet[12], 7);
        assert_eq!(packet[13], 0);
        assert_eq!(&packet[14..16], &[0x02, 0x01]);
        assert_eq!(&packet[16..18], &[0x02, 0x00]);
        assert_eq!(packet.len(), 18 + 512);
    }

    #[test]
    fn test_odd_length_is_padded() {
        let packet = encode_dmx(1, 0, &[1, 2, 3]).unwrap();
        assert_eq!(&packet[16..18], &[0x00, 0x04]);
        assert_eq!(&packet[18..], &[1, 2, 3, 0]);
    }

    #[test]
    fn test_empty_payload_has_minimum_length() {
        let packet = encode_dmx(1, 0, &[]).unwrap();
        assert_eq!(&packet[16..18], &[0x00, 0x02]);
        assert_eq!(packet.len(), 20);
    }

    #[test]
    fn test_decode_roundtrip() {
        let data: Vec<u8> = (0..10).collect();
        let packet = encode_dmx(42, 300, &data).unwrap();
        let dmx = ArtDmx::decode(&packet).unwrap();
        assert_eq!(dmx.universe, 300);
        assert_eq!(dmx.sequence, 42);
        assert_eq!(dmx.data, data.as_slice());
    }

    #[test]
    fn test_rejects_short_and_foreign_packets() {
        assert!(matches!(
            ArtDmx::decode(&[0u8; 17]),
            Err(DecodeError::BufferTooSmall { .. })
        ));

        let mut packet = encode_dmx(1, 0, &[0; 4]).unwrap().to_vec();
        packet[0] = b'X';
        assert_eq!(ArtDmx::decode(&packet), Err(DecodeError::InvalidSignature));

        let mut poll = encode_dmx(1, 0, &[0; 4]).unwrap().to_vec();
        poll[8..10].copy_from_slice(&0x2000u16.to_le_bytes());
        assert_eq!(ArtDmx::decode(&poll), Err(DecodeError::UnsupportedOpcode(0x2000)));
    }

    #[test]
    fn test_length_beyond_buffer_is_rejected() {
        let mut packet = encode_dmx(1, 0, &[0; 4]).unwrap().to_vec();
        packet[16..18].copy_from_slice(&100u16.to_be_bytes());
        assert!(matches!(
            ArtDmx::decode(&packet),
            Err(DecodeError::LengthOverflow { declared: 100, .. })
        ));
    }

    #[test]
    fn test_oversized_length_is_clamped() {
        let mut packet = encode_dmx(1, 0, &[5; 512]).unwrap().to_vec();
        packet[16..18].copy_from_slice(&600u16.to_be_bytes());
        packet.extend_from_slice(&[9; 88]);
        let dmx = ArtDmx::decode(&packet).unwrap();
        assert_eq!(dmx.data.len(), 512);
    }

    #[test]
    fn test_encode_rejects_oversize() {
        assert_eq!(
            encode_dmx(1, 0, &[0; 513]),
            Err(EncodeError::PayloadTooLarge(513))
        );
        assert_eq!(
            encode_dmx(1, 0x8000, &[0; 2]),
            Err(EncodeError::UniverseOutOfRange(0x8000))
        );
    }
}
