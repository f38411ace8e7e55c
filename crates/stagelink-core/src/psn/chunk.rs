//! Generic PSN chunk (TLV) reader and writer
//!
//! Chunk header (32-bit little-endian word):
//! ```text
//! ┌──────────────┬───────────────────────────────┬───┐
//! │ bits 0-15    │ bits 16-30                    │31 │
//! │ chunk id     │ payload length (bytes)        │ C │  C = has sub-chunks
//! └──────────────┴───────────────────────────────┴───┘
//! ```
//! The length never includes the header itself. A chunk either carries a
//! terminal payload or a run of child chunks that fill the payload exactly.
//!
//! Reading is done over explicit `(buffer, offset, limit)` triples; every
//! function returns the offset it stopped at instead of mutating shared
//! cursor state.

use bytes::{BufMut, BytesMut};

use crate::cursor::Reader;
use crate::{DecodeError, EncodeError, Result};

/// Largest payload the 15-bit length field can express
pub const MAX_CHUNK_LENGTH: usize = 0x7fff;

/// Decoded chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: u16,
    pub length: u16,
    pub has_children: bool,
}

impl ChunkHeader {
    pub const SIZE: usize = 4;

    pub fn from_word(word: u32) -> Self {
        Self {
            id: (word & 0xffff) as u16,
            length: ((word >> 16) & 0x7fff) as u16,
            has_children: (word & 0x8000_0000) != 0,
        }
    }

    pub fn to_word(&self) -> u32 {
        let mut word = self.id as u32 | ((self.length as u32 & 0x7fff) << 16);
        if self.has_children {
            word |= 0x8000_0000;
        }
        word
    }
}

/// A chunk located inside a datagram
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub header: ChunkHeader,
    buf: &'a [u8],
    start: usize,
    end: usize,
}

impl<'a> Chunk<'a> {
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Offset one past the end of this chunk's payload
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.buf[self.start..self.end]
    }

    /// Reader confined to this chunk's payload
    pub fn reader(&self) -> Reader<'a> {
        // start/end were validated when the chunk was read
        Reader::with_bounds(self.buf, self.start, self.end).unwrap_or_else(|_| Reader::new(&[]))
    }

    /// Visit each child chunk. Terminal chunks have no children to visit.
    pub fn children<F>(&self, visit: F) -> Result<usize>
    where
        F: FnMut(Chunk<'a>) -> Result<()>,
    {
        if !self.header.has_children {
            return Ok(self.end);
        }
        walk(self.buf, self.start, self.end, visit)
    }
}

/// Read the chunk starting at `offset`, never looking past `limit`.
///
/// Returns the chunk and the offset of the next sibling.
pub fn read_chunk(buf: &[u8], offset: usize, limit: usize) -> Result<(Chunk<'_>, usize)> {
    let mut r = Reader::with_bounds(buf, offset, limit)?;
    let header = ChunkHeader::from_word(r.u32_le()?);
    let start = r.position();
    let length = header.length as usize;
    if length > r.remaining() {
        return Err(DecodeError::LengthOverflow {
            declared: length,
            available: r.remaining(),
        });
    }
    let end = start + length;
    Ok((
        Chunk {
            header,
            buf,
            start,
            end,
        },
        end,
    ))
}

/// Visit every chunk in `buf[offset..limit]` in order.
///
/// Unknown ids are the visitor's business; the walker always advances by
/// the declared length, so skipping a chunk is just not looking at it.
/// Trailing bytes too short for a header are an error.
pub fn walk<'a, F>(buf: &'a [u8], mut offset: usize, limit: usize, mut visit: F) -> Result<usize>
where
    F: FnMut(Chunk<'a>) -> Result<()>,
{
    while offset < limit {
        let (chunk, next) = read_chunk(buf, offset, limit)?;
        visit(chunk)?;
        offset = next;
    }
    Ok(offset)
}

/// Append a chunk whose body is produced by `body`, patching the header length afterwards
pub fn write_chunk<F>(buf: &mut BytesMut, id: u16, has_children: bool, body: F) -> std::result::Result<(), EncodeError>
where
    F: FnOnce(&mut BytesMut) -> std::result::Result<(), EncodeError>,
{
    let start = buf.len();
    buf.put_u32_le(0);
    body(buf)?;

    let length = buf.len() - start - ChunkHeader::SIZE;
    if length > MAX_CHUNK_LENGTH {
        return Err(EncodeError::ChunkTooLarge(length));
    }

    let header = ChunkHeader {
        id,
        length: length as u16,
        has_children,
    };
    buf[start..start + ChunkHeader::SIZE].copy_from_slice(&header.to_word().to_le_bytes());
    Ok(())
}
