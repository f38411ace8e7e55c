//! Bounds-checked byte reader
//!
//! Every decoder reads through a [`Reader`] so that a truncated or lying
//! datagram turns into a [`DecodeError`] instead of a panic. A reader is a
//! view over `buf[pos..limit]`; child readers for nested structures are
//! created with [`Reader::sub`] and can never see past their parent's limit.

use crate::{DecodeError, Result};

/// Cursor over a byte slice with an explicit end limit
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> Reader<'a> {
    /// Reader over the whole buffer
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            limit: buf.len(),
        }
    }

    /// Reader over `buf[offset..limit]`
    pub fn with_bounds(buf: &'a [u8], offset: usize, limit: usize) -> Result<Self> {
        if limit > buf.len() || offset > limit {
            return Err(DecodeError::LengthOverflow {
                declared: limit,
                available: buf.len(),
            });
        }
        Ok(Self {
            buf,
            pos: offset,
            limit,
        })
    }

    /// Absolute position in the underlying buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute end of this reader's window
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.limit
    }

    /// Underlying buffer (for handing an explicit triple to recursive readers)
    pub fn buffer(&self) -> &'a [u8] {
        self.buf
    }

    /// Split off a child reader covering the next `len` bytes and advance past them
    pub fn sub(&mut self, len: usize) -> Result<Reader<'a>> {
        self.ensure(len)?;
        let child = Reader {
            buf: self.buf,
            pos: self.pos,
            limit: self.pos + len,
        };
        self.pos += len;
        Ok(child)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    /// Move to an absolute offset inside the window
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.limit {
            return Err(DecodeError::BufferTooSmall {
                needed: offset,
                have: self.limit,
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16_be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32_be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn f32_le(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn ensure(&self, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(DecodeError::BufferTooSmall {
                needed: self.pos + len,
                have: self.limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_advance() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut r = Reader::new(&buf);
        assert_eq!(r.u8().unwrap(), 0x01);
        assert_eq!(r.u16_be().unwrap(), 0x0203);
        assert_eq!(r.u16_le().unwrap(), 0x0504);
        assert!(r.is_empty());
    }

    #[test]
    fn test_read_past_end_fails() {
        let buf = [0x01, 0x02];
        let mut r = Reader::new(&buf);
        assert_eq!(
            r.u32_be(),
            Err(DecodeError::BufferTooSmall { needed: 4, have: 2 })
        );
        // Failed read does not move the cursor
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_sub_reader_is_confined() {
        let buf = [1, 2, 3, 4, 5, 6];
        let mut r = Reader::new(&buf);
        r.skip(1).unwrap();
        let mut child = r.sub(2).unwrap();
        assert_eq!(child.bytes(2).unwrap(), &[2, 3]);
        assert!(child.u8().is_err());
        assert_eq!(r.u8().unwrap(), 4);
    }

    #[test]
    fn test_with_bounds_rejects_bad_window() {
        let buf = [0u8; 4];
        assert!(Reader::with_bounds(&buf, 2, 8).is_err());
        assert!(Reader::with_bounds(&buf, 3, 2).is_err());
        assert_eq!(Reader::with_bounds(&buf, 1, 3).unwrap().remaining(), 2);
    }
}
