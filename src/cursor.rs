//! Bounds-checked little-endian reads over a borrowed byte buffer.
//!
//! [`ByteCursor`] never copies: fixed-width reads hand back sub-slices of
//! the underlying buffer and scalar reads decode in place through
//! `byteorder`.  A read either consumes exactly its width or fails with
//! [`FormatError::TruncatedInput`] and leaves the cursor where it was.
//!
//! Cursors created by [`ByteCursor::take`] or [`ByteCursor::at`] remember the
//! absolute offset of their first byte, so errors raised deep inside a nested
//! record still report positions in the outermost input.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{FormatError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    buf:  &'a [u8],
    pos:  usize,
    base: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    /// A cursor over `buf` whose first byte sits at absolute offset `base`.
    pub fn with_base(buf: &'a [u8], base: usize) -> Self {
        Self { buf, pos: 0, base }
    }

    // ── Position ─────────────────────────────────────────────────────────────

    pub fn position(&self) -> usize { self.pos }

    pub fn absolute_position(&self) -> usize { self.base + self.pos }

    pub fn remaining_len(&self) -> usize { self.buf.len() - self.pos }

    pub fn is_empty(&self) -> bool { self.remaining_len() == 0 }

    /// Everything not yet consumed.
    pub fn rest(&self) -> &'a [u8] { &self.buf[self.pos..] }

    /// The whole underlying view, consumed or not.
    pub fn buffer(&self) -> &'a [u8] { self.buf }

    /// A fresh cursor positioned at `offset` within the same view.
    pub fn at(&self, offset: usize) -> Result<ByteCursor<'a>> {
        if offset > self.buf.len() {
            return Err(FormatError::TruncatedInput {
                offset:    self.base + self.buf.len(),
                wanted:    offset - self.buf.len(),
                available: 0,
            });
        }
        Ok(Self { buf: self.buf, pos: offset, base: self.base })
    }

    // ── Slicing ──────────────────────────────────────────────────────────────

    /// Split the unread bytes into `(taken, remainder)` without moving `self`.
    pub fn slice(&self, len: usize) -> Result<(ByteCursor<'a>, ByteCursor<'a>)> {
        self.ensure(len)?;
        let start = self.pos;
        let taken = Self::with_base(&self.buf[start..start + len], self.base + start);
        let remainder = Self { buf: self.buf, pos: start + len, base: self.base };
        Ok((taken, remainder))
    }

    /// Consume `len` bytes as a child cursor.
    pub fn take(&mut self, len: usize) -> Result<ByteCursor<'a>> {
        let (taken, remainder) = self.slice(len)?;
        *self = remainder;
        Ok(taken)
    }

    // ── Raw reads ────────────────────────────────────────────────────────────

    pub fn read_fixed(&mut self, width: usize) -> Result<&'a [u8]> {
        self.ensure(width)?;
        let bytes = &self.buf[self.pos..self.pos + width];
        self.pos += width;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_fixed(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, width: usize) -> Result<()> {
        self.read_fixed(width).map(|_| ())
    }

    /// Read a must-be-zero region, failing with
    /// [`FormatError::ReservedFieldViolation`] if any byte is set.  The cursor
    /// does not advance on failure.
    pub fn read_reserved(&mut self, width: usize) -> Result<&'a [u8]> {
        let offset = self.absolute_position();
        self.read_struct(|c| {
            let bytes = c.read_fixed(width)?;
            if bytes.iter().any(|&b| b != 0) {
                return Err(FormatError::ReservedFieldViolation { offset, len: width });
            }
            Ok(bytes)
        })
    }

    // ── Scalars ──────────────────────────────────────────────────────────────

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_fixed(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_fixed(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_fixed(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.read_fixed(8)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.read_fixed(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.read_fixed(4)?))
    }

    pub fn read_f32s<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0f32; N];
        LittleEndian::read_f32_into(self.read_fixed(N * 4)?, &mut out);
        Ok(out)
    }

    pub fn read_u16s<const N: usize>(&mut self) -> Result<[u16; N]> {
        let mut out = [0u16; N];
        LittleEndian::read_u16_into(self.read_fixed(N * 2)?, &mut out);
        Ok(out)
    }

    pub fn read_u32s<const N: usize>(&mut self) -> Result<[u32; N]> {
        let mut out = [0u32; N];
        LittleEndian::read_u32_into(self.read_fixed(N * 4)?, &mut out);
        Ok(out)
    }

    // ── Grouped reads ────────────────────────────────────────────────────────

    /// Decode a fixed group of fields atomically: either `f` succeeds and the
    /// cursor stays past every field it read, or the cursor is restored to
    /// where it was before the call.
    pub fn read_struct<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ByteCursor<'a>) -> Result<T>,
    {
        let mut probe = *self;
        let value = f(&mut probe)?;
        *self = probe;
        Ok(value)
    }

    fn ensure(&self, width: usize) -> Result<()> {
        let available = self.remaining_len();
        if width > available {
            return Err(FormatError::TruncatedInput {
                offset: self.absolute_position(),
                wanted: width,
                available,
            });
        }
        Ok(())
    }
}

/// Decode a NUL-padded fixed-width string field.  The field must contain a
/// terminator and the bytes before it must be UTF-8.
pub fn nul_terminated(field: &[u8], offset: usize) -> Result<&str> {
    let end = field.iter().position(|&b| b == 0)
        .ok_or_else(|| FormatError::mismatch(offset, "string field is not NUL-terminated"))?;
    std::str::from_utf8(&field[..end])
        .map_err(|_| FormatError::mismatch(offset, "string field is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_reads_are_little_endian() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xff, 0xff, 0xff, 0xff];
        let mut c = ByteCursor::new(&bytes);
        assert_eq!(c.read_u16().unwrap(), 0x0201);
        assert_eq!(c.read_u32().unwrap(), 0x0605_0403);
        assert_eq!(c.read_i32().unwrap(), -1);
        assert!(c.is_empty());
    }

    #[test]
    fn truncated_read_does_not_move() {
        let bytes = [1u8, 2, 3];
        let mut c = ByteCursor::new(&bytes);
        c.read_u8().unwrap();
        match c.read_u32() {
            Err(FormatError::TruncatedInput { offset, wanted, available }) => {
                assert_eq!((offset, wanted, available), (1, 4, 2));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn read_struct_is_atomic() {
        let bytes = [0u8; 6];
        let mut c = ByteCursor::new(&bytes);
        let r = c.read_struct(|c| {
            let a = c.read_u32()?;
            let b = c.read_u32()?;
            Ok((a, b))
        });
        assert!(r.is_err());
        assert_eq!(c.position(), 0);

        let (a, b) = c.read_struct(|c| Ok((c.read_u32()?, c.read_u16()?))).unwrap();
        assert_eq!((a, b), (0, 0));
        assert!(c.is_empty());
    }

    #[test]
    fn child_cursors_report_absolute_offsets() {
        let bytes = [0u8; 16];
        let mut c = ByteCursor::new(&bytes);
        c.skip(4).unwrap();
        let mut child = c.take(8).unwrap();
        assert_eq!(c.position(), 12);
        child.skip(6).unwrap();
        match child.read_u32() {
            Err(FormatError::TruncatedInput { offset, .. }) => assert_eq!(offset, 10),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn slice_leaves_original_untouched() {
        let bytes = *b"abcdef";
        let c = ByteCursor::new(&bytes);
        let (taken, rest) = c.slice(2).unwrap();
        assert_eq!(taken.rest(), b"ab");
        assert_eq!(rest.rest(), b"cdef");
        assert_eq!(c.position(), 0);
        assert!(c.slice(7).is_err());
    }

    #[test]
    fn reserved_regions_must_be_zero() {
        let bytes = [0u8, 0, 0, 1];
        let mut c = ByteCursor::new(&bytes);
        assert!(c.read_reserved(3).is_ok());
        let mut c = ByteCursor::new(&bytes);
        match c.read_reserved(4) {
            Err(FormatError::ReservedFieldViolation { offset, len }) => assert_eq!((offset, len), (0, 4)),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn nul_terminated_strings() {
        assert_eq!(nul_terminated(b"abc\0\0\0", 0).unwrap(), "abc");
        assert_eq!(nul_terminated(b"\0abc", 0).unwrap(), "");
        assert!(nul_terminated(b"abc", 0).is_err());
    }
}
