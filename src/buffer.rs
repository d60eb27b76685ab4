//! Byte-level reader and writer primitives
//!
//! All multi-byte AMF3 primitives are network order (big-endian). One special
//! case survives from the format's history: the serialized NaN is the 8-byte
//! sequence below, which is the IEEE 754 quiet-NaN bit pattern as a
//! little-endian peer would lay it out. It is emitted as-is and recognized
//! as-is on input, regardless of host, so a NaN written by any peer is read
//! back as NaN by any peer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{AmfError, Result};

/// The canonical serialized NaN byte sequence
pub const CANONICAL_NAN: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF8, 0x7F];

/// Cursor over an immutable byte buffer
///
/// A reader carves cheaply into sub-regions that share the underlying buffer
/// but carry independent cursors; the decoder's object-reference table stores
/// such regions so back-references can be re-parsed later.
#[derive(Debug, Clone)]
pub struct ByteReader {
    data: Bytes,
    start: usize,
    cursor: usize,
    end: usize,
}

impl ByteReader {
    /// Create a reader over the whole buffer
    pub fn new(data: Bytes) -> Self {
        let end = data.len();
        Self {
            data,
            start: 0,
            cursor: 0,
            end,
        }
    }

    /// Bytes consumed since this region started
    pub fn consumed(&self) -> usize {
        self.cursor - self.start
    }

    /// Bytes left before the end of this region
    pub fn remaining(&self) -> usize {
        self.end - self.cursor
    }

    /// Carve a child region from the cursor to the end of this region
    ///
    /// The child shares the buffer but advances its own cursor.
    pub fn sub_region(&self) -> ByteReader {
        ByteReader {
            data: self.data.clone(),
            start: self.cursor,
            cursor: self.cursor,
            end: self.end,
        }
    }

    /// Carve a child region of at most `len` bytes from the cursor
    ///
    /// The end is clamped to this region's end; a child that came up short
    /// fails with `Truncated` when read past.
    pub fn sub_region_len(&self, len: usize) -> ByteReader {
        ByteReader {
            data: self.data.clone(),
            start: self.cursor,
            cursor: self.cursor,
            end: (self.cursor + len).min(self.end),
        }
    }

    /// Advance past `n` bytes and return them
    ///
    /// Fails with `Truncated` without moving the cursor if fewer than `n`
    /// bytes remain.
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.remaining() < n {
            return Err(AmfError::Truncated);
        }
        let at = self.cursor;
        self.cursor += n;
        Ok(&self.data[at..at + n])
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read `n` bytes as a slice
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.take(n)
    }

    /// Read a big-endian u16
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian u32
    pub fn read_u32_be(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian f64
    ///
    /// The canonical NaN sequence is recognized before any byte reordering.
    pub fn read_f64_be(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        if b == &CANONICAL_NAN[..] {
            return Ok(f64::NAN);
        }
        Ok(f64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read an AMF3 variable-length integer (1-4 bytes)
    ///
    /// The first three bytes contribute 7 bits each while their high bit
    /// flags a continuation; a fourth byte contributes all 8 bits. The result
    /// is sign-extended from 29 to 32 bits, yielding a value in
    /// -2^28 .. 2^28-1. With the `amflib-compat` feature the sign extension
    /// is skipped to match a legacy peer that omitted it.
    pub fn read_u29(&mut self) -> Result<i32> {
        self.read_u29_raw(!cfg!(feature = "amflib-compat"))
    }

    /// `read_u29` with the sign-extension mode chosen by the caller
    ///
    /// The cursor does not move if the input runs out mid-integer.
    pub(crate) fn read_u29_raw(&mut self, sign_extend: bool) -> Result<i32> {
        let checkpoint = self.cursor;
        let result = self.read_u29_inner(sign_extend);
        if result.is_err() {
            self.cursor = checkpoint;
        }
        result
    }

    fn read_u29_inner(&mut self, sign_extend: bool) -> Result<i32> {
        let mut result: i32 = 0;
        let mut byte = self.read_u8()?;
        let mut continuations = 0;
        while byte & 0x80 != 0 && continuations < 3 {
            result = (result << 7) | (byte & 0x7F) as i32;
            byte = self.read_u8()?;
            continuations += 1;
        }
        if continuations < 3 {
            result = (result << 7) | (byte & 0x7F) as i32;
        } else {
            // Fourth byte has no continuation flag; all 8 bits are data
            result = (result << 8) | byte as i32;
        }
        if sign_extend && result & 0x1000_0000 != 0 {
            result -= 0x2000_0000;
        }
        Ok(result)
    }
}

/// Append-only byte buffer mirroring [`ByteReader`]'s primitives
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: BytesMut,
}

impl ByteWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Create a writer with a specific initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append one byte
    pub fn write_u8(&mut self, byte: u8) {
        self.buf.put_u8(byte);
    }

    /// Append a byte slice
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Append an AMF3 variable-length integer
    ///
    /// Values below 2^7, 2^14, 2^21 and 2^29 take 1, 2, 3 and 4 bytes; the
    /// fourth byte carries all 8 bits with no continuation flag. Inputs
    /// outside 0 .. 2^29-1 fail with `RangeError`.
    pub fn write_u29(&mut self, n: i64) -> Result<()> {
        if !(0..0x2000_0000).contains(&n) {
            return Err(AmfError::RangeError(n));
        }
        let n = n as u32;
        if n < 0x80 {
            self.write_u8(n as u8);
        } else if n < 0x4000 {
            self.write_u8(0x80 | (n >> 7) as u8);
            self.write_u8((n & 0x7F) as u8);
        } else if n < 0x0020_0000 {
            self.write_u8(0x80 | (n >> 14) as u8);
            self.write_u8(0x80 | ((n >> 7) & 0x7F) as u8);
            self.write_u8((n & 0x7F) as u8);
        } else {
            self.write_u8(0x80 | (n >> 22) as u8);
            self.write_u8(0x80 | ((n >> 15) & 0x7F) as u8);
            self.write_u8(0x80 | ((n >> 8) & 0x7F) as u8);
            self.write_u8((n & 0xFF) as u8);
        }
        Ok(())
    }

    /// Append a big-endian f64
    ///
    /// NaN is written as the canonical sequence for bit-exact interop with
    /// legacy peers.
    pub fn write_f64_be(&mut self, v: f64) {
        if v.is_nan() {
            self.buf.put_slice(&CANONICAL_NAN);
        } else {
            self.buf.put_f64(v);
        }
    }

    /// Take the accumulated bytes, leaving the writer empty
    pub fn to_bytes(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
