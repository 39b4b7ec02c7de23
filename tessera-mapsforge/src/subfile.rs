use bytes::{Buf, Bytes};

use crate::error::MapsforgeError;

/// Cursor over a bounded region of a map file.
///
/// Fixed-width values are big-endian. Variable-length values use the mapsforge VBE encoding:
/// 7 payload bits per byte, least significant group first, high bit set on every byte except the
/// last. In the signed variant the last byte carries 6 payload bits and a sign flag (`0x40`).
#[derive(Debug, Clone)]
pub struct SubFile {
    data: Bytes,
    pos: usize,
}

impl SubFile {
    /// Creates a cursor at the start of the region.
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Current position relative to the start of the region.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Size of the region.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the region is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Moves the cursor to the absolute position. Seeking to the very end is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<(), MapsforgeError> {
        if pos > self.data.len() {
            return Err(MapsforgeError::UnexpectedEnd(pos));
        }

        self.pos = pos;
        Ok(())
    }

    /// Moves the cursor forward.
    pub fn skip(&mut self, len: usize) -> Result<(), MapsforgeError> {
        let pos = self
            .pos
            .checked_add(len)
            .ok_or(MapsforgeError::UnexpectedEnd(self.pos))?;
        self.seek(pos)
    }

    fn chunk(&mut self, len: usize) -> Result<&[u8], MapsforgeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(MapsforgeError::UnexpectedEnd(self.pos))?;
        let chunk = &self.data[self.pos..end];
        self.pos = end;
        Ok(chunk)
    }

    /// Reads `len` raw bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, MapsforgeError> {
        let start = self.pos;
        self.chunk(len)?;
        Ok(self.data.slice(start..self.pos))
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, MapsforgeError> {
        Ok(self.chunk(1)?.get_u8())
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, MapsforgeError> {
        Ok(self.chunk(2)?.get_u16())
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, MapsforgeError> {
        Ok(self.chunk(4)?.get_i32())
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, MapsforgeError> {
        Ok(self.chunk(4)?.get_u32())
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, MapsforgeError> {
        Ok(self.chunk(8)?.get_u64())
    }

    /// Reads a 5-byte big-endian value used by tile index pointers.
    pub fn read_u40(&mut self) -> Result<u64, MapsforgeError> {
        Ok(self.chunk(5)?.get_uint(5))
    }

    /// Reads an unsigned variable-length integer.
    pub fn read_vu32(&mut self) -> Result<u32, MapsforgeError> {
        let start = self.pos;
        let mut value = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }

            shift += 7;
            if shift > 28 {
                return Err(MapsforgeError::VarintOverflow(start));
            }
        }

        u32::try_from(value).map_err(|_| MapsforgeError::VarintOverflow(start))
    }

    /// Reads a signed variable-length integer.
    pub fn read_vs32(&mut self) -> Result<i32, MapsforgeError> {
        let start = self.pos;
        let mut value = 0i64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            if byte & 0x80 == 0 {
                value |= ((byte & 0x3F) as i64) << shift;
                if byte & 0x40 != 0 {
                    value = -value;
                }
                break;
            }

            value |= ((byte & 0x7F) as i64) << shift;
            shift += 7;
            if shift > 28 {
                return Err(MapsforgeError::VarintOverflow(start));
            }
        }

        i32::try_from(value).map_err(|_| MapsforgeError::VarintOverflow(start))
    }

    /// Reads a string prefixed with its byte length as an unsigned varint.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected.
    pub fn read_string(&mut self) -> Result<String, MapsforgeError> {
        let len = self.read_vu32()? as usize;
        Ok(String::from_utf8_lossy(self.chunk(len)?).into_owned())
    }
}
