//! Bounds-checked little-endian reads over an image buffer.

use crate::error::UnreadableImageError;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ByteView<'a> {
    data: &'a [u8],
}

impl<'a> ByteView<'a> {
    pub(crate) const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub(crate) const fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], UnreadableImageError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| truncated(offset, len))
    }

    pub(crate) fn u8(&self, offset: usize) -> Result<u8, UnreadableImageError> {
        self.data.get(offset).copied().ok_or_else(|| truncated(offset, 1))
    }

    pub(crate) fn u16(&self, offset: usize) -> Result<u16, UnreadableImageError> {
        Ok(u16::from_le_bytes(self.array(offset)?))
    }

    pub(crate) fn u32(&self, offset: usize) -> Result<u32, UnreadableImageError> {
        Ok(u32::from_le_bytes(self.array(offset)?))
    }

    pub(crate) fn u64(&self, offset: usize) -> Result<u64, UnreadableImageError> {
        Ok(u64::from_le_bytes(self.array(offset)?))
    }

    /// Reads a 2- or 4-byte index column.
    pub(crate) fn index(&self, offset: usize, width: usize) -> Result<u32, UnreadableImageError> {
        match width {
            2 => self.u16(offset).map(u32::from),
            _ => self.u32(offset),
        }
    }

    /// Null-terminated string starting at `offset`, bounded by `end`.
    pub(crate) fn c_str(&self, offset: usize, end: usize) -> Result<&'a [u8], UnreadableImageError> {
        let bytes = self.data.get(offset..end.min(self.data.len())).ok_or_else(|| truncated(offset, 1))?;
        let len = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| UnreadableImageError::format(format!("unterminated string at 0x{offset:X}")))?;
        Ok(&bytes[..len])
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], UnreadableImageError> {
        let bytes = self.slice(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

fn truncated(offset: usize, len: usize) -> UnreadableImageError {
    UnreadableImageError::format(format!("truncated image: {len} byte(s) at 0x{offset:X}"))
}
