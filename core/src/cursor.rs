use crate::error::{CoreError, CoreResult};

/// A positional reader over an in-memory byte slice.
///
/// Scoped to a single parse; there is no aliasing concern because every
/// cursor is owned by exactly one call stack and the core is single-threaded.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn has_more(&self) -> bool {
        self.offset < self.data.len()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Moves the cursor to an absolute offset without reading.
    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn peek(&self, n: usize) -> &'a [u8] {
        let end = (self.offset + n).min(self.data.len());
        &self.data[self.offset..end]
    }

    pub fn read(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.offset + n > self.data.len() {
            return Err(CoreError::ReadPastEnd {
                offset: self.offset,
                need: n,
                len: self.data.len(),
            });
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, n: usize) -> CoreResult<Vec<u8>> {
        Ok(self.read(n)?.to_vec())
    }

    pub fn read_u8(&mut self) -> CoreResult<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16(&mut self) -> CoreResult<u16> {
        let b = self.read(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> CoreResult<u32> {
        let b = self.read(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> CoreResult<u64> {
        let b = self.read(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i32(&mut self) -> CoreResult<i32> {
        let b = self.read(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a 32-byte hash in wire order (little-endian, as stored).
    pub fn read_hash(&mut self) -> CoreResult<[u8; 32]> {
        let b = self.read(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(b);
        Ok(hash)
    }

    /// CompactSize: 1/3/5/9-byte prefix-length integer, distinct from
    /// [`crate::varint::read_core_varint`].
    pub fn read_compact_size(&mut self) -> CoreResult<u64> {
        let first = self.read_u8()?;
        match first {
            0xFD => Ok(self.read_u16()? as u64),
            0xFE => Ok(self.read_u32()? as u64),
            0xFF => self.read_u64(),
            n => Ok(n as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fixed_width() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.read_u8().unwrap(), 0x01);
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.read_u16().unwrap(), 0x0201);
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.read_u32().unwrap(), 0x04030201);
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.read_u64().unwrap(), 0x0807060504030201);
    }

    #[test]
    fn read_past_end_fails() {
        let data = [0x00u8; 2];
        let mut c = ByteCursor::new(&data);
        assert!(c.read_u32().is_err());
    }

    #[test]
    fn compact_size_one_byte() {
        let data = [0xFCu8];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.read_compact_size().unwrap(), 0xFC);
    }

    #[test]
    fn compact_size_u16_prefix() {
        let data = [0xFDu8, 0x34, 0x12];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.read_compact_size().unwrap(), 0x1234);
    }

    #[test]
    fn compact_size_u32_prefix() {
        let data = [0xFEu8, 0x78, 0x56, 0x34, 0x12];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.read_compact_size().unwrap(), 0x12345678);
    }

    #[test]
    fn compact_size_u64_prefix() {
        let data = [0xFFu8, 1, 0, 0, 0, 0, 0, 0, 0];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.read_compact_size().unwrap(), 1);
    }

    #[test]
    fn seek_and_peek_do_not_advance() {
        let data = [1u8, 2, 3, 4];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.peek(2), &[1, 2]);
        assert_eq!(c.offset(), 0);
        c.seek(2);
        assert_eq!(c.read_u8().unwrap(), 3);
    }
}
