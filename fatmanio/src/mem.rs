// SPDX-License-Identifier: MIT

use crate::{BlockIO, BlockIOError, BlockIOResult};

/// In-memory implementation of `BlockIO`.
///
/// Backs test volumes and images that were loaded fully into RAM.
#[derive(Debug)]
pub struct MemBlockIO<'a> {
    buffer: &'a mut [u8],
    partition_offset: u64,
    read_only: bool,
}

impl<'a> MemBlockIO<'a> {
    #[inline]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            partition_offset: 0,
            read_only: false,
        }
    }

    #[inline]
    pub fn new_with_offset(buffer: &'a mut [u8], partition_offset: u64) -> Self {
        Self {
            buffer,
            partition_offset,
            read_only: false,
        }
    }

    /// Same as [`MemBlockIO::new`] but refuses every write.
    #[inline]
    pub fn read_only(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            partition_offset: 0,
            read_only: true,
        }
    }

    #[inline]
    fn range(&self, offset: u64, len: usize) -> BlockIOResult<core::ops::Range<usize>> {
        let start = self
            .partition_offset
            .checked_add(offset)
            .ok_or(BlockIOError::OutOfBounds)?;
        let end = start
            .checked_add(len as u64)
            .ok_or(BlockIOError::OutOfBounds)?;
        if end > self.buffer.len() as u64 {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(start as usize..end as usize)
    }
}

impl<'a> BlockIO for MemBlockIO<'a> {
    #[inline(always)]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        if self.read_only {
            return Err(BlockIOError::ReadOnly);
        }
        let range = self.range(offset, data.len())?;
        self.buffer[range].copy_from_slice(data);
        Ok(())
    }

    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.buffer[range]);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> BlockIOResult {
        Ok(())
    }

    #[inline]
    fn capacity(&mut self) -> BlockIOResult<u64> {
        Ok((self.buffer.len() as u64).saturating_sub(self.partition_offset))
    }

    #[inline]
    fn partition_offset(&self) -> u64 {
        self.partition_offset
    }

    #[inline]
    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(all(test, feature = "std"))]
mod test {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_rw() {
        let mut buf = [0u8; 256];
        let mut io = MemBlockIO::new(&mut buf);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut buf = [0u8; 64];
        let mut io = MemBlockIO::new(&mut buf);
        assert_eq!(io.write_at(62, &[0; 4]), Err(BlockIOError::OutOfBounds));
        let mut out = [0u8; 1];
        assert_eq!(io.read_at(u64::MAX, &mut out), Err(BlockIOError::OutOfBounds));
    }

    #[test]
    fn test_offset_shifts_window() {
        let mut buf = [0u8; 128];
        {
            let mut io = MemBlockIO::new_with_offset(&mut buf, 64);
            assert_eq!(io.capacity().unwrap(), 64);
            io.write_u32_at(0, 0xDEADBEEF).unwrap();
        }
        assert_eq!(&buf[64..68], &0xDEADBEEFu32.to_le_bytes());
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let mut buf = [7u8; 32];
        let mut io = MemBlockIO::read_only(&mut buf);
        assert!(io.is_read_only());
        assert_eq!(io.write_at(0, &[1]), Err(BlockIOError::ReadOnly));
        assert_eq!(io.read_u8_at(0).unwrap(), 7);
    }

    #[test]
    fn test_chunks_streamed_read() {
        let mut buf = [0u8; 1024];
        let mut io = MemBlockIO::new(&mut buf);

        for i in 0..10u32 {
            io.write_u32_at(i as u64 * 4, i).unwrap();
        }

        let mut values = [0u32; 10];
        io.read_chunks_streamed::<4, _>(0, 10, 3, |i, bytes| {
            values[i] = u32::from_le_bytes(*bytes);
            true
        })
        .unwrap();

        for (i, v) in values.iter().enumerate() {
            assert_eq!(*v, i as u32);
        }
    }

    #[test]
    fn test_chunks_streamed_stops_early() {
        let mut buf = [0u8; 64];
        let mut io = MemBlockIO::new(&mut buf);
        let mut seen = 0;
        io.read_chunks_streamed::<4, _>(0, 16, 4, |i, _| {
            seen += 1;
            i < 5
        })
        .unwrap();
        assert_eq!(seen, 6);
    }

    #[test]
    fn test_zero_fill() {
        let mut buf = [0xFF; 64];
        let mut io = MemBlockIO::new(&mut buf);

        io.zero_fill(10, 8).unwrap();

        let mut output = [0xAA; 8];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [0u8; 8]);
    }
}
