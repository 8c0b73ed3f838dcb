// SPDX-License-Identifier: MIT

use std::io::{Error, ErrorKind, Read, Seek, SeekFrom, Write};

use crate::{BlockIO, BlockIOError, BlockIOResult};

/// `BlockIO` over any seekable stream, typically an image `File`.
#[derive(Debug)]
pub struct StdBlockIO<'a, T: Read + Write + Seek> {
    io: &'a mut T,
    partition_offset: u64,
    read_only: bool,
}

impl<'a, T: Read + Write + Seek> StdBlockIO<'a, T> {
    #[inline]
    pub fn new(io: &'a mut T) -> Self {
        Self {
            io,
            partition_offset: 0,
            read_only: false,
        }
    }

    #[inline]
    pub fn new_with_offset(io: &'a mut T, partition_offset: u64) -> Self {
        Self {
            io,
            partition_offset,
            read_only: false,
        }
    }

    /// Marks the handle read-only: writes fail with `BlockIOError::ReadOnly`
    /// before they reach the stream.
    #[inline]
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl<'a, T: Read + Write + Seek> BlockIO for StdBlockIO<'a, T> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        if self.read_only {
            return Err(BlockIOError::ReadOnly);
        }
        let abs_offset = self.partition_offset + offset;
        self.io.seek(SeekFrom::Start(abs_offset))?;
        self.io.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        let abs_offset = self.partition_offset + offset;
        self.io.seek(SeekFrom::Start(abs_offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> BlockIOResult {
        if !self.read_only {
            self.io.flush()?;
        }
        Ok(())
    }

    fn capacity(&mut self) -> BlockIOResult<u64> {
        let end = self.io.seek(SeekFrom::End(0))?;
        Ok(end.saturating_sub(self.partition_offset))
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

impl From<Error> for BlockIOError {
    #[cold]
    #[inline(never)]
    fn from(e: Error) -> Self {
        match e.kind() {
            ErrorKind::UnexpectedEof => BlockIOError::OutOfBounds,
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => BlockIOError::ReadOnly,
            ErrorKind::Unsupported => BlockIOError::Unsupported,
            _ => {
                // Leak the string to produce a 'static str.
                let leaked_str: &'static str = Box::leak(e.to_string().into_boxed_str());
                BlockIOError::Other(leaked_str)
            }
        }
    }
}
