// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;

// Core modules
pub mod errors;
mod macros;

// Backend modules
#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::BlockIO;
    pub use super::BlockIOExt;
    #[cfg(feature = "alloc")]
    pub use super::BlockIOStreamExt;
    pub use super::BlockIOStructExt;
    pub use super::errors::*;

    #[cfg(feature = "mem")]
    pub use super::mem::MemBlockIO;

    #[cfg(feature = "std")]
    pub use super::std::StdBlockIO;
}

// Internal use
use errors::*;

// Constants

/// Size of the internal scratch buffer used by streamed and chunked helpers.
/// Matches the largest sector size a FAT volume may declare.
pub const BLOCK_BUF_SIZE: usize = 4096;

// Traits

/// Byte-addressable region over a whole volume image.
///
/// Offsets are relative to the start of the volume; backends add their own
/// `partition_offset` when the volume lives inside a larger disk image.
pub trait BlockIO {
    /// Writes `data` at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult;

    /// Reads `buf.len()` bytes into `buf` from `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> BlockIOResult;

    /// Number of addressable bytes after `partition_offset`.
    fn capacity(&mut self) -> BlockIOResult<u64>;

    /// Absolute offset of the volume inside the backing storage.
    fn partition_offset(&self) -> u64;

    /// `true` when every write will be refused.
    fn is_read_only(&self) -> bool {
        false
    }
}

/// Convenience helpers layered on top of [`BlockIO`].
///
/// - chunked reads
/// - zero fill
/// - little-endian primitive accessors (`read_u32_at`, `write_u16_at`, ...)
pub trait BlockIOExt: BlockIO {
    /// Reads `buf.len()` bytes from `offset` in chunks of `chunk_size` or less.
    #[inline(always)]
    fn read_in_chunks(&mut self, offset: u64, buf: &mut [u8], chunk_size: usize) -> BlockIOResult {
        let mut off = offset;
        for part in buf.chunks_mut(chunk_size.max(1)) {
            self.read_at(off, part)?;
            off += part.len() as u64;
        }
        Ok(())
    }

    /// Fills a region with zeroes.
    ///
    /// Used to clear freshly allocated clusters and FAT regions.
    #[inline(always)]
    fn zero_fill(&mut self, offset: u64, len: usize) -> BlockIOResult {
        const ZERO_BUF: [u8; BLOCK_BUF_SIZE] = [0u8; BLOCK_BUF_SIZE];
        let mut remaining = len;
        let mut off = offset;
        while remaining > 0 {
            let chunk = remaining.min(ZERO_BUF.len());
            self.write_at(off, &ZERO_BUF[..chunk])?;
            off += chunk as u64;
            remaining -= chunk;
        }
        Ok(())
    }

    // Little-endian accessors for u8 .. u64
    blockio_impl_primitive_rw!(u8, u16, u32, u64);
}

impl<T: BlockIO + ?Sized> BlockIOExt for T {}

#[cfg(feature = "alloc")]
pub trait BlockIOStreamExt: BlockIO {
    /// Stream-read `count` fixed-size elements of `N` bytes, `chunk` elements per IO.
    ///
    /// The callback returns `false` to stop early (e.g. once enough free FAT
    /// entries were collected).
    fn read_chunks_streamed<const N: usize, F>(
        &mut self,
        offset: u64,
        count: usize,
        chunk: usize,
        f: F,
    ) -> BlockIOResult
    where
        F: FnMut(usize, &[u8; N]) -> bool;
}

#[cfg(feature = "alloc")]
impl<T: BlockIO + ?Sized> BlockIOStreamExt for T {
    #[inline]
    fn read_chunks_streamed<const N: usize, F>(
        &mut self,
        offset: u64,
        count: usize,
        chunk: usize,
        mut f: F,
    ) -> BlockIOResult
    where
        F: FnMut(usize, &[u8; N]) -> bool,
    {
        let chunk = chunk.max(1);
        let mut buf = vec![0u8; chunk * N];

        let mut remaining = count;
        let mut current_offset = offset;
        let mut index = 0;

        while remaining > 0 {
            let to_read = remaining.min(chunk);
            let bytes_to_read = to_read * N;
            self.read_in_chunks(current_offset, &mut buf[..bytes_to_read], BLOCK_BUF_SIZE)?;

            for element in buf[..bytes_to_read].chunks_exact(N) {
                let Ok(element) = <&[u8; N]>::try_from(element) else {
                    return Err(BlockIOError::Other("stream element size mismatch"));
                };
                if !f(index, element) {
                    return Ok(());
                }
                index += 1;
            }

            current_offset += bytes_to_read as u64;
            remaining -= to_read;
        }

        Ok(())
    }
}

/// Reads and writes `zerocopy` structures at byte offsets.
///
/// On-disk records are declared with little-endian field types, so no
/// byte swapping happens here.
pub trait BlockIOStructExt: BlockIO {
    /// Reads a struct of type `T` from the given offset.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> BlockIOResult<T> {
        let size = core::mem::size_of::<T>();
        if size > BLOCK_BUF_SIZE {
            return Err(BlockIOError::Other("read_struct: type too large"));
        }
        let mut buf = [0u8; BLOCK_BUF_SIZE];
        self.read_at(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| BlockIOError::Other("read_struct failed"))
    }

    /// Writes a struct of type `T` at the given offset.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
        val: &T,
    ) -> BlockIOResult {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: BlockIO + ?Sized> BlockIOStructExt for T {}
