// SPDX-License-Identifier: MIT

use crate::core::cursor::ClusterMeta;
use fatmanio::prelude::*;

/// Raw FAT entry access, parameterized by `ClusterMeta` (entry width and mask).
pub mod chain {
    use super::*;

    /// Reads the masked value of `cluster` from FAT copy `fat_index`.
    #[inline]
    pub fn read_entry<IO, M>(io: &mut IO, meta: &M, cluster: u32, fat_index: u8) -> BlockIOResult<u32>
    where
        IO: BlockIO + ?Sized,
        M: ClusterMeta,
    {
        Ok(read_raw(io, meta, cluster, fat_index)? & M::ENTRY_MASK)
    }

    /// Reads the full 32-bit word, reserved high bits included.
    #[inline]
    pub fn read_raw<IO, M>(io: &mut IO, meta: &M, cluster: u32, fat_index: u8) -> BlockIOResult<u32>
    where
        IO: BlockIO + ?Sized,
        M: ClusterMeta,
    {
        io.read_u32_at(meta.fat_entry_offset(cluster, fat_index))
    }

    /// Writes `value` into every FAT copy, keeping the bits outside `ENTRY_MASK`
    /// as they are on disk.
    pub fn write_entry_all<IO, M>(io: &mut IO, meta: &M, cluster: u32, value: u32) -> BlockIOResult
    where
        IO: BlockIO + ?Sized,
        M: ClusterMeta,
    {
        for fat_index in 0..meta.num_fats() {
            let raw = read_raw(io, meta, cluster, fat_index)?;
            let merged = (raw & !M::ENTRY_MASK) | (value & M::ENTRY_MASK);
            io.write_u32_at(meta.fat_entry_offset(cluster, fat_index), merged)?;
        }
        Ok(())
    }
}
