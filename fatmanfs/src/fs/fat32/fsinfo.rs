// SPDX-License-Identifier: MIT

use log::{debug, warn};

use crate::{
    core::errors::*,
    fs::fat32::{constant::*, geometry::VolumeGeometry, table::ChainTable, types::Fat32FsInfo},
};
use fatmanio::prelude::*;

/// Advisory free-cluster count and next-free suggestion (FSInfo sector).
///
/// Kept in memory and written through to the primary FSInfo sector on every
/// change. The FAT stays authoritative; see [`FreeSpaceHint::rebuild`].
#[derive(Debug, Clone, Copy)]
pub struct FreeSpaceHint {
    offset: u64,
    free_count: u32,
    next_free: u32,
}

impl FreeSpaceHint {
    /// Reads and validates the FSInfo sector.
    ///
    /// An unknown (`0xFFFFFFFF`) or impossible free count is recomputed from
    /// the FAT and, when the image is writable, stored back.
    pub fn load<IO: BlockIO + ?Sized>(
        io: &mut IO,
        geometry: &VolumeGeometry,
        table: &ChainTable,
    ) -> FsVolumeResult<Self> {
        let offset = geometry.sector_offset(geometry.fsinfo_sector as u64);
        let raw: Fat32FsInfo = io.read_struct(offset)?;
        if !raw.has_valid_signatures() {
            return Err(FsVolumeError::BadFsInfoSignature);
        }

        let mut hint = Self {
            offset,
            free_count: raw.free_cluster_count.get(),
            next_free: raw.next_free_cluster.get(),
        };

        if hint.free_count == FAT_FSINFO_UNKNOWN || hint.free_count > geometry.cluster_count {
            warn!(
                "FSInfo free count {:#x} is unusable, rebuilding it from the FAT",
                hint.free_count
            );
            hint.recount(io, table).map_err(chain_to_volume)?;
            if !io.is_read_only() {
                hint.store(io)?;
            }
        }

        debug!("free-space hint: free={} next={}", hint.free_count, hint.next_free);
        Ok(hint)
    }

    #[inline]
    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    #[inline]
    pub fn next_free(&self) -> u32 {
        self.next_free
    }

    pub fn set_free_count<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, count: u32) -> BlockIOResult {
        self.free_count = count;
        io.write_u32_at(self.offset + FAT_FSINFO_FREE_COUNT_OFFSET, count)
    }

    pub fn set_next_free<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, cluster: u32) -> BlockIOResult {
        self.next_free = cluster;
        io.write_u32_at(self.offset + FAT_FSINFO_NEXT_FREE_OFFSET, cluster)
    }

    /// Records an allocation of `count` clusters ending at `last`.
    pub fn consume<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, count: u32, last: u32) -> BlockIOResult {
        if count == 0 {
            return Ok(());
        }
        self.set_free_count(io, self.free_count.saturating_sub(count))?;
        self.set_next_free(io, last.saturating_add(1))
    }

    /// Records that `count` clusters went back to the free pool.
    pub fn release<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, count: u32) -> BlockIOResult {
        if count == 0 {
            return Ok(());
        }
        self.set_free_count(io, self.free_count.saturating_add(count))
    }

    /// Recomputes both fields from a full FAT scan and stores them.
    pub fn rebuild<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, table: &ChainTable) -> FsChainResult {
        self.recount(io, table)?;
        self.store(io)?;
        Ok(())
    }

    fn recount<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, table: &ChainTable) -> FsChainResult {
        self.free_count = table.count_free(io)?;
        self.next_free = match table.find_free(io, 1)? {
            Some(first) => first[0],
            None => FAT_FSINFO_UNKNOWN,
        };
        Ok(())
    }

    fn store<IO: BlockIO + ?Sized>(&self, io: &mut IO) -> BlockIOResult {
        io.write_u32_at(self.offset + FAT_FSINFO_FREE_COUNT_OFFSET, self.free_count)?;
        io.write_u32_at(self.offset + FAT_FSINFO_NEXT_FREE_OFFSET, self.next_free)
    }
}

fn chain_to_volume(e: FsChainError) -> FsVolumeError {
    match e {
        FsChainError::IO(io) => FsVolumeError::IO(io),
        _ => FsVolumeError::InvalidGeometry("FAT cannot be scanned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat32::test_utils::*;

    fn fsinfo_offset(g: &VolumeGeometry) -> u64 {
        g.sector_offset(g.fsinfo_sector as u64)
    }

    #[test]
    fn loads_and_tracks_changes() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        let table = ChainTable::new(g);

        let mut hint = FreeSpaceHint::load(&mut io, &g, &table).unwrap();
        assert_eq!(hint.free_count(), table.count_free(&mut io).unwrap());
        assert_eq!(hint.next_free(), 3);

        hint.consume(&mut io, 4, 10).unwrap();
        assert_eq!(hint.next_free(), 11);
        let on_disk = io.read_u32_at(fsinfo_offset(&g) + 488).unwrap();
        assert_eq!(on_disk, hint.free_count());

        hint.release(&mut io, 4).unwrap();
        assert_eq!(hint.free_count(), g.cluster_count - 1);
    }

    #[test]
    fn unknown_count_is_rebuilt() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        let table = ChainTable::new(g);

        io.write_u32_at(fsinfo_offset(&g) + 488, FAT_FSINFO_UNKNOWN).unwrap();
        let hint = FreeSpaceHint::load(&mut io, &g, &table).unwrap();
        assert_eq!(hint.free_count(), g.cluster_count - 1);
        assert_eq!(io.read_u32_at(fsinfo_offset(&g) + 488).unwrap(), g.cluster_count - 1);
    }

    #[test]
    fn read_only_image_is_not_written() {
        let mut image = formatted_image();
        let (g, offset) = {
            let mut io = MemBlockIO::new(&mut image);
            let g = read_geometry(&mut io);
            io.write_u32_at(fsinfo_offset(&g) + 488, g.cluster_count + 10).unwrap();
            (g, fsinfo_offset(&g))
        };

        let mut io = MemBlockIO::read_only(&mut image);
        let table = ChainTable::new(g);
        let hint = FreeSpaceHint::load(&mut io, &g, &table).unwrap();
        assert_eq!(hint.free_count(), g.cluster_count - 1);
        assert_eq!(io.read_u32_at(offset + 488).unwrap(), g.cluster_count + 10);
    }

    #[test]
    fn bad_signature_is_a_volume_error() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        io.write_at(fsinfo_offset(&g), b"XXXX").unwrap();

        let err = FreeSpaceHint::load(&mut io, &g, &ChainTable::new(g)).unwrap_err();
        assert_eq!(err, FsVolumeError::BadFsInfoSignature);
    }
}
