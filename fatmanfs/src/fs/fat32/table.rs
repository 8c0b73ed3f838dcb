// SPDX-License-Identifier: MIT

use log::{debug, trace};

use crate::{
    core::{
        cursor::{ClusterCursor, ClusterMeta},
        errors::*,
        fat,
    },
    fs::fat32::{constant::*, geometry::*},
};
use fatmanio::prelude::*;

/// FAT entries fetched per read while scanning.
const SCAN_CHUNK: usize = 1024;

/// Access to the File Allocation Table.
///
/// Every cluster passed in is range-checked against `[2, max_valid_cluster]`
/// and every write is mirrored to all FAT copies.
#[derive(Debug, Clone)]
pub struct ChainTable {
    geometry: VolumeGeometry,
}

impl ChainTable {
    pub fn new(geometry: VolumeGeometry) -> Self {
        Self { geometry }
    }

    #[inline]
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    #[inline]
    fn check_range(&self, cluster: u32) -> FsChainResult {
        if self.geometry.is_valid_unit(cluster) {
            Ok(())
        } else {
            Err(FsChainError::OutOfRange(cluster))
        }
    }

    #[inline]
    pub fn is_end_of_chain(value: u32) -> bool {
        (value & FAT_MASK) >= FAT_EOC_MIN
    }

    /// Masked value of `cluster` in the first FAT copy.
    pub fn lookup<IO: BlockIO + ?Sized>(&self, io: &mut IO, cluster: u32) -> FsChainResult<u32> {
        self.check_range(cluster)?;
        Ok(fat::chain::read_entry(io, &self.geometry, cluster, 0)?)
    }

    /// Points a free `cluster` at `next` (a cluster or an end-of-chain value).
    pub fn set<IO: BlockIO + ?Sized>(&self, io: &mut IO, cluster: u32, next: u32) -> FsChainResult {
        self.check_range(cluster)?;
        if !Self::is_end_of_chain(next) {
            self.check_range(next)?;
        }

        for fat_index in 0..self.geometry.num_fats {
            if fat::chain::read_entry(io, &self.geometry, cluster, fat_index)? != FAT_FREE {
                return Err(FsChainError::NotFree(cluster));
            }
        }

        trace!("fat[{cluster}] <- {next:#x}");
        fat::chain::write_entry_all(io, &self.geometry, cluster, next)?;
        Ok(())
    }

    pub fn set_free<IO: BlockIO + ?Sized>(&self, io: &mut IO, cluster: u32) -> FsChainResult {
        self.check_range(cluster)?;
        trace!("fat[{cluster}] <- free");
        fat::chain::write_entry_all(io, &self.geometry, cluster, FAT_FREE)?;
        Ok(())
    }

    /// Collects the first `n` free clusters, scanning up from cluster 2.
    ///
    /// Read-only: nothing is reserved. `None` when fewer than `n` are free.
    pub fn find_free<IO: BlockIO + ?Sized>(&self, io: &mut IO, n: u32) -> FsChainResult<Option<Vec<u32>>> {
        if n == 0 {
            return Ok(Some(Vec::new()));
        }

        let wanted = n as usize;
        let mut found = Vec::with_capacity(wanted.min(SCAN_CHUNK));
        let start = self.geometry.fat_entry_offset(FAT_FIRST_CLUSTER, 0);

        io.read_chunks_streamed::<FAT_ENTRY_SIZE, _>(
            start,
            self.geometry.cluster_count as usize,
            SCAN_CHUNK,
            |index, raw| {
                if u32::from_le_bytes(*raw) & FAT_MASK == FAT_FREE {
                    found.push(FAT_FIRST_CLUSTER + index as u32);
                }
                found.len() < wanted
            },
        )?;

        if found.len() < wanted {
            debug!("find_free: wanted {n}, only {} free", found.len());
            return Ok(None);
        }
        Ok(Some(found))
    }

    /// Number of free entries in the first FAT copy.
    pub fn count_free<IO: BlockIO + ?Sized>(&self, io: &mut IO) -> FsChainResult<u32> {
        let mut free = 0u32;
        let start = self.geometry.fat_entry_offset(FAT_FIRST_CLUSTER, 0);
        io.read_chunks_streamed::<FAT_ENTRY_SIZE, _>(
            start,
            self.geometry.cluster_count as usize,
            SCAN_CHUNK,
            |_, raw| {
                if u32::from_le_bytes(*raw) & FAT_MASK == FAT_FREE {
                    free += 1;
                }
                true
            },
        )?;
        Ok(free)
    }

    /// Ordered clusters of the chain starting at `first`.
    pub fn chain<IO: BlockIO + ?Sized>(&self, io: &mut IO, first: u32) -> FsChainResult<Vec<u32>> {
        ClusterCursor::new(&self.geometry, first).collect_chain(io)
    }

    /// Links `clusters` in order and terminates the last one.
    pub fn link<IO: BlockIO + ?Sized>(&self, io: &mut IO, clusters: &[u32]) -> FsChainResult {
        for pair in clusters.windows(2) {
            self.set(io, pair[0], pair[1])?;
        }
        if let Some(&last) = clusters.last() {
            self.set(io, last, FAT_EOC)?;
        }
        Ok(())
    }

    /// Appends the free cluster `new` after `last`, the current end of a chain.
    pub fn extend<IO: BlockIO + ?Sized>(&self, io: &mut IO, last: u32, new: u32) -> FsChainResult {
        if !Self::is_end_of_chain(self.lookup(io, last)?) {
            return Err(FsChainError::NotEndOfChain(last));
        }
        self.set(io, new, FAT_EOC)?;
        fat::chain::write_entry_all(io, &self.geometry, last, new)?;
        Ok(())
    }

    /// Frees every cluster of the chain at `first`; returns how many.
    pub fn free_chain<IO: BlockIO + ?Sized>(&self, io: &mut IO, first: u32) -> FsChainResult<u32> {
        let clusters = self.chain(io, first)?;
        self.free_clusters(io, &clusters)
    }

    pub fn free_clusters<IO: BlockIO + ?Sized>(&self, io: &mut IO, clusters: &[u32]) -> FsChainResult<u32> {
        for &c in clusters {
            self.set_free(io, c)?;
        }
        Ok(clusters.len() as u32)
    }

    /// Keeps the first `keep` clusters of `chain` and frees the rest.
    ///
    /// Returns the number of clusters freed.
    pub fn truncate<IO: BlockIO + ?Sized>(&self, io: &mut IO, chain: &[u32], keep: usize) -> FsChainResult<u32> {
        if keep >= chain.len() {
            return Ok(0);
        }
        if keep > 0 {
            let new_last = chain[keep - 1];
            self.check_range(new_last)?;
            fat::chain::write_entry_all(io, &self.geometry, new_last, FAT_EOC)?;
        }
        self.free_clusters(io, &chain[keep..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat32::test_utils::*;

    #[test]
    fn lookup_is_range_checked() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let table = ChainTable::new(read_geometry(&mut io));
        let max = table.geometry().max_valid_cluster();

        assert!(ChainTable::is_end_of_chain(table.lookup(&mut io, 2).unwrap()));
        assert_eq!(table.lookup(&mut io, max).unwrap(), 0);
        assert_eq!(table.lookup(&mut io, 1), Err(FsChainError::OutOfRange(1)));
        assert_eq!(table.lookup(&mut io, 0), Err(FsChainError::OutOfRange(0)));
        assert_eq!(table.lookup(&mut io, max + 1), Err(FsChainError::OutOfRange(max + 1)));
    }

    #[test]
    fn find_free_has_no_side_effects() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let table = ChainTable::new(read_geometry(&mut io));

        let a = table.find_free(&mut io, 1).unwrap().unwrap();
        let b = table.find_free(&mut io, 1).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a, vec![3]);
    }

    #[test]
    fn find_free_unavailable_leaves_table_untouched() {
        let mut image = formatted_image();
        let before = image.clone();
        let mut io = MemBlockIO::new(&mut image);
        let table = ChainTable::new(read_geometry(&mut io));
        let free = table.count_free(&mut io).unwrap();

        assert_eq!(table.find_free(&mut io, free + 1).unwrap(), None);
        assert_eq!(table.find_free(&mut io, free).unwrap().map(|v| v.len()), Some(free as usize));
        drop(io);
        assert!(image == before);
    }

    #[test]
    fn set_refuses_used_entries_and_mirrors() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        let table = ChainTable::new(g);

        table.set(&mut io, 10, FAT_EOC).unwrap();
        assert_eq!(table.set(&mut io, 10, 11), Err(FsChainError::NotFree(10)));
        assert_eq!(table.set(&mut io, 11, 1), Err(FsChainError::OutOfRange(1)));

        let copy0 = fat::chain::read_entry(&mut io, &g, 10, 0).unwrap();
        let copy1 = fat::chain::read_entry(&mut io, &g, 10, 1).unwrap();
        assert_eq!(copy0, FAT_EOC);
        assert_eq!(copy0, copy1);

        table.set_free(&mut io, 10).unwrap();
        assert_eq!(fat::chain::read_entry(&mut io, &g, 10, 1).unwrap(), 0);
    }

    #[test]
    fn writes_preserve_reserved_high_bits() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        let table = ChainTable::new(g);

        for fat_index in 0..g.num_fats {
            io.write_u32_at(g.fat_entry_offset(20, fat_index), 0xA000_0000).unwrap();
        }
        assert_eq!(table.lookup(&mut io, 20).unwrap(), 0);
        table.set(&mut io, 20, 21).unwrap();
        assert_eq!(fat::chain::read_raw(&mut io, &g, 20, 1).unwrap(), 0xA000_0015);
        assert_eq!(table.lookup(&mut io, 20).unwrap(), 21);
    }

    #[test]
    fn link_extend_truncate_and_free() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let table = ChainTable::new(read_geometry(&mut io));
        let free_before = table.count_free(&mut io).unwrap();

        table.link(&mut io, &[5, 9, 6]).unwrap();
        assert_eq!(table.chain(&mut io, 5).unwrap(), vec![5, 9, 6]);

        assert_eq!(table.extend(&mut io, 9, 12), Err(FsChainError::NotEndOfChain(9)));
        table.extend(&mut io, 6, 12).unwrap();
        assert_eq!(table.chain(&mut io, 5).unwrap(), vec![5, 9, 6, 12]);
        assert_eq!(table.count_free(&mut io).unwrap(), free_before - 4);

        let chain = table.chain(&mut io, 5).unwrap();
        assert_eq!(table.truncate(&mut io, &chain, 2).unwrap(), 2);
        assert_eq!(table.chain(&mut io, 5).unwrap(), vec![5, 9]);

        assert_eq!(table.free_chain(&mut io, 5).unwrap(), 2);
        assert_eq!(table.count_free(&mut io).unwrap(), free_before);
    }

    #[test]
    fn corrupt_chains_are_reported() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        let table = ChainTable::new(g);

        // 30 -> 31 -> free
        table.set(&mut io, 30, 31).unwrap();
        assert_eq!(table.chain(&mut io, 30), Err(FsChainError::BrokenChain(31)));

        // 40 -> 41 -> 40
        fat::chain::write_entry_all(&mut io, &g, 40, 41).unwrap();
        fat::chain::write_entry_all(&mut io, &g, 41, 40).unwrap();
        assert!(matches!(table.chain(&mut io, 40), Err(FsChainError::LoopDetected(_))));

        // 50 -> beyond the table
        fat::chain::write_entry_all(&mut io, &g, 50, g.max_valid_cluster() + 5).unwrap();
        assert!(matches!(table.chain(&mut io, 50), Err(FsChainError::OutOfRange(_))));
    }
}
