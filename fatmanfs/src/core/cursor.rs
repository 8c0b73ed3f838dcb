// SPDX-License-Identifier: MIT

use crate::core::errors::FsChainError;
use crate::core::meta::FsMeta;
use crate::core::{FsChainResult, fat};
use fatmanio::prelude::*;

/// Layout facts needed to walk a FAT-style cluster chain.
pub trait ClusterMeta: FsMeta<u32> {
    /// Smallest value read back as end-of-chain.
    const EOC_MIN: u32;
    /// Mask isolating the meaningful bits of an entry.
    const ENTRY_MASK: u32;

    /// Byte offset of the entry for `cluster` in FAT copy `fat_index`.
    fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64;

    fn is_eoc(&self, value: u32) -> bool {
        (value & Self::ENTRY_MASK) >= Self::EOC_MIN
    }

    fn num_fats(&self) -> u8;
}

/// Walks a cluster chain one link at a time.
///
/// Every cluster yielded is inside `[first_data_unit, last_data_unit]`; a link
/// to a free entry, to an out-of-range cluster, or a chain longer than the
/// volume ends the walk with an error instead of wandering off.
#[derive(Debug)]
pub struct ClusterCursor<'a, M>
where
    M: ClusterMeta,
{
    meta: &'a M,
    current: Option<u32>,
    seen: usize,
}

impl<'a, M> ClusterCursor<'a, M>
where
    M: ClusterMeta,
{
    pub fn new(meta: &'a M, start: u32) -> Self {
        Self {
            meta,
            current: Some(start),
            seen: 0,
        }
    }

    /// One iteration step.
    pub fn next_with<IO>(&mut self, io: &mut IO) -> Option<FsChainResult<u32>>
    where
        IO: BlockIO + ?Sized,
    {
        let c = self.current.take()?;
        if !self.meta.is_valid_unit(c) {
            return Some(Err(FsChainError::OutOfRange(c)));
        }
        self.seen += 1;
        if self.seen > self.meta.total_units() {
            return Some(Err(FsChainError::LoopDetected(c)));
        }

        let next = match fat::chain::read_entry(io, self.meta, c, 0) {
            Ok(n) => n,
            Err(e) => return Some(Err(e.into())),
        };

        if self.meta.is_eoc(next) {
            self.current = None;
        } else if next == 0 {
            return Some(Err(FsChainError::BrokenChain(c)));
        } else if !self.meta.is_valid_unit(next) {
            return Some(Err(FsChainError::OutOfRange(next)));
        } else {
            self.current = Some(next);
        }
        Some(Ok(c))
    }

    /// Iterate cluster by cluster via callback
    pub fn for_each_cluster<IO, F>(&mut self, io: &mut IO, mut f: F) -> FsChainResult<()>
    where
        IO: BlockIO + ?Sized,
        F: FnMut(&mut IO, u32) -> FsChainResult<()>,
    {
        while let Some(res) = self.next_with(io) {
            let c = res?;
            f(io, c)?;
        }
        Ok(())
    }

    /// Collects the remaining chain.
    pub fn collect_chain<IO>(&mut self, io: &mut IO) -> FsChainResult<Vec<u32>>
    where
        IO: BlockIO + ?Sized,
    {
        let mut out = Vec::new();
        self.for_each_cluster(io, |_, c| {
            out.push(c);
            Ok(())
        })?;
        Ok(out)
    }
}
