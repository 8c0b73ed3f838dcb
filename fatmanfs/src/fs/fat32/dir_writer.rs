// SPDX-License-Identifier: MIT

//! Placement of new directory records inside a parent directory.

use log::debug;

use crate::{
    core::errors::*,
    fs::fat32::{
        constant::*,
        fsinfo::FreeSpaceHint,
        names::{exact_short_name, generate_short_name},
        table::ChainTable,
        tree::for_each_slot,
        types::{Fat32Entries, Fat32Entry},
    },
};
use fatmanio::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Used,
    Deleted,
    /// The end marker or any slot after it.
    Free,
}

/// Where the records of one new entry go, computed before anything is written.
#[derive(Debug, Clone)]
pub struct Placement {
    pub short_name: [u8; 11],
    /// Slots needed: long-name fragments plus the short record.
    pub slot_count: usize,
    /// Clusters the parent must grow by.
    pub grow: u32,
    dir_cluster: u32,
    chain: Vec<u32>,
    offsets: Vec<u64>,
    states: Vec<SlotState>,
    /// Index of the first slot of the run (may point past the current chain).
    start: usize,
}

impl Placement {
    /// Scans the directory at `dir_cluster` and picks slots for `name`.
    pub fn plan<IO: BlockIO + ?Sized>(
        io: &mut IO,
        table: &ChainTable,
        dir_cluster: u32,
        name: &str,
    ) -> FsResult<Self> {
        let mut offsets = Vec::new();
        let mut states = Vec::new();
        let mut short_names: Vec<[u8; 11]> = Vec::new();
        let mut ended = false;

        for_each_slot(io, table, dir_cluster, |_, offset, slot| {
            let state = if ended || slot[0] == FAT_ENTRY_END_OF_DIR {
                ended = true;
                SlotState::Free
            } else if slot[0] == FAT_ENTRY_DELETED {
                SlotState::Deleted
            } else {
                if let Some(entry) = Fat32Entry::from_slot(slot).filter(|e| !e.is_long_name()) {
                    short_names.push(entry.name);
                }
                SlotState::Used
            };
            offsets.push(offset);
            states.push(state);
            Ok(true)
        })?;

        let taken = |candidate: &[u8; 11]| short_names.contains(candidate);
        let short_name = match exact_short_name(name) {
            Some(exact) if !taken(&exact) => exact,
            _ => generate_short_name(name, taken)
                .ok_or(FsResolverError::InvalidName("No unique short name is left"))?,
        };

        let lfn_count = if exact_short_name(name) == Some(short_name) {
            0
        } else {
            name.encode_utf16().count().div_ceil(FAT_LFN_CHARS_PER_ENTRY)
        };
        let slot_count = lfn_count + 1;

        let chain = table.chain(io, dir_cluster)?;
        let slots_per_cluster = table.geometry().bytes_per_cluster() as usize / FAT_DIR_ENTRY_SIZE;

        let (start, grow) = match find_run(&states, slot_count) {
            Some(start) => (start, 0),
            None => {
                // Reuse the reusable tail of the chain, then add clusters.
                let tail = states.iter().rev().take_while(|s| **s != SlotState::Used).count();
                let missing = slot_count - tail;
                (states.len() - tail, missing.div_ceil(slots_per_cluster) as u32)
            }
        };

        Ok(Self {
            short_name,
            slot_count,
            grow,
            dir_cluster,
            chain,
            offsets,
            states,
            start,
        })
    }

    /// Writes `entries` into the planned slots, growing the parent first if
    /// needed. Returns the byte offsets used, fragments first.
    pub fn commit<IO: BlockIO + ?Sized>(
        mut self,
        io: &mut IO,
        table: &ChainTable,
        hint: &mut FreeSpaceHint,
        entries: &Fat32Entries,
    ) -> FsResult<Vec<u64>> {
        if entries.slot_count() != self.slot_count {
            return Err(FsError::Other("Directory records do not match the planned slots"));
        }

        if self.grow > 0 {
            self.grow_parent(io, table, hint)?;
        }

        let used = &self.offsets[self.start..self.start + self.slot_count];
        let mut raw = Vec::with_capacity(self.slot_count * FAT_DIR_ENTRY_SIZE);
        entries.to_raw_buffer(&mut raw);
        for (offset, slot) in used.iter().zip(raw.chunks_exact(FAT_DIR_ENTRY_SIZE)) {
            io.write_at(*offset, slot)?;
        }

        // A run that consumed the end marker moves it behind the new records.
        let after = self.start + self.slot_count;
        let crossed_end = self.states[self.start..after].contains(&SlotState::Free);
        if crossed_end && after < self.offsets.len() {
            io.write_u8_at(self.offsets[after], FAT_ENTRY_END_OF_DIR)?;
        }

        debug!(
            "dir {}: {} record(s) at {:#x}",
            self.dir_cluster, self.slot_count, used[0]
        );
        Ok(used.to_vec())
    }

    fn grow_parent<IO: BlockIO + ?Sized>(
        &mut self,
        io: &mut IO,
        table: &ChainTable,
        hint: &mut FreeSpaceHint,
    ) -> FsResult {
        let g = *table.geometry();
        let fresh = table
            .find_free(io, self.grow)?
            .ok_or(FsAllocatorError::InsufficientSpace {
                needed: self.grow,
                available: hint.free_count(),
            })?;

        let slots_per_cluster = g.bytes_per_cluster() as usize / FAT_DIR_ENTRY_SIZE;
        let mut last = *self.chain.last().ok_or(FsError::Other("Directory without clusters"))?;
        for &cluster in &fresh {
            io.zero_fill(g.cluster_offset(cluster), g.bytes_per_cluster() as usize)?;
            table.extend(io, last, cluster)?;
            last = cluster;

            let base = g.cluster_offset(cluster);
            for i in 0..slots_per_cluster {
                self.offsets.push(base + (i * FAT_DIR_ENTRY_SIZE) as u64);
                self.states.push(SlotState::Free);
            }
            self.chain.push(cluster);
        }
        hint.consume(io, fresh.len() as u32, last)?;
        debug!("dir {}: grown by {} cluster(s)", self.dir_cluster, fresh.len());
        Ok(())
    }
}

/// First run of `count` consecutive reusable slots.
fn find_run(states: &[SlotState], count: usize) -> Option<usize> {
    let mut run = 0;
    for (i, state) in states.iter().enumerate() {
        if *state == SlotState::Used {
            run = 0;
            continue;
        }
        run += 1;
        if run == count {
            return Some(i + 1 - count);
        }
    }
    None
}
