// SPDX-License-Identifier: MIT

//! Recursive removal of files and directories.

use log::{debug, trace};

use crate::{
    core::errors::*,
    fs::fat32::{
        constant::*,
        fsinfo::FreeSpaceHint,
        resolver::{Lookup, resolve_chain},
        table::ChainTable,
        tree::{DirectoryNode, DirectoryTree, for_each_slot},
        types::Fat32Entry,
    },
};
use fatmanio::prelude::*;

/// What a removal released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub clusters_freed: u32,
    /// Long-name fragments plus short records marked deleted.
    pub records_marked: u32,
}

/// Removes `path` and, for a directory, everything below it.
///
/// Children are removed before their parent. Each node's record is
/// confirmed, then its chain is freed and its records are marked `0xE5` in
/// place; the parent directory keeps its size and chain. A failure part way
/// leaves the nodes already removed gone from both the volume and the tree,
/// and the hint credited with what was freed.
pub fn delete<IO: BlockIO + ?Sized>(
    io: &mut IO,
    table: &ChainTable,
    hint: &mut FreeSpaceHint,
    tree: &mut DirectoryTree,
    path: &str,
) -> FsResult<DeleteReport> {
    let chain = resolve_chain(tree, path, Lookup::Any)?;
    if chain.len() < 2 {
        return Err(FsResolverError::RootNotAllowed.into());
    }
    let target = chain[chain.len() - 1].clone();
    let parent_cluster = chain[chain.len() - 2].first_cluster;

    let mut report = DeleteReport::default();
    let outcome = remove_subtree(io, table, tree, target, parent_cluster, &mut report);
    hint.release(io, report.clusters_freed)?;
    outcome?;

    debug!(
        "deleted {path}: {} cluster(s), {} record(s)",
        report.clusters_freed, report.records_marked
    );
    Ok(report)
}

fn remove_subtree<IO: BlockIO + ?Sized>(
    io: &mut IO,
    table: &ChainTable,
    tree: &mut DirectoryTree,
    target: DirectoryNode,
    parent_cluster: u32,
    report: &mut DeleteReport,
) -> FsResult {
    // Explicit stack: (node, the directory holding its record, expanded?).
    let mut stack = vec![(target, parent_cluster, false)];
    while let Some((node, dir, expanded)) = stack.pop() {
        if node.is_dir && !expanded {
            let children = tree.children(&node).map(<[DirectoryNode]>::to_vec).unwrap_or_default();
            let cluster = node.first_cluster;
            stack.push((node, dir, true));
            for child in children {
                stack.push((child, cluster, false));
            }
            continue;
        }

        let entry_offset = confirm_record(io, table, dir, &node)?;
        if node.first_cluster != 0 {
            let freed = table.free_chain(io, node.first_cluster)?;
            trace!("{}: freed {freed} cluster(s)", node.name);
            report.clusters_freed += freed;
        }
        for &offset in node.lfn_offsets.iter().chain([&entry_offset]) {
            io.write_u8_at(offset, FAT_ENTRY_DELETED)?;
        }
        report.records_marked += node.lfn_offsets.len() as u32 + 1;
        tree.remove_child(dir, entry_offset);
    }
    Ok(())
}

/// Checks that the short record of `node` inside the directory `dir` is still
/// live and points at the node's first cluster. Returns its offset.
fn confirm_record<IO: BlockIO + ?Sized>(
    io: &mut IO,
    table: &ChainTable,
    dir: u32,
    node: &DirectoryNode,
) -> FsResult<u64> {
    let Some(entry_offset) = node.entry_offset else {
        return Err(FsResolverError::RootNotAllowed.into());
    };

    let mut confirmed = false;
    for_each_slot(io, table, dir, |_, offset, slot| {
        if offset != entry_offset {
            return Ok(true);
        }
        confirmed = Fat32Entry::from_slot(slot)
            .is_some_and(|e| !e.is_deleted() && e.first_cluster() == node.first_cluster);
        Ok(false)
    })?;
    crate::ensure!(
        confirmed,
        FsParsingError::Invalid("Directory record no longer matches the entry")
    );
    Ok(entry_offset)
}
