// SPDX-License-Identifier: MIT

//! Directory tree construction.
//!
//! Directories are read breadth-first from the root. Each directory's cluster
//! chain is read sector by sector and decoded slot by slot; long-name
//! fragments are collected until their short record arrives.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, trace, warn};
use time::PrimitiveDateTime;

use crate::{
    core::{errors::*, utils::checksum_utils::checksum_u8, utils::path_utils::join_paths, utils::time_utils},
    fs::fat32::{
        attr::Fat32Attributes,
        constant::*,
        names::{decode_lfn_fragment, decode_short_name},
        table::ChainTable,
        types::{Fat32Entry, Fat32LFNEntry},
    },
};
use fatmanio::prelude::*;

/// One file or directory.
///
/// Identity inside the tree is `first_cluster`; equality also compares the
/// name and the directory flag.
#[derive(Debug, Clone)]
pub struct DirectoryNode {
    pub name: String,
    pub short_name: [u8; 11],
    pub first_cluster: u32,
    pub is_dir: bool,
    pub size: u32,
    pub attributes: Fat32Attributes,
    pub write_date: u16,
    pub write_time: u16,
    /// Byte offset of the short record; `None` for the root.
    pub entry_offset: Option<u64>,
    /// Byte offsets of the long-name fragments, in on-disk order.
    pub lfn_offsets: Vec<u64>,
}

impl PartialEq for DirectoryNode {
    fn eq(&self, other: &Self) -> bool {
        self.first_cluster == other.first_cluster && self.name == other.name && self.is_dir == other.is_dir
    }
}

impl Eq for DirectoryNode {}

impl DirectoryNode {
    pub fn root(cluster: u32) -> Self {
        Self {
            name: String::new(),
            short_name: [b' '; 11],
            first_cluster: cluster,
            is_dir: true,
            size: 0,
            attributes: Fat32Attributes::DIRECTORY,
            write_date: 0,
            write_time: 0,
            entry_offset: None,
            lfn_offsets: Vec::new(),
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.entry_offset.is_none()
    }

    pub fn modified(&self) -> Option<PrimitiveDateTime> {
        time_utils::decode_fat_datetime(self.write_date, self.write_time)
    }

    pub(crate) fn from_record(entry: &Fat32Entry, name: String, offset: u64, lfn_offsets: Vec<u64>) -> Self {
        Self {
            name,
            short_name: entry.name,
            first_cluster: entry.first_cluster(),
            is_dir: entry.is_directory(),
            size: entry.file_size.get(),
            attributes: Fat32Attributes::from_bits_retain(entry.attr),
            write_date: entry.write_date.get(),
            write_time: entry.write_time.get(),
            entry_offset: Some(offset),
            lfn_offsets,
        }
    }
}

/// Visits every 32-byte slot of the directory at `first`, cluster by cluster
/// and sector by sector. `f` returns `false` to stop.
///
/// Returns `true` when the whole chain was visited.
pub(crate) fn for_each_slot<IO, F>(io: &mut IO, table: &ChainTable, first: u32, mut f: F) -> FsParsingResult<bool>
where
    IO: BlockIO + ?Sized,
    F: FnMut(&mut IO, u64, &[u8]) -> FsParsingResult<bool>,
{
    let g = *table.geometry();
    let chain = table.chain(io, first)?;
    let bps = g.bytes_per_sector as usize;
    let mut sector = vec![0u8; bps];

    for cluster in chain {
        let base = g.cluster_offset(cluster);
        for s in 0..g.sectors_per_cluster as u64 {
            let sector_offset = base + s * bps as u64;
            io.read_at(sector_offset, &mut sector)?;
            for (i, slot) in sector.chunks_exact(FAT_DIR_ENTRY_SIZE).enumerate() {
                let offset = sector_offset + (i * FAT_DIR_ENTRY_SIZE) as u64;
                if !f(io, offset, slot)? {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

struct PendingName {
    name: String,
    offsets: Vec<u64>,
    checksum: u8,
    /// Ordinal the next fragment must carry; 0 once the sequence is complete.
    next_ordinal: u8,
}

/// Decodes the live short records of the directory at `first`, with their
/// long names attached. Volume labels are skipped; `.`/`..` are returned.
pub fn read_directory<IO: BlockIO + ?Sized>(
    io: &mut IO,
    table: &ChainTable,
    first: u32,
) -> FsParsingResult<Vec<DirectoryNode>> {
    let mut records = Vec::new();
    let mut pending: Option<PendingName> = None;

    for_each_slot(io, table, first, |_, offset, slot| {
        let Some(entry) = Fat32Entry::from_slot(slot) else {
            return Err(FsParsingError::Invalid("Short directory slot"));
        };

        if entry.is_end_of_dir() {
            if let Some(p) = &pending {
                return Err(FsParsingError::UnterminatedLongName(p.offsets[0]));
            }
            return Ok(false);
        }

        if entry.is_deleted() {
            if pending.take().is_some() {
                warn!("long name interrupted by a deleted slot at {offset:#x}, discarded");
            }
            return Ok(true);
        }

        if entry.is_long_name() {
            let Some(lfn) = Fat32LFNEntry::from_slot(slot) else {
                return Err(FsParsingError::Invalid("Long-name directory slot"));
            };
            let fragment = decode_lfn_fragment(&lfn.extract_utf16());

            if lfn.is_last() {
                if pending.is_some() {
                    warn!("long name restarted at {offset:#x}, previous fragments discarded");
                }
                pending = Some(PendingName {
                    name: fragment,
                    offsets: vec![offset],
                    checksum: lfn.checksum,
                    next_ordinal: lfn.ordinal().saturating_sub(1),
                });
                return Ok(true);
            }

            match pending.as_mut() {
                Some(p) if p.checksum == lfn.checksum && p.next_ordinal != 0 && lfn.ordinal() == p.next_ordinal => {
                    // Fragments arrive last-first.
                    p.name.insert_str(0, &fragment);
                    p.offsets.push(offset);
                    p.next_ordinal -= 1;
                }
                _ => {
                    warn!("orphan long-name fragment at {offset:#x}, discarded");
                    pending = None;
                }
            }
            return Ok(true);
        }

        if entry.is_volume_label() {
            if pending.take().is_some() {
                warn!("long name attached to a volume label at {offset:#x}, discarded");
            }
            return Ok(true);
        }

        let node = match pending.take() {
            Some(p) if p.next_ordinal == 0 && p.checksum == checksum_u8(&entry.name) => {
                DirectoryNode::from_record(&entry, p.name, offset, p.offsets)
            }
            Some(_) => {
                warn!("long name does not match the short record at {offset:#x}, using the short name");
                DirectoryNode::from_record(&entry, decode_short_name(&entry.name), offset, Vec::new())
            }
            None => DirectoryNode::from_record(&entry, decode_short_name(&entry.name), offset, Vec::new()),
        };
        trace!("dir {first}: {:?} cluster={} size={}", node.name, node.first_cluster, node.size);
        records.push(node);
        Ok(true)
    })?;

    if let Some(p) = pending {
        return Err(FsParsingError::UnterminatedLongName(p.offsets[0]));
    }
    Ok(records)
}

/// Whether a decoded record is a real child of directory `dir` whose parent
/// is `parent`.
///
/// Records pointing back at the directory itself or at its parent are the
/// `.` / `..` entries. Cluster 0 marks an empty slot, except for an empty
/// regular file, which owns no cluster at all.
pub fn is_child_record(node: &DirectoryNode, dir: u32, parent: u32) -> bool {
    if node.first_cluster == 0 {
        return !node.is_dir && node.size == 0;
    }
    node.first_cluster != dir && node.first_cluster != parent
}

/// In-memory directory tree: children lists keyed by directory cluster.
///
/// A node without an entry in the map is a file.
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    root: DirectoryNode,
    children: BTreeMap<u32, Vec<DirectoryNode>>,
}

impl DirectoryTree {
    /// Reads every directory reachable from the root.
    pub fn build<IO: BlockIO + ?Sized>(io: &mut IO, table: &ChainTable) -> FsParsingResult<Self> {
        let root_cluster = table.geometry().root_cluster;
        let root = DirectoryNode::root(root_cluster);

        let mut children = BTreeMap::new();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([(root_cluster, 0u32)]);

        while let Some((dir, parent)) = queue.pop_front() {
            if !visited.insert(dir) {
                return Err(FsParsingError::DirectoryCycle(dir));
            }

            let kids: Vec<DirectoryNode> = read_directory(io, table, dir)?
                .into_iter()
                .filter(|node| is_child_record(node, dir, parent))
                .collect();

            for kid in kids.iter().filter(|k| k.is_dir) {
                queue.push_back((kid.first_cluster, dir));
            }
            children.insert(dir, kids);
        }

        debug!("directory tree: {} directories", children.len());
        Ok(Self { root, children })
    }

    #[inline]
    pub fn root(&self) -> &DirectoryNode {
        &self.root
    }

    /// Children of `node`; `None` for files.
    pub fn children(&self, node: &DirectoryNode) -> Option<&[DirectoryNode]> {
        if !node.is_dir {
            return None;
        }
        self.children.get(&node.first_cluster).map(Vec::as_slice)
    }

    pub fn find_child(&self, dir: &DirectoryNode, name: &str) -> Option<&DirectoryNode> {
        self.children(dir)?.iter().find(|c| c.name == name)
    }

    /// Number of directories in the tree, root included.
    pub fn directory_count(&self) -> usize {
        self.children.len()
    }

    pub fn insert_child(&mut self, dir_cluster: u32, node: DirectoryNode) {
        if node.is_dir {
            self.children.entry(node.first_cluster).or_default();
        }
        self.children.entry(dir_cluster).or_default().push(node);
    }

    /// Removes the child recorded at `entry_offset` under `dir_cluster`,
    /// together with everything below it.
    pub fn remove_child(&mut self, dir_cluster: u32, entry_offset: u64) -> Option<DirectoryNode> {
        let list = self.children.get_mut(&dir_cluster)?;
        let pos = list.iter().position(|c| c.entry_offset == Some(entry_offset))?;
        let node = list.remove(pos);
        if node.is_dir {
            self.drop_subtree(node.first_cluster);
        }
        Some(node)
    }

    fn drop_subtree(&mut self, dir_cluster: u32) {
        let mut stack = vec![dir_cluster];
        while let Some(dir) = stack.pop() {
            if let Some(kids) = self.children.remove(&dir) {
                stack.extend(kids.iter().filter(|k| k.is_dir).map(|k| k.first_cluster));
            }
        }
    }

    /// Depth-first walk in record order; `f` receives the node path, the node
    /// and its depth (0 for top-level entries). The root is not visited.
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&str, &DirectoryNode, usize),
    {
        let mut stack: Vec<(String, &DirectoryNode, usize)> = Vec::new();
        if let Some(kids) = self.children(&self.root) {
            for kid in kids.iter().rev() {
                stack.push((join_paths("", &kid.name), kid, 0));
            }
        }

        while let Some((path, node, depth)) = stack.pop() {
            f(&path, node, depth);
            if let Some(kids) = self.children(node) {
                for kid in kids.iter().rev() {
                    stack.push((join_paths(&path, &kid.name), kid, depth + 1));
                }
            }
        }
    }

    /// `/`-joined paths of every file and every empty directory.
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(|path, node, _| {
            let is_leaf = self.children(node).is_none_or(|kids| kids.is_empty());
            if is_leaf {
                out.push(path.to_string());
            }
        });
        out
    }
}
