// SPDX-License-Identifier: MIT

//! File content streaming between a volume and the host.

use std::io::{ErrorKind, Read, Write};

use log::{debug, warn};

use crate::{
    core::{errors::*, utils::path_utils::*, utils::time_utils},
    fs::fat32::{
        attr::Fat32Attributes,
        constant::*,
        dir_writer::Placement,
        fsinfo::FreeSpaceHint,
        names::validate_name,
        resolver::{Lookup, resolve, resolve_chain},
        table::ChainTable,
        tree::{DirectoryNode, DirectoryTree},
        types::{Fat32Entries, Fat32Entry},
    },
};
use fatmanio::prelude::*;

/// Streams the content of `node` into `out`, sector by sector.
///
/// Exactly `node.size` bytes are written; the tail of the last sector is
/// dropped. Returns the number of bytes written.
pub fn copy_out<IO, W>(io: &mut IO, table: &ChainTable, node: &DirectoryNode, out: &mut W) -> FsResult<u64>
where
    IO: BlockIO + ?Sized,
    W: Write + ?Sized,
{
    if node.is_dir {
        return Err(FsResolverError::WrongKind.into());
    }

    let size = node.size as u64;
    if size == 0 {
        return Ok(0);
    }

    let g = *table.geometry();
    let bps = g.bytes_per_sector as usize;
    let mut sector = vec![0u8; bps];
    let mut remaining = size;

    'chain: for cluster in table.chain(io, node.first_cluster)? {
        let base = g.cluster_offset(cluster);
        for s in 0..g.sectors_per_cluster as u64 {
            if remaining == 0 {
                break 'chain;
            }
            io.read_at(base + s * bps as u64, &mut sector)?;
            let n = remaining.min(bps as u64) as usize;
            out.write_all(&sector[..n]).map_err(BlockIOError::from)?;
            remaining -= n as u64;
        }
    }

    if remaining > 0 {
        return Err(FsChainError::TooShort(node.first_cluster).into());
    }
    Ok(size)
}

/// Reads until `buf` is full or the source is exhausted.
fn read_full<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> FsResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(BlockIOError::from(e).into()),
        }
    }
    Ok(filled)
}

/// Parent directory node for a new entry at `path`, after the usual checks:
/// the entry must not exist, its parent must be a directory and its name must
/// be storable.
fn prepare_target<'t>(tree: &'t DirectoryTree, path: &str) -> FsResult<(&'t DirectoryNode, String)> {
    let Some((parents, name)) = split_parent(path) else {
        return Err(FsResolverError::AlreadyExists.into());
    };
    if resolve_chain(tree, path, Lookup::Any).is_ok() {
        return Err(FsResolverError::AlreadyExists.into());
    }

    let parent = resolve(tree, &parents.join("/"), Lookup::Dir)?;
    validate_name(name)?;
    Ok((parent, name.to_string()))
}

fn ensure_space(hint: &FreeSpaceHint, needed: u32) -> FsResult {
    if needed > hint.free_count() {
        return Err(FsAllocatorError::InsufficientSpace {
            needed,
            available: hint.free_count(),
        }
        .into());
    }
    Ok(())
}

/// Creates the file `path` from `size` bytes of `src`.
///
/// Clusters are allocated and linked up front, zeroed, then filled. If the
/// source ends early the unused clusters are released and the recorded size
/// is what was actually read. On failure the allocation is rolled back.
pub fn copy_in<IO, R>(
    io: &mut IO,
    table: &ChainTable,
    hint: &mut FreeSpaceHint,
    tree: &mut DirectoryTree,
    path: &str,
    src: &mut R,
    size: u64,
) -> FsResult<DirectoryNode>
where
    IO: BlockIO + ?Sized,
    R: Read + ?Sized,
{
    let (parent, name) = prepare_target(tree, path)?;
    let parent_cluster = parent.first_cluster;

    if size > u32::MAX as u64 {
        return Err(FsAllocatorError::FileTooLarge.into());
    }

    let g = *table.geometry();
    let bpc = g.bytes_per_cluster() as u64;
    let clusters_needed = size.div_ceil(bpc) as u32;

    let placement = Placement::plan(io, table, parent_cluster, &name)?;
    ensure_space(hint, clusters_needed + placement.grow)?;

    let clusters = table
        .find_free(io, clusters_needed)?
        .ok_or(FsAllocatorError::InsufficientSpace {
            needed: clusters_needed,
            available: hint.free_count(),
        })?;

    let result = fill_and_record(io, table, hint, &clusters, &name, src, size, placement);
    match result {
        Ok(node) => {
            debug!("copied {} byte(s) into {path}", node.size);
            tree.insert_child(parent_cluster, node.clone());
            Ok(node)
        }
        Err((e, linked)) => {
            if linked > 0 {
                warn!("copy into {path} failed, releasing {linked} cluster(s)");
                table.free_clusters(io, &clusters[..linked])?;
            }
            Err(e)
        }
    }
}

/// Links, zeroes and fills `clusters`, then writes the directory records.
///
/// On error also returns how many leading clusters of `clusters` are still
/// linked and must be released by the caller.
#[allow(clippy::too_many_arguments)]
fn fill_and_record<IO, R>(
    io: &mut IO,
    table: &ChainTable,
    hint: &mut FreeSpaceHint,
    clusters: &[u32],
    name: &str,
    src: &mut R,
    size: u64,
    placement: Placement,
) -> Result<DirectoryNode, (FsError, usize)>
where
    IO: BlockIO + ?Sized,
    R: Read + ?Sized,
{
    let g = *table.geometry();
    let bps = g.bytes_per_sector as usize;
    let bpc = g.bytes_per_cluster() as u64;

    table.link(io, clusters).map_err(|e| (e.into(), 0))?;
    let linked = clusters.len();

    for &cluster in clusters {
        io.zero_fill(g.cluster_offset(cluster), bpc as usize)
            .map_err(|e| (e.into(), linked))?;
    }

    let mut written = 0u64;
    let mut buf = vec![0u8; bps];
    'stream: for &cluster in clusters {
        let base = g.cluster_offset(cluster);
        for s in 0..g.sectors_per_cluster as u64 {
            let want = (size - written).min(bps as u64) as usize;
            if want == 0 {
                break 'stream;
            }
            let n = read_full(src, &mut buf[..want]).map_err(|e| (e, linked))?;
            if n > 0 {
                io.write_at(base + s * bps as u64, &buf[..n])
                    .map_err(|e| (e.into(), linked))?;
                written += n as u64;
            }
            if n < want {
                break 'stream;
            }
        }
    }

    // Short source: keep only the clusters that received data.
    let used = written.div_ceil(bpc) as usize;
    if used < linked {
        warn!("source ended after {written} of {size} byte(s)");
        table
            .truncate(io, clusters, used)
            .map_err(|e| (e.into(), linked))?;
    }

    let first_cluster = clusters.first().copied().filter(|_| used > 0).unwrap_or(0);
    if used > 0 {
        hint.consume(io, used as u32, clusters[used - 1])
            .map_err(|e| (e.into(), used))?;
    }

    let stamp = time_utils::fat_datetime_now();
    let entries = Fat32Entries::file(name, placement.short_name, first_cluster, written as u32, stamp);
    let offsets = match placement.commit(io, table, hint, &entries) {
        Ok(offsets) => offsets,
        Err(e) => {
            if used > 0 {
                if let Err(release) = hint.release(io, used as u32) {
                    warn!("could not return {used} cluster(s) to the free-space hint: {release}");
                }
            }
            return Err((e, used));
        }
    };

    node_for(name, &entries.entry, offsets).map_err(|e| (e, used))
}

fn node_for(name: &str, entry: &Fat32Entry, mut offsets: Vec<u64>) -> FsResult<DirectoryNode> {
    let offset = offsets.pop().ok_or(FsError::Other("No directory record was written"))?;
    Ok(DirectoryNode::from_record(entry, name.to_string(), offset, offsets))
}

/// Creates an empty directory at `path` with its `.` and `..` records.
pub fn create_dir<IO: BlockIO + ?Sized>(
    io: &mut IO,
    table: &ChainTable,
    hint: &mut FreeSpaceHint,
    tree: &mut DirectoryTree,
    path: &str,
) -> FsResult<DirectoryNode> {
    let (parent, name) = prepare_target(tree, path)?;
    let parent_cluster = parent.first_cluster;
    // `..` of a top-level directory points at cluster 0, not at the root cluster.
    let dotdot_cluster = if parent.is_root() { 0 } else { parent_cluster };

    let g = *table.geometry();
    let placement = Placement::plan(io, table, parent_cluster, &name)?;
    ensure_space(hint, 1 + placement.grow)?;

    let cluster = table
        .find_free(io, 1)?
        .and_then(|v| v.first().copied())
        .ok_or(FsAllocatorError::InsufficientSpace {
            needed: 1,
            available: hint.free_count(),
        })?;
    table.set(io, cluster, FAT_EOC)?;

    let stamp = time_utils::fat_datetime_now();
    let (date, time, tenth) = stamp;
    let dir_attr = Fat32Attributes::DIRECTORY.bits();
    let dot = Fat32Entry::new(*FAT_DOT_NAME, dir_attr, cluster, 0, date, time, tenth);
    let dotdot = Fat32Entry::new(*FAT_DOTDOT_NAME, dir_attr, dotdot_cluster, 0, date, time, tenth);

    let setup = (|| -> FsResult {
        let base = g.cluster_offset(cluster);
        io.zero_fill(base, g.bytes_per_cluster() as usize)?;
        io.write_struct(base, &dot)?;
        io.write_struct(base + FAT_DIR_ENTRY_SIZE as u64, &dotdot)?;
        hint.consume(io, 1, cluster)?;
        Ok(())
    })();
    if let Err(e) = setup {
        table.set_free(io, cluster)?;
        return Err(e);
    }

    let mut entries = Fat32Entries::file(&name, placement.short_name, cluster, 0, stamp);
    entries.entry.attr = dir_attr;

    let offsets = match placement.commit(io, table, hint, &entries) {
        Ok(offsets) => offsets,
        Err(e) => {
            table.set_free(io, cluster)?;
            hint.release(io, 1)?;
            return Err(e);
        }
    };

    let node = node_for(&name, &entries.entry, offsets)?;
    debug!("created directory {path} at cluster {cluster}");
    tree.insert_child(parent_cluster, node.clone());
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat32::test_utils::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + i / 511) as u8).collect()
    }

    #[test]
    fn round_trips_sizes_around_cluster_boundaries() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let bpc = vol.geometry().bytes_per_cluster() as usize;

        for (i, len) in [0, 1, 511, bpc, bpc + 1, 3 * bpc, 10_000].into_iter().enumerate() {
            let data = pattern(len);
            let path = format!("/file_{i}.bin");
            vol.copy_from_host(&path, &mut data.as_slice(), len as u64).unwrap();

            let mut out = Vec::new();
            let n = vol.copy_to_host(&path, &mut out).unwrap();
            assert_eq!(n, len as u64);
            assert_eq!(out, data, "len {len}");
        }
    }

    #[test]
    fn allocation_keeps_hint_in_sync() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let bpc = vol.geometry().bytes_per_cluster() as u64;
        let before = vol.hint().free_count();

        let data = pattern(2 * bpc as usize + 5);
        vol.copy_from_host("/three.bin", &mut data.as_slice(), data.len() as u64).unwrap();
        assert_eq!(vol.hint().free_count(), before - 3);
        assert_eq!(vol.count_free_clusters().unwrap(), vol.hint().free_count());

        let node = vol.resolve("/three.bin", Lookup::File).unwrap().clone();
        assert_eq!(vol.cluster_chain(node.first_cluster).unwrap().len(), 3);
        assert_eq!(vol.hint().next_free(), vol.cluster_chain(node.first_cluster).unwrap()[2] + 1);
    }

    #[test]
    fn empty_file_owns_no_cluster() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let before = vol.hint().free_count();

        let node = vol.copy_from_host("/empty.txt", &mut &b""[..], 0).unwrap();
        assert_eq!(node.first_cluster, 0);
        assert_eq!(vol.hint().free_count(), before);

        vol.rebuild_tree().unwrap();
        let mut out = Vec::new();
        assert_eq!(vol.copy_to_host("/empty.txt", &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn existing_destination_is_a_conflict() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        vol.copy_from_host("/a.txt", &mut &b"one"[..], 3).unwrap();

        let err = vol.copy_from_host("/a.txt", &mut &b"two"[..], 3).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::PathConflict);
        let err = vol.copy_from_host("/", &mut &b"two"[..], 3).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::PathConflict);
        let err = vol.copy_from_host("/bad:name", &mut &b"x"[..], 1).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::PathConflict);
        let err = vol.copy_from_host("/nodir/a.txt", &mut &b"x"[..], 1).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::PathNotFound);
        let err = vol.copy_from_host("/a.txt/b.txt", &mut &b"x"[..], 1).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::PathNotFound);
    }

    #[test]
    fn insufficient_space_changes_nothing() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let free = vol.hint().free_count() as u64;
        let bpc = vol.geometry().bytes_per_cluster() as u64;

        let err = vol
            .copy_from_host("/huge.bin", &mut std::io::repeat(0), (free + 1) * bpc)
            .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::InsufficientSpace);
        assert_eq!(vol.hint().free_count() as u64, free);
        assert_eq!(vol.count_free_clusters().unwrap() as u64, free);

        let err = vol
            .copy_from_host("/toolarge.bin", &mut std::io::repeat(0), u32::MAX as u64 + 1)
            .unwrap_err();
        assert_eq!(err, FsError::Allocator(FsAllocatorError::FileTooLarge));
    }

    #[test]
    fn short_source_records_bytes_actually_read() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let bpc = vol.geometry().bytes_per_cluster() as u64;
        let before = vol.hint().free_count();

        let data = pattern(bpc as usize + 10);
        let node = vol
            .copy_from_host("/short.bin", &mut data.as_slice(), 4 * bpc)
            .unwrap();
        assert_eq!(node.size as usize, data.len());
        assert_eq!(vol.hint().free_count(), before - 2);
        assert_eq!(vol.count_free_clusters().unwrap(), before - 2);

        let mut out = Vec::new();
        vol.copy_to_host("/short.bin", &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn failing_source_rolls_back() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("boom"))
            }
        }

        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let before = vol.hint().free_count();

        assert!(vol.copy_from_host("/broken.bin", &mut Broken, 4096).is_err());
        assert_eq!(vol.hint().free_count(), before);
        assert_eq!(vol.count_free_clusters().unwrap(), before);
        assert!(vol.resolve("/broken.bin", Lookup::Any).is_err());
    }

    /// Refuses the one write landing at `offset`.
    struct FailingWrite<'a> {
        inner: MemBlockIO<'a>,
        offset: u64,
    }

    impl BlockIO for FailingWrite<'_> {
        fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
            if offset == self.offset {
                return Err(BlockIOError::Other("write refused"));
            }
            self.inner.write_at(offset, data)
        }

        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
            self.inner.read_at(offset, buf)
        }

        fn flush(&mut self) -> BlockIOResult {
            self.inner.flush()
        }

        fn capacity(&mut self) -> BlockIOResult<u64> {
            self.inner.capacity()
        }

        fn partition_offset(&self) -> u64 {
            self.inner.partition_offset()
        }
    }

    #[test]
    fn failed_record_write_returns_clusters_to_the_hint() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        // Slot 0 of the root holds the label; the new record goes to slot 1.
        let record = g.cluster_offset(g.root_cluster) + FAT_DIR_ENTRY_SIZE as u64;

        let mut vol = Fat32Volume::open(FailingWrite { inner: io, offset: record }).unwrap();
        let before = vol.hint().free_count();
        let data = pattern(1500);

        let err = vol.copy_from_host("/A.TXT", &mut data.as_slice(), 1500).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::Io);
        assert_eq!(vol.hint().free_count(), before);
        assert_eq!(vol.count_free_clusters().unwrap(), before);
        assert!(vol.resolve("/A.TXT", Lookup::Any).is_err());
    }

    #[test]
    fn truncated_chain_is_reported_on_copy_out() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let bpc = vol.geometry().bytes_per_cluster() as usize;
        let data = pattern(2 * bpc);
        let node = vol.copy_from_host("/two.bin", &mut data.as_slice(), data.len() as u64).unwrap();

        let first = node.first_cluster;
        let mut io = vol.into_inner();
        let g = read_geometry(&mut io);
        crate::core::fat::chain::write_entry_all(&mut io, &g, first, FAT_EOC).unwrap();

        let mut vol = Fat32Volume::open(io).unwrap();
        let err = vol.copy_to_host("/two.bin", &mut Vec::new()).unwrap_err();
        assert_eq!(err, FsError::Chain(FsChainError::TooShort(first)));
        assert_eq!(err.kind(), FsErrorKind::ClusterRange);
    }

    #[test]
    fn directories_can_be_created_and_filled() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let before = vol.hint().free_count();

        vol.create_dir("/docs").unwrap();
        vol.create_dir("/docs/deep").unwrap();
        vol.copy_from_host("/docs/deep/readme.md", &mut &b"# hi"[..], 4).unwrap();
        assert_eq!(vol.hint().free_count(), before - 3);
        assert!(vol.create_dir("/docs").is_err());

        vol.rebuild_tree().unwrap();
        assert_eq!(vol.list(), ["/docs/deep/readme.md"]);

        let mut out = Vec::new();
        vol.copy_to_host("docs/deep/readme.md", &mut out).unwrap();
        assert_eq!(out, b"# hi");
    }
}
