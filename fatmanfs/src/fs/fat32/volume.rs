// SPDX-License-Identifier: MIT

//! Mounted FAT32 volume: geometry, chain table, free-space hint and the
//! in-memory directory tree over one byte region.

use core::fmt;
use std::io::{Read, Write};

use log::{debug, info};

use crate::{
    core::errors::*,
    fs::fat32::{
        checker::{CheckOptions, Fat32Checker, VerifyReport},
        constant::*,
        content,
        deleter::{self, DeleteReport},
        fsinfo::FreeSpaceHint,
        geometry::{FatKind, VolumeGeometry},
        resolver::{Lookup, resolve},
        table::ChainTable,
        tree::{DirectoryNode, DirectoryTree},
        types::Fat32Vbr,
    },
};
use fatmanio::prelude::*;

/// FAT32-only part of [`VolumeInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat32Details {
    pub root_cluster: u32,
    pub free_count: u32,
    pub next_free: u32,
    pub volume_id: u32,
    pub label: String,
    pub oem_name: String,
}

/// Summary of a volume's layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub kind: FatKind,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    /// All FAT copies together.
    pub fat_sectors: u32,
    pub root_dir_sectors: u32,
    pub data_sectors: u32,
    pub cluster_count: u32,
    pub fat32: Option<Fat32Details>,
}

impl VolumeInfo {
    fn from_geometry(g: &VolumeGeometry, hint: Option<&FreeSpaceHint>) -> Self {
        let fat32 = hint.map(|hint| Fat32Details {
            root_cluster: g.root_cluster,
            free_count: hint.free_count(),
            next_free: hint.next_free(),
            volume_id: g.volume_id,
            label: g.label(),
            oem_name: String::from_utf8_lossy(&g.oem_name).trim_end().to_string(),
        });
        Self {
            kind: g.kind,
            bytes_per_sector: g.bytes_per_sector,
            sectors_per_cluster: g.sectors_per_cluster,
            reserved_sectors: g.reserved_sectors,
            fat_sectors: g.num_fats as u32 * g.fat_size,
            root_dir_sectors: g.root_dir_sectors,
            data_sectors: g.data_sectors,
            cluster_count: g.cluster_count,
            fat32,
        }
    }
}

impl fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FAT type:            {}", self.kind)?;
        writeln!(f, "Bytes per sector:    {}", self.bytes_per_sector)?;
        writeln!(f, "Sectors per cluster: {}", self.sectors_per_cluster)?;
        writeln!(f, "Reserved sectors:    {}", self.reserved_sectors)?;
        writeln!(f, "FAT sectors:         {}", self.fat_sectors)?;
        writeln!(f, "Root dir sectors:    {}", self.root_dir_sectors)?;
        writeln!(f, "Data sectors:        {}", self.data_sectors)?;
        write!(f, "Cluster count:       {}", self.cluster_count)?;
        if let Some(d) = &self.fat32 {
            writeln!(f)?;
            writeln!(f, "Root cluster:        {}", d.root_cluster)?;
            writeln!(f, "Free clusters:       {}", d.free_count)?;
            writeln!(f, "Next free cluster:   {}", d.next_free)?;
            writeln!(f, "Volume ID:           {:08X}", d.volume_id)?;
            writeln!(f, "Volume label:        {}", d.label)?;
            write!(f, "OEM name:            {}", d.oem_name)?;
        }
        Ok(())
    }
}

fn read_geometry<IO: BlockIO + ?Sized>(io: &mut IO) -> FsVolumeResult<VolumeGeometry> {
    let vbr: Fat32Vbr = io.read_struct(FAT_VBR_SECTOR)?;
    let geometry = VolumeGeometry::from_boot_record(&vbr)?;

    let actual = io.capacity()?;
    let needed = geometry.volume_size_bytes();
    if actual < needed {
        return Err(FsVolumeError::ImageTooSmall { needed, actual });
    }
    Ok(geometry)
}

/// Layout summary of any FAT volume, FAT12 and FAT16 included.
pub fn volume_info<IO: BlockIO + ?Sized>(io: &mut IO) -> FsResult<VolumeInfo> {
    let geometry = read_geometry(io)?;
    if geometry.kind != FatKind::Fat32 {
        return Ok(VolumeInfo::from_geometry(&geometry, None));
    }
    let table = ChainTable::new(geometry);
    let hint = FreeSpaceHint::load(io, &geometry, &table)?;
    Ok(VolumeInfo::from_geometry(&geometry, Some(&hint)))
}

/// A mounted FAT32 volume.
///
/// Every mutating operation keeps the on-disk structures, the free-space
/// hint and the in-memory tree in step.
pub struct Fat32Volume<IO: BlockIO> {
    io: IO,
    geometry: VolumeGeometry,
    table: ChainTable,
    hint: FreeSpaceHint,
    tree: DirectoryTree,
}

impl<IO: BlockIO> Fat32Volume<IO> {
    /// Validates the boot record, loads the free-space hint and builds the
    /// directory tree.
    pub fn open(mut io: IO) -> FsResult<Self> {
        let geometry = read_geometry(&mut io)?;
        geometry.require_fat32()?;

        let table = ChainTable::new(geometry);
        let hint = FreeSpaceHint::load(&mut io, &geometry, &table)?;
        let tree = DirectoryTree::build(&mut io, &table)?;

        info!(
            "mounted FAT32 volume: {} clusters of {} bytes, {} directories",
            geometry.cluster_count,
            geometry.bytes_per_cluster(),
            tree.directory_count()
        );
        Ok(Self {
            io,
            geometry,
            table,
            hint,
            tree,
        })
    }

    #[inline]
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    #[inline]
    pub fn table(&self) -> &ChainTable {
        &self.table
    }

    #[inline]
    pub fn hint(&self) -> &FreeSpaceHint {
        &self.hint
    }

    #[inline]
    pub fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    pub fn info(&self) -> VolumeInfo {
        VolumeInfo::from_geometry(&self.geometry, Some(&self.hint))
    }

    /// Every file and empty directory, as `/`-joined paths in tree order.
    pub fn list(&self) -> Vec<String> {
        self.tree.leaf_paths()
    }

    pub fn resolve(&self, path: &str, want: Lookup) -> FsResult<&DirectoryNode> {
        Ok(resolve(&self.tree, path, want)?)
    }

    pub fn cluster_chain(&mut self, first: u32) -> FsResult<Vec<u32>> {
        Ok(self.table.chain(&mut self.io, first)?)
    }

    /// Free clusters measured from the FAT, ignoring the hint.
    pub fn count_free_clusters(&mut self) -> FsResult<u32> {
        Ok(self.table.count_free(&mut self.io)?)
    }

    /// Writes the content of the file at `path` into `out`.
    pub fn copy_to_host<W: Write + ?Sized>(&mut self, path: &str, out: &mut W) -> FsResult<u64> {
        let node = resolve(&self.tree, path, Lookup::File)?;
        content::copy_out(&mut self.io, &self.table, node, out)
    }

    /// Creates the file `path` from `size` bytes of `src`.
    pub fn copy_from_host<R: Read + ?Sized>(&mut self, path: &str, src: &mut R, size: u64) -> FsResult<DirectoryNode> {
        self.ensure_writable()?;
        content::copy_in(
            &mut self.io,
            &self.table,
            &mut self.hint,
            &mut self.tree,
            path,
            src,
            size,
        )
    }

    pub fn create_dir(&mut self, path: &str) -> FsResult<DirectoryNode> {
        self.ensure_writable()?;
        content::create_dir(&mut self.io, &self.table, &mut self.hint, &mut self.tree, path)
    }

    /// Removes `path`, recursively for directories.
    pub fn delete(&mut self, path: &str) -> FsResult<DeleteReport> {
        self.ensure_writable()?;
        deleter::delete(&mut self.io, &self.table, &mut self.hint, &mut self.tree, path)
    }

    pub fn check(&mut self, opts: CheckOptions) -> FsResult<VerifyReport> {
        if opts.repair {
            self.ensure_writable()?;
        }
        let report = Fat32Checker::new(&mut self.io, &self.table, &mut self.hint, &self.tree).check(&opts)?;
        Ok(report)
    }

    /// Re-reads the directory tree from disk.
    pub fn rebuild_tree(&mut self) -> FsResult {
        self.tree = DirectoryTree::build(&mut self.io, &self.table)?;
        debug!("tree rebuilt: {} directories", self.tree.directory_count());
        Ok(())
    }

    pub fn flush(&mut self) -> FsResult {
        Ok(self.io.flush()?)
    }

    /// Unmounts, handing back the byte region.
    pub fn into_inner(self) -> IO {
        self.io
    }

    fn ensure_writable(&self) -> FsResult {
        crate::ensure!(!self.io.is_read_only(), FsError::IO(BlockIOError::ReadOnly));
        Ok(())
    }
}
