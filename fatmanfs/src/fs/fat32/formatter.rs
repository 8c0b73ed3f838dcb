// SPDX-License-Identifier: MIT

//! Fresh FAT32 volume creation.

use log::{debug, info};
use zerocopy::IntoBytes;

use crate::{
    core::{errors::*, utils::time_utils},
    fs::fat32::{constant::*, types::*},
};
use fatmanio::prelude::*;

/// User-facing knobs for [`format_volume`].
#[derive(Debug, Clone)]
pub struct Fat32FormatOptions {
    pub size_bytes: u64,
    pub bytes_per_sector: u16,
    pub cluster_size: u32,
    pub num_fats: u8,
    pub reserved_sectors: u16,
    pub label: Option<String>,
    /// Defaults to a clock-derived serial.
    pub volume_id: Option<u32>,
}

impl Default for Fat32FormatOptions {
    fn default() -> Self {
        Self {
            size_bytes: 0,
            bytes_per_sector: FAT_SECTOR_SIZE,
            cluster_size: FAT_CLUSTER_SIZE,
            num_fats: FAT_NUM_FATS,
            reserved_sectors: DEFAULT_FAT_RESERVED_SECTORS,
            label: None,
            volume_id: None,
        }
    }
}

impl Fat32FormatOptions {
    pub fn new(size_bytes: u64) -> Self {
        Self {
            size_bytes,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_cluster_size(mut self, cluster_size: u32) -> Self {
        self.cluster_size = cluster_size;
        self
    }
}

/// Resolved on-disk layout of a volume about to be formatted.
#[derive(Debug, Clone)]
pub struct Fat32Layout {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub total_sectors: u32,
    pub fat_size: u32,
    pub cluster_count: u32,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    /// Whether a label record goes into the root directory.
    pub has_label: bool,
}

impl Fat32Layout {
    pub fn from_options(opts: &Fat32FormatOptions) -> FsFormatterResult<Self> {
        let bps = opts.bytes_per_sector as u32;
        crate::ensure!(
            bps.is_power_of_two() && (FAT_MIN_SECTOR_SIZE..=FAT_MAX_SECTOR_SIZE).contains(&bps),
            FsFormatterError::Invalid("Sector size must be a power of two between 512 and 4096")
        );
        crate::ensure!(
            opts.cluster_size.is_power_of_two()
                && opts.cluster_size >= bps
                && opts.cluster_size <= FAT_MAX_CLUSTER_SIZE
                && opts.cluster_size / bps <= 128,
            FsFormatterError::Invalid("Cluster size must be a power-of-two multiple of the sector size")
        );
        crate::ensure!(opts.num_fats >= 1, FsFormatterError::Invalid("At least one FAT is required"));
        crate::ensure!(
            opts.reserved_sectors as u64 > FAT_FSINFO_BACKUP_SECTOR,
            FsFormatterError::Invalid("Too few reserved sectors for the boot record backups")
        );

        let total = opts.size_bytes / bps as u64;
        crate::ensure!(
            total <= u32::MAX as u64,
            FsFormatterError::Invalid("Volume is too large for 32-bit sector counts")
        );
        let total_sectors = total as u32;
        let sectors_per_cluster = (opts.cluster_size / bps) as u8;

        let (fat_size, cluster_count) = converge_fat_layout(
            bps,
            total_sectors as u64,
            opts.reserved_sectors as u32,
            FAT_ENTRY_SIZE as u32,
            FAT_FIRST_CLUSTER,
            opts.num_fats,
            sectors_per_cluster as u32,
        );

        crate::ensure!(
            cluster_count > FAT16_MAX_CLUSTERS,
            FsFormatterError::Invalid("Volume is too small for FAT32 with this cluster size")
        );
        crate::ensure!(
            cluster_count <= FAT32_MAX_CLUSTERS,
            FsFormatterError::Invalid("Volume has too many clusters; use a larger cluster size")
        );

        let (volume_label, has_label) = match opts.label.as_deref() {
            Some(label) => (encode_label(label)?, true),
            None => (*FAT_VOLUME_LABEL_EMPTY, false),
        };

        Ok(Self {
            bytes_per_sector: opts.bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors: opts.reserved_sectors,
            num_fats: opts.num_fats,
            total_sectors,
            fat_size,
            cluster_count,
            volume_id: opts.volume_id.unwrap_or_else(time_utils::volume_id_now),
            volume_label,
            has_label,
        })
    }

    #[inline]
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    #[inline]
    pub fn volume_size_bytes(&self) -> u64 {
        self.total_sectors as u64 * self.bytes_per_sector as u64
    }

    fn sector_offset(&self, sector: u64) -> u64 {
        sector * self.bytes_per_sector as u64
    }

    fn fat_offset(&self, fat_index: u8) -> u64 {
        self.sector_offset(self.reserved_sectors as u64 + fat_index as u64 * self.fat_size as u64)
    }

    fn root_offset(&self) -> u64 {
        self.sector_offset(self.reserved_sectors as u64 + self.num_fats as u64 * self.fat_size as u64)
    }
}

/// Uppercases and pads a volume label to its 11-byte field.
fn encode_label(label: &str) -> FsFormatterResult<[u8; 11]> {
    crate::ensure!(
        !label.is_empty() && label.len() <= 11,
        FsFormatterError::Invalid("Volume label must be 1 to 11 characters")
    );
    crate::ensure!(
        label
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"\"*+,./:;<=>?[\\]|".contains(&b) || b == b' '),
        FsFormatterError::Invalid("Volume label contains a character FAT does not allow")
    );
    let mut out = [b' '; 11];
    for (dst, b) in out.iter_mut().zip(label.bytes()) {
        *dst = b.to_ascii_uppercase();
    }
    Ok(out)
}

/// Lays down the metadata of a fresh volume on `io`.
///
/// Only the reserved area, the FATs and the root cluster are written; the
/// rest of the data region is left as found.
pub struct Fat32Formatter<'a, IO: BlockIO + ?Sized> {
    io: &'a mut IO,
    layout: &'a Fat32Layout,
}

impl<'a, IO: BlockIO + ?Sized> Fat32Formatter<'a, IO> {
    pub fn new(io: &'a mut IO, layout: &'a Fat32Layout) -> Self {
        Self { io, layout }
    }

    pub fn format(&mut self) -> FsFormatterResult {
        let needed = self.layout.volume_size_bytes();
        let capacity = self.io.capacity()?;
        crate::ensure!(
            capacity >= needed,
            FsFormatterError::Invalid("Target is smaller than the requested volume")
        );

        self.io.zero_fill(0, self.layout.sector_offset(self.layout.reserved_sectors as u64) as usize)?;
        self.write_boot_records()?;
        self.write_fsinfo()?;
        self.write_fat_region()?;
        self.write_root_dir_cluster()?;
        self.io.flush()?;

        info!(
            "formatted FAT32: {} sectors, {} clusters of {} bytes",
            self.layout.total_sectors,
            self.layout.cluster_count,
            self.layout.bytes_per_cluster()
        );
        Ok(())
    }

    fn write_boot_records(&mut self) -> FsFormatterResult {
        let vbr = Fat32Vbr::from_layout(self.layout);
        for sector in [FAT_VBR_SECTOR, FAT_VBR_BACKUP_SECTOR] {
            self.io.write_at(self.layout.sector_offset(sector), vbr.as_bytes())?;
        }
        Ok(())
    }

    fn write_fsinfo(&mut self) -> FsFormatterResult {
        // The root directory owns cluster 2.
        let fsinfo = Fat32FsInfo::new(self.layout.cluster_count - 1, FAT_ROOT_CLUSTER + 1);
        for sector in [FAT_FSINFO_SECTOR, FAT_FSINFO_BACKUP_SECTOR] {
            self.io.write_at(self.layout.sector_offset(sector), fsinfo.as_bytes())?;
        }
        Ok(())
    }

    fn write_fat_region(&mut self) -> FsFormatterResult {
        let mut head = [0u8; 3 * FAT_ENTRY_SIZE];
        for (slot, value) in head
            .chunks_exact_mut(FAT_ENTRY_SIZE)
            .zip([FAT_RESERVED_ENTRY_0, FAT_RESERVED_ENTRY_1, FAT_EOC])
        {
            slot.copy_from_slice(&value.to_le_bytes());
        }

        let fat_bytes = self.layout.fat_size as u64 * self.layout.bytes_per_sector as u64;
        for fat_index in 0..self.layout.num_fats {
            let offset = self.layout.fat_offset(fat_index);
            self.io.zero_fill(offset, fat_bytes as usize)?;
            self.io.write_at(offset, &head)?;
            debug!("FAT #{fat_index} at {offset:#x} ({fat_bytes} bytes)");
        }
        Ok(())
    }

    fn write_root_dir_cluster(&mut self) -> FsFormatterResult {
        let offset = self.layout.root_offset();
        self.io.zero_fill(offset, self.layout.bytes_per_cluster() as usize)?;

        if self.layout.has_label {
            let mut buf = Vec::with_capacity(FAT_DIR_ENTRY_SIZE);
            Fat32Entries::volume_label(self.layout.volume_label, time_utils::fat_datetime_now())
                .to_raw_buffer(&mut buf);
            self.io.write_at(offset, &buf)?;
        }
        Ok(())
    }
}

/// Validates `opts` and formats `io` in one go.
pub fn format_volume<IO: BlockIO + ?Sized>(io: &mut IO, opts: &Fat32FormatOptions) -> FsFormatterResult<Fat32Layout> {
    let layout = Fat32Layout::from_options(opts)?;
    Fat32Formatter::new(io, &layout).format()?;
    Ok(layout)
}

/// Computes the FAT size and cluster count for a given FAT configuration.
///
/// Iterates until the FAT is large enough to describe every cluster that
/// remains once the FATs themselves are accounted for.
///
/// Returns `(fat_size, cluster_count)`, the FAT size in sectors and the number
/// of data clusters.
pub fn converge_fat_layout(
    sector_size: u32,
    total_sectors: u64,
    reserved_sectors: u32,
    entry_size: u32,
    min_entries: u32,
    num_fats: u8,
    sectors_per_cluster: u32,
) -> (u32, u32) {
    let spc = sectors_per_cluster.max(1) as u64;
    let reserved = reserved_sectors as u64;

    let mut cluster_count = 0u32;
    let mut fat_size = 0u32;

    for _ in 0..32 {
        let entries = cluster_count as u64 + min_entries as u64;
        let fat_size_new = (entries * entry_size as u64).div_ceil(sector_size.max(1) as u64) as u32;
        let fat_area = fat_size as u64 * num_fats as u64;
        let data_sectors = total_sectors.saturating_sub(reserved).saturating_sub(fat_area);
        let cluster_count_new = (data_sectors / spc).min(u32::MAX as u64) as u32;

        if cluster_count_new == cluster_count && fat_size_new == fat_size {
            break;
        }

        cluster_count = cluster_count_new;
        fat_size = fat_size_new;
    }

    (fat_size, cluster_count)
}
