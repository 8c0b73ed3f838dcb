// SPDX-License-Identifier: MIT

pub use crate::core::meta::*;

use core::fmt;

use crate::{
    core::{cursor::ClusterMeta, errors::*},
    fs::fat32::{constant::*, types::Fat32Vbr},
};

/// FAT width, decided by the data-cluster count alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatKind {
    Fat12,
    Fat16,
    Fat32,
}

impl FatKind {
    pub fn from_cluster_count(cluster_count: u32) -> Self {
        if cluster_count <= FAT12_MAX_CLUSTERS {
            FatKind::Fat12
        } else if cluster_count <= FAT16_MAX_CLUSTERS {
            FatKind::Fat16
        } else {
            FatKind::Fat32
        }
    }
}

impl fmt::Display for FatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FatKind::Fat12 => "FAT12",
            FatKind::Fat16 => "FAT16",
            FatKind::Fat32 => "FAT32",
        })
    }
}

/// Geometry decoded from the boot record. Immutable after mount.
#[derive(Debug, Clone, Copy)]
pub struct VolumeGeometry {
    pub kind: FatKind,

    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    /// Sectors per FAT copy.
    pub fat_size: u32,
    pub total_sectors: u32,

    pub root_dir_sectors: u32,
    pub first_data_sector: u32,
    pub data_sectors: u32,
    pub cluster_count: u32,

    // FAT32 extended fields, zero on FAT12/16.
    pub root_cluster: u32,
    pub fsinfo_sector: u16,
    pub backup_boot_sector: u16,

    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub oem_name: [u8; 8],
    pub media: u8,
}

impl VolumeGeometry {
    /// Decodes and validates a boot record.
    ///
    /// Any FAT width is accepted here; FAT32-only callers follow up with
    /// [`VolumeGeometry::require_fat32`].
    pub fn from_boot_record(vbr: &Fat32Vbr) -> FsVolumeResult<Self> {
        if !vbr.has_signature() {
            return Err(FsVolumeError::BadBootSignature);
        }

        let bps = vbr.bytes_per_sector.get();
        if !bps.is_power_of_two()
            || (bps as u32) < FAT_MIN_SECTOR_SIZE
            || (bps as u32) > FAT_MAX_SECTOR_SIZE
        {
            return Err(FsVolumeError::InvalidGeometry(
                "Bytes per sector must be a power of two between 512 and 4096",
            ));
        }

        let spc = vbr.sectors_per_cluster;
        if !spc.is_power_of_two() {
            return Err(FsVolumeError::InvalidGeometry(
                "Sectors per cluster must be a non-zero power of two",
            ));
        }

        let reserved = vbr.reserved_sectors.get();
        crate::ensure!(
            reserved != 0,
            FsVolumeError::InvalidGeometry("Reserved sector count is zero")
        );
        let num_fats = vbr.num_fats;
        crate::ensure!(num_fats != 0, FsVolumeError::InvalidGeometry("FAT count is zero"));

        let fat_size = match vbr.fat_size_16.get() {
            0 => vbr.fat_size_32.get(),
            n => n as u32,
        };
        crate::ensure!(fat_size != 0, FsVolumeError::InvalidGeometry("FAT size is zero"));

        let total_sectors = match vbr.total_sectors_16.get() {
            0 => vbr.total_sectors_32.get(),
            n => n as u32,
        };
        crate::ensure!(
            total_sectors != 0,
            FsVolumeError::InvalidGeometry("Total sector count is zero")
        );

        let root_entry_count = vbr.root_entry_count.get();
        let root_dir_sectors = (root_entry_count as u32 * FAT_DIR_ENTRY_SIZE as u32).div_ceil(bps as u32);

        let overhead = reserved as u64 + num_fats as u64 * fat_size as u64 + root_dir_sectors as u64;
        if overhead >= total_sectors as u64 {
            return Err(FsVolumeError::InvalidGeometry(
                "Reserved, FAT and root directory regions exceed the volume",
            ));
        }

        let first_data_sector = overhead as u32;
        let data_sectors = total_sectors - first_data_sector;
        let cluster_count = data_sectors / spc as u32;
        let kind = FatKind::from_cluster_count(cluster_count);

        let mut geometry = Self {
            kind,
            bytes_per_sector: bps,
            sectors_per_cluster: spc,
            reserved_sectors: reserved,
            num_fats,
            root_entry_count,
            fat_size,
            total_sectors,
            root_dir_sectors,
            first_data_sector,
            data_sectors,
            cluster_count,
            root_cluster: 0,
            fsinfo_sector: 0,
            backup_boot_sector: 0,
            volume_id: 0,
            volume_label: *FAT_VOLUME_LABEL_EMPTY,
            oem_name: vbr.oem_name,
            media: vbr.media,
        };

        if kind == FatKind::Fat32 {
            crate::ensure!(
                root_dir_sectors == 0,
                FsVolumeError::InvalidGeometry("FAT32 volume declares a fixed root directory")
            );
            crate::ensure!(
                cluster_count <= FAT32_MAX_CLUSTERS,
                FsVolumeError::InvalidGeometry("Cluster count exceeds the FAT32 maximum")
            );

            let needed_fat_bytes = (cluster_count as u64 + FAT_FIRST_CLUSTER as u64) * FAT_ENTRY_SIZE as u64;
            crate::ensure!(
                fat_size as u64 * bps as u64 >= needed_fat_bytes,
                FsVolumeError::InvalidGeometry("FAT is too small for the cluster count")
            );

            geometry.root_cluster = vbr.root_cluster.get();
            geometry.fsinfo_sector = vbr.fsinfo_sector.get();
            geometry.backup_boot_sector = vbr.backup_boot_sector.get();
            geometry.volume_id = vbr.volume_id.get();
            geometry.volume_label = vbr.volume_label;

            crate::ensure!(
                geometry.is_valid_unit(geometry.root_cluster),
                FsVolumeError::InvalidGeometry("Root cluster is outside the cluster table")
            );
            crate::ensure!(
                geometry.fsinfo_sector != 0 && geometry.fsinfo_sector < reserved,
                FsVolumeError::InvalidGeometry("FSInfo sector is outside the reserved region")
            );
        }

        Ok(geometry)
    }

    /// Rejects FAT12/16 volumes for operations only implemented for FAT32.
    pub fn require_fat32(&self) -> FsVolumeResult {
        match self.kind {
            FatKind::Fat32 => Ok(()),
            FatKind::Fat12 => Err(FsVolumeError::Unsupported("FAT12 volumes are not supported")),
            FatKind::Fat16 => Err(FsVolumeError::Unsupported("FAT16 volumes are not supported")),
        }
    }

    #[inline]
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    #[inline]
    pub fn max_valid_cluster(&self) -> u32 {
        self.cluster_count + 1
    }

    #[inline]
    pub fn sector_offset(&self, sector: u64) -> u64 {
        sector * self.bytes_per_sector as u64
    }

    /// Byte offset of FAT copy `fat_index`.
    #[inline]
    pub fn fat_offset(&self, fat_index: u8) -> u64 {
        self.sector_offset(self.reserved_sectors as u64 + fat_index as u64 * self.fat_size as u64)
    }

    #[inline]
    pub fn fat_size_bytes(&self) -> u64 {
        self.sector_offset(self.fat_size as u64)
    }

    /// Byte offset of the first sector of `cluster`.
    #[inline]
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        let sector = self.first_data_sector as u64
            + (cluster - FAT_FIRST_CLUSTER) as u64 * self.sectors_per_cluster as u64;
        self.sector_offset(sector)
    }

    /// Bytes the image must hold for the declared volume.
    #[inline]
    pub fn volume_size_bytes(&self) -> u64 {
        self.sector_offset(self.total_sectors as u64)
    }

    /// Trimmed volume label; empty for `NO NAME`.
    pub fn label(&self) -> String {
        if &self.volume_label == FAT_VOLUME_LABEL_EMPTY {
            return String::new();
        }
        String::from_utf8_lossy(&self.volume_label).trim_end().to_string()
    }
}

impl FsMeta<u32> for VolumeGeometry {
    fn first_data_unit(&self) -> u32 {
        FAT_FIRST_CLUSTER
    }

    fn last_data_unit(&self) -> u32 {
        self.max_valid_cluster()
    }

    fn total_units(&self) -> usize {
        self.cluster_count as usize
    }
}

impl ClusterMeta for VolumeGeometry {
    const EOC_MIN: u32 = FAT_EOC_MIN;
    const ENTRY_MASK: u32 = FAT_MASK;

    fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64 {
        self.fat_offset(fat_index) + cluster as u64 * FAT_ENTRY_SIZE as u64
    }

    fn num_fats(&self) -> u8 {
        self.num_fats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeros;
    use zerocopy::byteorder::little_endian::{U16, U32};

    fn fat32_vbr() -> Fat32Vbr {
        let mut vbr = Fat32Vbr::new_zeroed();
        vbr.bytes_per_sector = U16::new(512);
        vbr.sectors_per_cluster = 1;
        vbr.reserved_sectors = U16::new(32);
        vbr.num_fats = 2;
        vbr.total_sectors_32 = U32::new(69_632);
        vbr.fat_size_32 = U32::new(536);
        vbr.root_cluster = U32::new(2);
        vbr.fsinfo_sector = U16::new(1);
        vbr.backup_boot_sector = U16::new(6);
        vbr.volume_label = *b"TESTVOL    ";
        vbr.signature = FAT_SIGNATURE;
        vbr
    }

    #[test]
    fn derives_fat32_geometry() {
        let g = VolumeGeometry::from_boot_record(&fat32_vbr()).unwrap();
        assert_eq!(g.kind, FatKind::Fat32);
        assert_eq!(g.root_dir_sectors, 0);
        assert_eq!(g.first_data_sector, 32 + 2 * 536);
        assert_eq!(g.cluster_count, 69_632 - 1104);
        assert_eq!(g.max_valid_cluster(), g.cluster_count + 1);
        assert_eq!(g.bytes_per_cluster(), 512);
        assert_eq!(g.cluster_offset(2), 1104 * 512);
        assert_eq!(g.cluster_offset(3), 1105 * 512);
        assert_eq!(g.fat_entry_offset(5, 1), (32 + 536) * 512 + 20);
        assert_eq!(g.label(), "TESTVOL");
        assert!(g.require_fat32().is_ok());
    }

    #[test]
    fn classifies_small_volumes() {
        let mut vbr = fat32_vbr();
        vbr.root_entry_count = U16::new(512);
        vbr.total_sectors_32 = U32::ZERO;
        vbr.total_sectors_16 = U16::new(20_000);
        vbr.fat_size_16 = U16::new(20);
        vbr.sectors_per_cluster = 4;
        vbr.reserved_sectors = U16::new(1);

        let g = VolumeGeometry::from_boot_record(&vbr).unwrap();
        assert_eq!(g.fat_size, 20);
        assert_eq!(g.root_dir_sectors, 32);
        assert_eq!(g.cluster_count, (20_000 - 1 - 40 - 32) / 4);
        assert_eq!(g.kind, FatKind::Fat16);
        assert!(matches!(g.require_fat32(), Err(FsVolumeError::Unsupported(_))));

        vbr.total_sectors_16 = U16::new(4_000);
        let g = VolumeGeometry::from_boot_record(&vbr).unwrap();
        assert_eq!(g.kind, FatKind::Fat12);
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(FatKind::from_cluster_count(4084), FatKind::Fat12);
        assert_eq!(FatKind::from_cluster_count(4085), FatKind::Fat16);
        assert_eq!(FatKind::from_cluster_count(65524), FatKind::Fat16);
        assert_eq!(FatKind::from_cluster_count(65525), FatKind::Fat32);
    }

    #[test]
    fn rejects_inconsistent_geometry() {
        let mut vbr = fat32_vbr();
        vbr.signature = [0, 0];
        assert_eq!(
            VolumeGeometry::from_boot_record(&vbr).unwrap_err(),
            FsVolumeError::BadBootSignature
        );

        let mut vbr = fat32_vbr();
        vbr.bytes_per_sector = U16::new(1000);
        assert!(matches!(
            VolumeGeometry::from_boot_record(&vbr),
            Err(FsVolumeError::InvalidGeometry(_))
        ));

        let mut vbr = fat32_vbr();
        vbr.sectors_per_cluster = 3;
        assert!(VolumeGeometry::from_boot_record(&vbr).is_err());

        let mut vbr = fat32_vbr();
        vbr.fat_size_32 = U32::new(40_000);
        assert!(VolumeGeometry::from_boot_record(&vbr).is_err());

        let mut vbr = fat32_vbr();
        vbr.root_cluster = U32::new(1);
        assert!(VolumeGeometry::from_boot_record(&vbr).is_err());

        let mut vbr = fat32_vbr();
        vbr.fat_size_32 = U32::new(100);
        assert!(VolumeGeometry::from_boot_record(&vbr).is_err());
    }
}
