// SPDX-License-Identifier: MIT

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::fs::fat32::{constant::*, formatter::Fat32Layout};

/// Boot sector with the FAT32 extended BPB (512 bytes).
///
/// The common BPB prefix (up to `total_sectors_32`) is shared by FAT12/16,
/// so the same structure is used to read any FAT volume.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct Fat32Vbr {
    pub jump_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: U16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: U16,
    pub num_fats: u8,
    pub root_entry_count: U16,
    pub total_sectors_16: U16,
    pub media: u8,
    pub fat_size_16: U16,
    pub sectors_per_track: U16,
    pub num_heads: U16,
    pub hidden_sectors: U32,
    pub total_sectors_32: U32,

    // FAT32 Extended BPB
    pub fat_size_32: U32,
    pub ext_flags: U16,
    pub fs_version: U16,
    pub root_cluster: U32,
    pub fsinfo_sector: U16,
    pub backup_boot_sector: U16,
    pub reserved: [u8; 12],

    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: U32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],

    pub boot_code: [u8; FAT_BOOT_CODE_SIZE],
    pub signature: [u8; 2],
}

impl Fat32Vbr {
    pub fn from_layout(layout: &Fat32Layout) -> Self {
        Self {
            jump_boot: FAT_JUMP_BOOT,
            oem_name: *FAT_OEM_NAME,
            bytes_per_sector: U16::new(layout.bytes_per_sector),
            sectors_per_cluster: layout.sectors_per_cluster,
            reserved_sectors: U16::new(layout.reserved_sectors),
            num_fats: layout.num_fats,
            root_entry_count: U16::ZERO,
            total_sectors_16: U16::ZERO,
            media: FAT_MEDIA_DESCRIPTOR,
            fat_size_16: U16::ZERO,
            sectors_per_track: U16::new(FAT_SECTORS_PER_TRACK),
            num_heads: U16::new(FAT_HEADS),
            hidden_sectors: U32::new(FAT_HIDDEN_SECTORS),
            total_sectors_32: U32::new(layout.total_sectors),
            fat_size_32: U32::new(layout.fat_size),
            ext_flags: U16::ZERO,
            fs_version: U16::ZERO,
            root_cluster: U32::new(FAT_ROOT_CLUSTER),
            fsinfo_sector: U16::new(FAT_FSINFO_SECTOR as u16),
            backup_boot_sector: U16::new(FAT_VBR_BACKUP_SECTOR as u16),
            reserved: [0u8; 12],
            drive_number: FAT_DRIVE_NUMBER,
            reserved1: 0,
            boot_signature: FAT_BOOT_SIGNATURE,
            volume_id: U32::new(layout.volume_id),
            volume_label: layout.volume_label,
            fs_type: *FAT_FS_TYPE,
            boot_code: [0u8; FAT_BOOT_CODE_SIZE],
            signature: FAT_SIGNATURE,
        }
    }

    #[inline]
    pub fn has_signature(&self) -> bool {
        self.signature == FAT_SIGNATURE
    }
}

/// FSInfo sector: advisory free-cluster count and next-free hint (512 bytes).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct Fat32FsInfo {
    pub lead_signature: [u8; 4],
    pub reserved1: [u8; 480],
    pub struct_signature: [u8; 4],
    pub free_cluster_count: U32,
    pub next_free_cluster: U32,
    pub reserved2: [u8; 12],
    pub trail_signature: [u8; 4],
}

impl Fat32FsInfo {
    pub fn new(free_cluster_count: u32, next_free_cluster: u32) -> Self {
        Self {
            lead_signature: FAT_FSINFO_LEAD_SIGNATURE,
            reserved1: [0u8; 480],
            struct_signature: FAT_FSINFO_STRUCT_SIGNATURE,
            free_cluster_count: U32::new(free_cluster_count),
            next_free_cluster: U32::new(next_free_cluster),
            reserved2: [0u8; 12],
            trail_signature: FAT_FSINFO_TRAIL_SIGNATURE,
        }
    }

    pub fn has_valid_signatures(&self) -> bool {
        self.lead_signature == FAT_FSINFO_LEAD_SIGNATURE
            && self.struct_signature == FAT_FSINFO_STRUCT_SIGNATURE
            && self.trail_signature == FAT_FSINFO_TRAIL_SIGNATURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_and_offsets() {
        assert_eq!(size_of::<Fat32Vbr>(), 512);
        assert_eq!(size_of::<Fat32FsInfo>(), 512);

        let mut raw = [0u8; 512];
        raw[11..13].copy_from_slice(&4096u16.to_le_bytes());
        raw[13] = 8;
        raw[44..48].copy_from_slice(&7u32.to_le_bytes());
        raw[48..50].copy_from_slice(&1u16.to_le_bytes());
        raw[510] = 0x55;
        raw[511] = 0xAA;

        let vbr = Fat32Vbr::read_from_bytes(&raw[..]).unwrap();
        assert_eq!(vbr.bytes_per_sector.get(), 4096);
        assert_eq!(vbr.sectors_per_cluster, 8);
        assert_eq!(vbr.root_cluster.get(), 7);
        assert_eq!(vbr.fsinfo_sector.get(), 1);
        assert!(vbr.has_signature());
    }

    #[test]
    fn fsinfo_layout() {
        let info = Fat32FsInfo::new(1234, 3);
        let raw = info.as_bytes();
        assert_eq!(&raw[0..4], &0x4161_5252u32.to_le_bytes());
        assert_eq!(&raw[484..488], &0x6141_7272u32.to_le_bytes());
        assert_eq!(&raw[488..492], &1234u32.to_le_bytes());
        assert_eq!(&raw[492..496], &3u32.to_le_bytes());
        assert_eq!(&raw[508..512], &0xAA55_0000u32.to_le_bytes());
        assert!(info.has_valid_signatures());
    }
}
