// SPDX-License-Identifier: MIT

// === Disk Layout Parameters ===

pub const FAT_MIN_SECTOR_SIZE: u32 = 512;
pub const FAT_MAX_SECTOR_SIZE: u32 = 4096;
pub const FAT_SECTOR_SIZE: u16 = 512; // BPB_BytsPerSec
pub const FAT_CLUSTER_SIZE: u32 = 4096;
pub const FAT_MAX_CLUSTER_SIZE: u32 = 64 * 1024;

pub const DEFAULT_FAT_RESERVED_SECTORS: u16 = 32; // BPB_RsvdSecCnt
pub const FAT_NUM_FATS: u8 = 2; // BPB_NumFATs
pub const FAT_HEADS: u16 = 255; // BPB_NumHeads (CHS hint)
pub const FAT_SECTORS_PER_TRACK: u16 = 63; // BPB_SecPerTrk (CHS hint)
pub const FAT_HIDDEN_SECTORS: u32 = 0; // BPB_HiddSec

// === FAT type thresholds (cluster counts) ===

pub const FAT12_MAX_CLUSTERS: u32 = 4084;
pub const FAT16_MAX_CLUSTERS: u32 = 65524;
pub const FAT32_MAX_CLUSTERS: u32 = 0x0FFF_FFF5;

// === FAT Region Parameters ===

pub const FAT_ENTRY_SIZE: usize = 4;
pub const FAT_MASK: u32 = 0x0FFF_FFFF; // FAT32 entries use 28 bits
pub const FAT_MEDIA_DESCRIPTOR: u8 = 0xF8; // BPB_Media
pub const FAT_EOC: u32 = 0x0FFF_FFFF; // written end-of-chain
pub const FAT_EOC_MIN: u32 = 0x0FFF_FFF8; // anything >= reads as end-of-chain
pub const FAT_BAD_CLUSTER: u32 = 0x0FFF_FFF7;
pub const FAT_FREE: u32 = 0;
pub const FAT_FIRST_CLUSTER: u32 = 2;
pub const FAT_ROOT_CLUSTER: u32 = 2; // BPB_RootClus
/// FAT[0] (media byte in the low 8 bits) and FAT[1] as laid down by format.
pub const FAT_RESERVED_ENTRY_0: u32 = 0x0FFF_FF00 | FAT_MEDIA_DESCRIPTOR as u32;
pub const FAT_RESERVED_ENTRY_1: u32 = 0x0FFF_FFFF;

// === Special Sector Numbers ===

pub const FAT_VBR_SECTOR: u64 = 0;
pub const FAT_VBR_BACKUP_SECTOR: u64 = 6;
pub const FAT_FSINFO_SECTOR: u64 = 1;
pub const FAT_FSINFO_BACKUP_SECTOR: u64 = 7;

// === Standard FAT32 BPB / Extended BPB Constants ===

pub const FAT_JUMP_BOOT: [u8; 3] = [0xEB, 0x58, 0x90]; // BS_jmpBoot
pub const FAT_OEM_NAME: &[u8; 8] = b"FATMAN  "; // BS_OEMName
pub const FAT_DRIVE_NUMBER: u8 = 0x80; // BS_DrvNum
pub const FAT_BOOT_SIGNATURE: u8 = 0x29; // BS_BootSig
pub const FAT_FS_TYPE: &[u8; 8] = b"FAT32   "; // BS_FilSysType
pub const FAT_SIGNATURE: [u8; 2] = [0x55, 0xAA]; // bytes 510..512
pub const FAT_VOLUME_LABEL_EMPTY: &[u8; 11] = b"NO NAME    ";
pub const FAT_BOOT_CODE_SIZE: usize = 420;

// === FSINFO Constants ===

pub const FAT_FSINFO_LEAD_SIGNATURE: [u8; 4] = *b"RRaA"; // 0x41615252
pub const FAT_FSINFO_STRUCT_SIGNATURE: [u8; 4] = *b"rrAa"; // 0x61417272
pub const FAT_FSINFO_TRAIL_SIGNATURE: [u8; 4] = [0x00, 0x00, 0x55, 0xAA]; // 0xAA550000
pub const FAT_FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;
pub const FAT_FSINFO_FREE_COUNT_OFFSET: u64 = 488;
pub const FAT_FSINFO_NEXT_FREE_OFFSET: u64 = 492;

// === Directory records ===

pub const FAT_DIR_ENTRY_SIZE: usize = 32;
pub const FAT_ENTRY_END_OF_DIR: u8 = 0x00;
pub const FAT_ENTRY_DELETED: u8 = 0xE5;
/// Stored in place of a leading 0xE5 that belongs to the name itself.
pub const FAT_ENTRY_KANJI_E5: u8 = 0x05;
pub const FAT_DOT_NAME: &[u8; 11] = b".          ";
pub const FAT_DOTDOT_NAME: &[u8; 11] = b"..         ";

// === Long names ===

pub const FAT_LFN_CHARS_PER_ENTRY: usize = 13;
pub const FAT_LFN_LAST_ENTRY: u8 = 0x40;
pub const FAT_LFN_ORDINAL_MASK: u8 = 0x3F;
pub const FAT_LFN_MAX_CHARS: usize = 255;
pub const FAT_LFN_TERMINATOR: u16 = 0x0000;
pub const FAT_LFN_PADDING: u16 = 0xFFFF;
