// SPDX-License-Identifier: MIT

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::fs::fat32::{
    attr::Fat32Attributes,
    constant::*,
    names::{exact_short_name, lfn_entries},
};

/// A full directory entry as it is laid out on disk: long-name fragments
/// (last fragment first) followed by the short record.
#[derive(Debug, Clone)]
pub struct Fat32Entries {
    pub lfn: Vec<Fat32LFNEntry>,
    pub entry: Fat32Entry,
}

impl Fat32Entries {
    /// Records for a regular file. Long-name fragments are only produced when
    /// `short` is not the exact 8.3 spelling of `name`.
    pub fn file(name: &str, short: [u8; 11], cluster: u32, size: u32, stamp: (u16, u16, u8)) -> Self {
        let lfn = if exact_short_name(name) == Some(short) {
            Vec::new()
        } else {
            lfn_entries(name, &short)
        };
        let (date, time, tenth) = stamp;
        let entry = Fat32Entry::new(
            short,
            Fat32Attributes::ARCHIVE.bits(),
            cluster,
            size,
            date,
            time,
            tenth,
        );
        Self { lfn, entry }
    }

    pub fn volume_label(label: [u8; 11], stamp: (u16, u16, u8)) -> Self {
        let (date, time, tenth) = stamp;
        let entry = Fat32Entry::new(
            label,
            Fat32Attributes::VOLUME_ID.bits(),
            0,
            0,
            date,
            time,
            tenth,
        );
        Self {
            lfn: Vec::new(),
            entry,
        }
    }

    /// Number of 32-byte slots needed on disk.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.lfn.len() + 1
    }

    pub fn to_raw_buffer(&self, buf: &mut Vec<u8>) {
        for lfn in &self.lfn {
            buf.extend_from_slice(lfn.as_bytes());
        }
        buf.extend_from_slice(self.entry.as_bytes());
    }
}

/// 32-byte short (8.3) directory record.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct Fat32Entry {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_reserved: u8,
    pub creation_time_tenth: u8,
    pub creation_time: U16,
    pub creation_date: U16,
    pub access_date: U16,
    pub first_cluster_high: U16,
    pub write_time: U16,
    pub write_date: U16,
    pub first_cluster_low: U16,
    pub file_size: U32,
}

impl Fat32Entry {
    pub fn new(name: [u8; 11], attr: u8, cluster: u32, size: u32, date: u16, time: u16, tenth: u8) -> Self {
        Self {
            name,
            attr,
            nt_reserved: 0,
            creation_time_tenth: tenth,
            creation_time: U16::new(time),
            creation_date: U16::new(date),
            access_date: U16::new(date),
            first_cluster_high: U16::new((cluster >> 16) as u16),
            write_time: U16::new(time),
            write_date: U16::new(date),
            first_cluster_low: U16::new(cluster as u16),
            file_size: U32::new(size),
        }
    }

    /// Decodes one raw slot. `None` when `slot` is not 32 bytes long.
    #[inline]
    pub fn from_slot(slot: &[u8]) -> Option<Self> {
        Self::read_from_bytes(slot).ok()
    }

    #[inline]
    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_high.get() as u32) << 16) | self.first_cluster_low.get() as u32
    }

    #[inline]
    pub fn is_end_of_dir(&self) -> bool {
        self.name[0] == FAT_ENTRY_END_OF_DIR
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.name[0] == FAT_ENTRY_DELETED
    }

    #[inline]
    pub fn is_long_name(&self) -> bool {
        Fat32Attributes::is_long_name(self.attr)
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        Fat32Attributes::is_directory(self.attr)
    }

    #[inline]
    pub fn is_volume_label(&self) -> bool {
        Fat32Attributes::is_volume_label(self.attr)
    }
}

/// 32-byte long-name fragment record.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct Fat32LFNEntry {
    pub order: u8,
    pub name1: [U16; 5],
    pub attr: u8,
    pub type_field: u8,
    pub checksum: u8,
    pub name2: [U16; 6],
    pub zero: U16,
    pub name3: [U16; 2],
}

impl Fat32LFNEntry {
    /// `name_chunk` holds at most 13 code units, already padded by the caller.
    pub fn new(order: u8, is_last: bool, name_chunk: &[u16], checksum: u8) -> Self {
        let mut units = [U16::new(FAT_LFN_PADDING); FAT_LFN_CHARS_PER_ENTRY];
        for (slot, &c) in units.iter_mut().zip(name_chunk) {
            *slot = U16::new(c);
        }

        let mut name1 = [U16::ZERO; 5];
        let mut name2 = [U16::ZERO; 6];
        let mut name3 = [U16::ZERO; 2];
        name1.copy_from_slice(&units[0..5]);
        name2.copy_from_slice(&units[5..11]);
        name3.copy_from_slice(&units[11..13]);

        Self {
            order: if is_last { order | FAT_LFN_LAST_ENTRY } else { order },
            name1,
            attr: Fat32Attributes::LFN.bits(),
            type_field: 0,
            checksum,
            name2,
            zero: U16::ZERO,
            name3,
        }
    }

    #[inline]
    pub fn from_slot(slot: &[u8]) -> Option<Self> {
        Self::read_from_bytes(slot).ok()
    }

    #[inline]
    pub fn ordinal(&self) -> u8 {
        self.order & FAT_LFN_ORDINAL_MASK
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.order & FAT_LFN_LAST_ENTRY != 0
    }

    pub fn extract_utf16(&self) -> [u16; FAT_LFN_CHARS_PER_ENTRY] {
        let mut out = [0u16; FAT_LFN_CHARS_PER_ENTRY];
        let units = self.name1.iter().chain(&self.name2).chain(&self.name3);
        for (dst, src) in out.iter_mut().zip(units) {
            *dst = src.get();
        }
        out
    }
}
