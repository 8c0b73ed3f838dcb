// SPDX-License-Identifier: MIT

//! Short (8.3) and long name encoding.
//!
//! Names decode to printable ASCII: every byte or code unit outside
//! `0x20..=0x7E` is rendered as `?`. Names written by this crate are
//! restricted to the same alphabet, so whatever is written reads back
//! unchanged.

use crate::{
    core::{errors::*, utils::checksum_utils::checksum_u8},
    fs::fat32::{constant::*, types::Fat32LFNEntry},
};

const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[inline]
fn printable(unit: u16) -> char {
    if (0x20..0x7F).contains(&unit) {
        unit as u8 as char
    } else {
        '?'
    }
}

/// Allowed characters in a short name (after upper-casing):
/// A–Z, 0–9 and !$%'-_@~`^#&(){}.
#[inline(always)]
fn is_valid_sfn_char(b: u8) -> bool {
    matches!(b,
        b'A'..=b'Z' | b'0'..=b'9' |
        b'!' | b'$' | b'%' | b'\'' | b'-' | b'_' | b'@' | b'~' | b'`' |
        b'^' | b'#' | b'&' | b'(' | b')' | b'{' | b'}'
    )
}

fn trim_spaces(field: &[u8]) -> &[u8] {
    let end = field.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &field[..end]
}

/// Decodes an 11-byte short name: trailing spaces are trimmed from the base
/// and the extension, and `.` is only inserted when the extension is not blank.
pub fn decode_short_name(raw: &[u8; 11]) -> String {
    let mut bytes = *raw;
    if bytes[0] == FAT_ENTRY_KANJI_E5 {
        bytes[0] = FAT_ENTRY_DELETED;
    }

    let base = trim_spaces(&bytes[..8]);
    let ext = trim_spaces(&bytes[8..]);

    let mut out = String::with_capacity(12);
    out.extend(base.iter().map(|&b| printable(b as u16)));
    if !ext.is_empty() {
        out.push('.');
        out.extend(ext.iter().map(|&b| printable(b as u16)));
    }
    out
}

/// Decodes the characters of one long-name fragment, stopping at the
/// terminator or the padding.
pub fn decode_lfn_fragment(units: &[u16]) -> String {
    units
        .iter()
        .take_while(|&&u| u != FAT_LFN_TERMINATOR && u != FAT_LFN_PADDING)
        .map(|&u| printable(u))
        .collect()
}

/// The 11-byte short name spelling `name` exactly, if there is one.
///
/// `HELLO.TXT` has one; `hello.txt`, `archive.tar.gz` and `LONGFILENAME.TXT`
/// do not and need long-name records.
pub fn exact_short_name(name: &str) -> Option<[u8; 11]> {
    let (base, ext) = match name.split_once('.') {
        Some((base, ext)) => {
            if ext.is_empty() || ext.contains('.') {
                return None;
            }
            (base, ext)
        }
        None => (name, ""),
    };

    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return None;
    }
    if !base.bytes().chain(ext.bytes()).all(is_valid_sfn_char) {
        return None;
    }

    let mut raw = [b' '; 11];
    raw[..base.len()].copy_from_slice(base.as_bytes());
    raw[8..8 + ext.len()].copy_from_slice(ext.as_bytes());
    Some(raw)
}

#[inline]
pub fn needs_long_name(name: &str) -> bool {
    exact_short_name(name).is_none()
}

/// Long-name records needed for `name` (zero for exact 8.3 names).
pub fn lfn_record_count(name: &str) -> usize {
    if needs_long_name(name) {
        name.encode_utf16().count().div_ceil(FAT_LFN_CHARS_PER_ENTRY).max(1)
    } else {
        0
    }
}

fn sfn_basis(part: &str, limit: usize) -> Vec<u8> {
    part.bytes()
        .filter(|&b| b != b' ' && b != b'.')
        .map(|b| {
            let up = b.to_ascii_uppercase();
            if is_valid_sfn_char(up) { up } else { b'_' }
        })
        .take(limit)
        .collect()
}

/// Generates a `BASIS~N.EXT` short name for a long name.
///
/// `taken` reports whether a candidate already exists in the parent
/// directory. Returns `None` once every numeric tail is exhausted.
pub fn generate_short_name<F>(name: &str, mut taken: F) -> Option<[u8; 11]>
where
    F: FnMut(&[u8; 11]) -> bool,
{
    let trimmed = name.trim_start_matches('.');
    let (base, ext) = match trimmed.rsplit_once('.') {
        Some((base, ext)) => (base, ext),
        None => (trimmed, ""),
    };

    let mut basis = sfn_basis(base, 8);
    if basis.is_empty() {
        basis.push(b'_');
    }
    let ext = sfn_basis(ext, 3);

    for n in 1u32..=999_999 {
        let tail = format!("~{n}");
        let keep = basis.len().min(8 - tail.len());

        let mut raw = [b' '; 11];
        raw[..keep].copy_from_slice(&basis[..keep]);
        raw[keep..keep + tail.len()].copy_from_slice(tail.as_bytes());
        raw[8..8 + ext.len()].copy_from_slice(&ext);

        if !taken(&raw) {
            return Some(raw);
        }
    }
    None
}

/// Long-name fragments for `name` paired with `short`, in on-disk order
/// (the fragment carrying `0x40 | N` first, ordinal 1 last).
pub fn lfn_entries(name: &str, short: &[u8; 11]) -> Vec<Fat32LFNEntry> {
    let name_utf16: Vec<u16> = name.encode_utf16().collect();
    let count = name_utf16.len().div_ceil(FAT_LFN_CHARS_PER_ENTRY).max(1);
    let sum = checksum_u8(short);

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * FAT_LFN_CHARS_PER_ENTRY;
        let end = (start + FAT_LFN_CHARS_PER_ENTRY).min(name_utf16.len());
        let chunk = &name_utf16[start..end];

        let mut units = [FAT_LFN_PADDING; FAT_LFN_CHARS_PER_ENTRY];
        units[..chunk.len()].copy_from_slice(chunk);
        if chunk.len() < FAT_LFN_CHARS_PER_ENTRY {
            units[chunk.len()] = FAT_LFN_TERMINATOR;
        }

        let order = (i + 1) as u8;
        out.push(Fat32LFNEntry::new(order, i + 1 == count, &units, sum));
    }

    out.reverse();
    out
}

/// Checks that `name` can be stored as a directory entry.
pub fn validate_name(name: &str) -> FsResolverResult {
    if name.is_empty() {
        return Err(FsResolverError::InvalidName("Name is empty"));
    }
    if name == "." || name == ".." {
        return Err(FsResolverError::InvalidName("Name is reserved"));
    }
    if name.len() > FAT_LFN_MAX_CHARS {
        return Err(FsResolverError::InvalidName("Name is longer than 255 characters"));
    }
    if !name.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        return Err(FsResolverError::InvalidName("Name must be printable ASCII"));
    }
    if name.contains(RESERVED_CHARS) {
        return Err(FsResolverError::InvalidName("Name contains a reserved character"));
    }
    Ok(())
}
