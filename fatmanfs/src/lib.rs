// SPDX-License-Identifier: MIT

//! FAT32 image engine: mount a volume held in any [`fatmanio::BlockIO`]
//! byte region, then list, copy in and out, create directories, delete,
//! check and format.

// Core Modules
pub mod core;
pub mod fs;

pub use core::errors::*;
pub use core::utils::path_utils::*;

/// FAT32 filesystem implementation.
///
/// See [`fat32::Fat32Volume`] and [`fat32::format_volume`].
pub mod fat32 {
    pub use super::fs::fat32::prelude::*;
}
