// SPDX-License-Identifier: MIT

pub mod attr;
pub mod checker;
pub mod constant;
pub mod content;
pub mod deleter;
pub mod dir_writer;
pub mod formatter;
pub mod fsinfo;
pub mod geometry;
pub mod names;
pub mod resolver;
pub mod table;
pub mod tree;
pub mod types;
pub mod volume;

// === Public Interface ===
pub mod prelude {
    pub use super::checker::{
        CheckOptions, Fat32Checker, Finding, ReportDisplayOpts, Severity, VerifyReport,
    };
    pub use super::deleter::DeleteReport;
    pub use super::formatter::{Fat32FormatOptions, Fat32Formatter, Fat32Layout, format_volume};
    pub use super::geometry::{FatKind, VolumeGeometry};
    pub use super::resolver::Lookup;
    pub use super::tree::{DirectoryNode, DirectoryTree};
    pub use super::volume::{Fat32Details, Fat32Volume, VolumeInfo, volume_info};
    pub use crate::core::errors::*;
    pub use fatmanio::prelude::*;
}

#[cfg(test)]
pub(crate) mod test_utils {
    pub use super::prelude::*;

    use super::types::Fat32Vbr;

    pub const TEST_IMAGE_SIZE: u64 = 34 * 1024 * 1024;

    /// 34 MiB FAT32 image with 512-byte clusters, labelled `TESTVOL`.
    pub fn formatted_image() -> Vec<u8> {
        let mut image = vec![0u8; TEST_IMAGE_SIZE as usize];
        let opts = Fat32FormatOptions {
            volume_id: Some(0x1234_5678),
            ..Fat32FormatOptions::new(TEST_IMAGE_SIZE).with_cluster_size(512).with_label("TESTVOL")
        };
        format_volume(&mut MemBlockIO::new(&mut image), &opts).unwrap();
        image
    }

    pub fn read_geometry<IO: BlockIO + ?Sized>(io: &mut IO) -> VolumeGeometry {
        let vbr: Fat32Vbr = io.read_struct(0).unwrap();
        VolumeGeometry::from_boot_record(&vbr).unwrap()
    }

    pub fn mount(image: &mut [u8]) -> Fat32Volume<MemBlockIO<'_>> {
        Fat32Volume::open(MemBlockIO::new(image)).unwrap()
    }

    /// Formatted image holding the given directories, parents first.
    pub fn image_with_dirs(dirs: &[&str]) -> Vec<u8> {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        for dir in dirs {
            vol.create_dir(dir).unwrap();
        }
        drop(vol);
        image
    }
}
