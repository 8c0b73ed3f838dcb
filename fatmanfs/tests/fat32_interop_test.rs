// SPDX-License-Identifier: MIT

//! Images written here must read back through the independent `fatfs`
//! implementation, and images written by `fatfs` must mount here.

use std::io::{Cursor, Read, Write};

use fatmanfs::fat32::*;
use fscommon::BufStream;

const SIZE_BYTES: u64 = 34 * 1024 * 1024;

#[test]
fn test_fatfs_reads_our_image() {
    let mut buf = vec![0u8; SIZE_BYTES as usize];
    let opts = Fat32FormatOptions::new(SIZE_BYTES)
        .with_cluster_size(512)
        .with_label("INTEROP");
    format_volume(&mut MemBlockIO::new(&mut buf), &opts).unwrap();

    let body: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    {
        let mut vol = Fat32Volume::open(MemBlockIO::new(&mut buf)).unwrap();
        vol.create_dir("/DOCS").unwrap();
        vol.copy_from_host("/HELLO.TXT", &mut &b"hello fat"[..], 9).unwrap();
        vol.copy_from_host("/DOCS/DATA.BIN", &mut body.as_slice(), body.len() as u64)
            .unwrap();
        vol.copy_from_host("/Mixed Case Name.txt", &mut &b"lfn"[..], 3).unwrap();
        vol.flush().unwrap();
    }

    let fs = fatfs::FileSystem::new(BufStream::new(Cursor::new(buf)), fatfs::FsOptions::new()).unwrap();
    assert_eq!(fs.fat_type(), fatfs::FatType::Fat32);
    let root = fs.root_dir();

    let mut text = String::new();
    root.open_file("HELLO.TXT").unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "hello fat");

    let mut data = Vec::new();
    root.open_dir("DOCS")
        .unwrap()
        .open_file("DATA.BIN")
        .unwrap()
        .read_to_end(&mut data)
        .unwrap();
    assert_eq!(data, body);

    let names: Vec<String> = root
        .iter()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n != "." && n != "..")
        .collect();
    assert!(names.contains(&"Mixed Case Name.txt".to_string()), "{names:?}");
}

#[test]
fn test_we_read_a_fatfs_image() {
    let mut disk = Cursor::new(vec![0u8; SIZE_BYTES as usize]);
    fatfs::format_volume(
        &mut disk,
        fatfs::FormatVolumeOptions::new()
            .fat_type(fatfs::FatType::Fat32)
            .bytes_per_cluster(512),
    )
    .unwrap();

    {
        let fs = fatfs::FileSystem::new(&mut disk, fatfs::FsOptions::new()).unwrap();
        let root = fs.root_dir();
        let sub = root.create_dir("SUB").unwrap();
        let mut file = sub.create_file("NOTE.TXT").unwrap();
        file.write_all(b"written by fatfs").unwrap();
        file.flush().unwrap();
        drop(file);
        drop(sub);
        drop(root);
        fs.unmount().unwrap();
    }

    let mut buf = disk.into_inner();
    let mut vol = Fat32Volume::open(MemBlockIO::new(&mut buf)).unwrap();
    assert_eq!(vol.list(), ["/SUB/NOTE.TXT"]);

    let mut out = Vec::new();
    vol.copy_to_host("/SUB/NOTE.TXT", &mut out).unwrap();
    assert_eq!(out, b"written by fatfs");

    // Writes on top of a foreign image stay readable by both sides.
    vol.copy_from_host("/SUB/MORE.TXT", &mut &b"more"[..], 4).unwrap();
    let report = vol.check(CheckOptions::default()).unwrap();
    assert!(report.ok(), "{report}");
}
