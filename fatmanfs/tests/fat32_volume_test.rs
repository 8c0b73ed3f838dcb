// SPDX-License-Identifier: MIT

use fatmanfs::fat32::*;

const SIZE_BYTES: u64 = 34 * 1024 * 1024;

fn fresh_image(cluster_size: u32) -> Vec<u8> {
    let mut buf = vec![0u8; SIZE_BYTES as usize];
    let opts = Fat32FormatOptions::new(SIZE_BYTES)
        .with_cluster_size(cluster_size)
        .with_label("FATMAN");
    format_volume(&mut MemBlockIO::new(&mut buf), &opts).expect("format failed");
    buf
}

fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn test_populate_remount_and_read_back() {
    let mut buf = fresh_image(512);
    let big = payload(2 * 1024 * 1024, 3);

    {
        let mut vol = Fat32Volume::open(MemBlockIO::new(&mut buf)).unwrap();
        for dir in ["deep", "deep/deeper", "deep/deeper/deeper2", "many_files"] {
            vol.create_dir(dir).unwrap();
        }
        vol.copy_from_host("/big_file.bin", &mut big.as_slice(), big.len() as u64)
            .unwrap();
        vol.copy_from_host(
            "/long_named_file_for_testing_fat32_long_filename_support.txt",
            &mut &b"lfn"[..],
            3,
        )
        .unwrap();
        vol.copy_from_host("/deep/deeper/deeper2/deep_file.txt", &mut &b"deep"[..], 4)
            .unwrap();
        for i in 0..100 {
            let name = format!("/many_files/file_{i:03}.txt");
            let body = format!("file {i}");
            vol.copy_from_host(&name, &mut body.as_bytes(), body.len() as u64)
                .unwrap();
        }
        vol.flush().unwrap();
    }

    let mut vol = Fat32Volume::open(MemBlockIO::new(&mut buf)).unwrap();
    let listing = vol.list();
    assert_eq!(listing.len(), 103);
    assert_eq!(listing[0], "/deep/deeper/deeper2/deep_file.txt");
    assert!(listing.contains(&"/long_named_file_for_testing_fat32_long_filename_support.txt".to_string()));

    let node = vol.resolve("/big_file.bin", Lookup::File).unwrap();
    assert_eq!(node.size as usize, big.len());

    let mut out = Vec::new();
    vol.copy_to_host("/big_file.bin", &mut out).unwrap();
    assert_eq!(out, big);

    for i in [0, 17, 99] {
        let mut out = Vec::new();
        vol.copy_to_host(&format!("many_files/file_{i:03}.txt"), &mut out).unwrap();
        assert_eq!(out, format!("file {i}").as_bytes());
    }

    let report = vol.check(CheckOptions::default()).unwrap();
    assert!(report.ok(), "{report}");
    assert_eq!(report.count(Severity::Warn), 0, "{report}");
    assert_eq!(vol.count_free_clusters().unwrap(), vol.hint().free_count());
}

#[test]
fn test_delete_everything_restores_free_space() {
    let mut buf = fresh_image(512);
    let mut vol = Fat32Volume::open(MemBlockIO::new(&mut buf)).unwrap();
    let initial = vol.hint().free_count();

    vol.create_dir("/a").unwrap();
    vol.create_dir("/a/b").unwrap();
    let data = payload(50_000, 9);
    vol.copy_from_host("/a/b/data.bin", &mut data.as_slice(), data.len() as u64)
        .unwrap();
    vol.copy_from_host("/a/readme", &mut &b"hello"[..], 5).unwrap();
    assert!(vol.hint().free_count() < initial);

    let report = vol.delete("/a").unwrap();
    assert!(report.clusters_freed > 0);
    assert_eq!(vol.hint().free_count(), initial);
    assert!(vol.list().is_empty());

    drop(vol);
    let mut vol = Fat32Volume::open(MemBlockIO::new(&mut buf)).unwrap();
    assert!(vol.list().is_empty());
    assert_eq!(vol.count_free_clusters().unwrap(), initial);
    assert!(vol.check(CheckOptions::default()).unwrap().ok());
}

#[test]
fn test_errors_carry_their_kind() {
    let mut buf = fresh_image(512);
    let mut vol = Fat32Volume::open(MemBlockIO::new(&mut buf)).unwrap();
    vol.create_dir("/docs").unwrap();

    let kind = |r: FsResult<u64>| r.unwrap_err().kind();
    assert_eq!(kind(vol.copy_to_host("/missing", &mut Vec::new())), FsErrorKind::PathNotFound);
    assert_eq!(kind(vol.copy_to_host("/docs", &mut Vec::new())), FsErrorKind::PathNotFound);

    assert_eq!(vol.create_dir("/docs").unwrap_err().kind(), FsErrorKind::PathConflict);
    assert_eq!(vol.delete("/").unwrap_err().kind(), FsErrorKind::PathConflict);
}

#[test]
fn test_mount_with_partition_offset() {
    const OFFSET: u64 = 1024 * 1024;
    let volume = fresh_image(512);
    let mut disk = vec![0u8; OFFSET as usize + volume.len()];
    disk[OFFSET as usize..].copy_from_slice(&volume);

    let mut vol = Fat32Volume::open(MemBlockIO::new_with_offset(&mut disk, OFFSET)).unwrap();
    vol.copy_from_host("/inside.txt", &mut &b"offset"[..], 6).unwrap();
    drop(vol);

    let mut vol = Fat32Volume::open(MemBlockIO::new(&mut disk[OFFSET as usize..])).unwrap();
    let mut out = Vec::new();
    vol.copy_to_host("/inside.txt", &mut out).unwrap();
    assert_eq!(out, b"offset");
}
