// SPDX-License-Identifier: MIT

//! Read-mostly consistency check of a mounted volume.

use log::{debug, info};
use zerocopy::IntoBytes;

pub use crate::core::checker::*;

use crate::{
    core::{cursor::ClusterMeta, errors::*},
    fs::fat32::{
        constant::*,
        fsinfo::FreeSpaceHint,
        table::ChainTable,
        tree::{DirectoryNode, DirectoryTree},
        types::{Fat32FsInfo, Fat32Vbr},
    },
};
use fatmanio::prelude::*;

const MIRROR_CHUNK: usize = 64 * 1024;
const SCAN_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    /// Rebuild the free-space hint from the FAT when it disagrees.
    pub repair: bool,
}

/// One bit per cluster number.
struct ClusterBitmap(Vec<u64>);

impl ClusterBitmap {
    fn new(max_cluster: u32) -> Self {
        Self(vec![0; (max_cluster as usize + 1).div_ceil(64)])
    }

    /// Sets the bit; returns whether it was already set.
    fn mark(&mut self, cluster: u32) -> bool {
        let (word, bit) = (cluster as usize / 64, cluster % 64);
        let was = self.0[word] & (1 << bit) != 0;
        self.0[word] |= 1 << bit;
        was
    }

    fn is_marked(&self, cluster: u32) -> bool {
        self.0[cluster as usize / 64] & (1 << (cluster % 64)) != 0
    }
}

pub struct Fat32Checker<'a, IO: BlockIO + ?Sized> {
    io: &'a mut IO,
    table: &'a ChainTable,
    hint: &'a mut FreeSpaceHint,
    tree: &'a DirectoryTree,
}

impl<'a, IO: BlockIO + ?Sized> Fat32Checker<'a, IO> {
    pub fn new(io: &'a mut IO, table: &'a ChainTable, hint: &'a mut FreeSpaceHint, tree: &'a DirectoryTree) -> Self {
        Self { io, table, hint, tree }
    }

    pub fn check(&mut self, opts: &CheckOptions) -> FsCheckerResult<VerifyReport> {
        let mut rep = VerifyReport::default();
        self.check_boot(&mut rep)?;
        self.check_fat(&mut rep)?;
        let reachable = self.check_tree(&mut rep)?;
        self.check_lost(&reachable, &mut rep)?;
        self.check_free_hint(opts, &mut rep)?;

        info!(
            "check: {} error(s), {} warning(s)",
            rep.count(Severity::Error),
            rep.count(Severity::Warn)
        );
        Ok(rep)
    }

    fn check_boot(&mut self, rep: &mut VerifyReport) -> FsCheckerResult {
        let g = *self.table.geometry();
        let vbr: Fat32Vbr = self.io.read_struct(g.sector_offset(FAT_VBR_SECTOR))?;
        if vbr.has_signature() {
            rep.push(Finding::info("BOOT.SIG", "Boot sector signature OK"));
        } else {
            rep.push(Finding::err("BOOT.SIG", "Boot sector is missing 0x55AA"));
        }

        if g.backup_boot_sector != 0 && (g.backup_boot_sector as u64) < g.reserved_sectors as u64 {
            let backup: Fat32Vbr = self.io.read_struct(g.sector_offset(g.backup_boot_sector as u64))?;
            if backup.as_bytes() != vbr.as_bytes() {
                rep.push(Finding::warn(
                    "BOOT.BACKUP",
                    format!("Backup boot sector {} differs from the primary", g.backup_boot_sector),
                ));
            }
        }

        let fsinfo: Fat32FsInfo = self.io.read_struct(g.sector_offset(g.fsinfo_sector as u64))?;
        if !fsinfo.has_valid_signatures() {
            rep.push(Finding::err("FSINFO.SIG", "FSInfo signatures are invalid"));
        }
        Ok(())
    }

    fn check_fat(&mut self, rep: &mut VerifyReport) -> FsCheckerResult {
        let g = *self.table.geometry();

        let media = self.io.read_u8_at(g.fat_offset(0))?;
        if media != g.media {
            rep.push(Finding::warn(
                "FAT.MEDIA",
                format!("FAT[0] media byte {media:#04x} does not match the boot record ({:#04x})", g.media),
            ));
        }

        // Compare every further copy with the first, a block at a time.
        let total = g.fat_size_bytes();
        let mut primary = vec![0u8; MIRROR_CHUNK];
        let mut mirror = vec![0u8; MIRROR_CHUNK];
        for fat_index in 1..g.num_fats {
            let mut mismatched = 0u64;
            let mut done = 0u64;
            while done < total {
                let len = (total - done).min(MIRROR_CHUNK as u64) as usize;
                self.io.read_at(g.fat_offset(0) + done, &mut primary[..len])?;
                self.io.read_at(g.fat_offset(fat_index) + done, &mut mirror[..len])?;
                mismatched += primary[..len]
                    .chunks_exact(FAT_ENTRY_SIZE)
                    .zip(mirror[..len].chunks_exact(FAT_ENTRY_SIZE))
                    .filter(|(a, b)| a != b)
                    .count() as u64;
                done += len as u64;
            }
            if mismatched > 0 {
                rep.push(Finding::err(
                    "FAT.MIRROR",
                    format!("FAT #{fat_index} differs from FAT #0 in {mismatched} entr(ies)"),
                ));
            }
        }
        Ok(())
    }

    /// Follows the chain of every reachable node. Returns the clusters seen.
    fn check_tree(&mut self, rep: &mut VerifyReport) -> FsCheckerResult<ClusterBitmap> {
        let g = *self.table.geometry();
        let bpc = g.bytes_per_cluster() as u64;
        let mut reachable = ClusterBitmap::new(g.max_valid_cluster());

        let mut nodes: Vec<(String, DirectoryNode)> = vec![("/".to_string(), self.tree.root().clone())];
        self.tree.walk(|path, node, _| nodes.push((path.to_string(), node.clone())));
        debug!("check: following {} chain(s)", nodes.len());

        for (path, node) in &nodes {
            if node.first_cluster == 0 {
                if !node.is_dir && node.size > 0 {
                    rep.push(Finding::err(
                        "FILE.SIZE",
                        format!("{path}: {} byte(s) recorded but no cluster allocated", node.size),
                    ));
                }
                continue;
            }

            let chain = match self.table.chain(self.io, node.first_cluster) {
                Ok(chain) => chain,
                Err(FsChainError::IO(e)) => return Err(e.into()),
                Err(e) => {
                    rep.push(Finding::err("CHAIN.BROKEN", format!("{path}: {e}")));
                    continue;
                }
            };

            for &cluster in &chain {
                if reachable.mark(cluster) {
                    rep.push(Finding::err(
                        "CHAIN.XLINK",
                        format!("{path}: cluster {cluster} is shared with another chain"),
                    ));
                    break;
                }
            }

            if !node.is_dir {
                let expected = (node.size as u64).div_ceil(bpc) as usize;
                if chain.len() < expected {
                    rep.push(Finding::err(
                        "FILE.SIZE",
                        format!("{path}: {} cluster(s) for {} byte(s)", chain.len(), node.size),
                    ));
                } else if chain.len() > expected.max(1) {
                    rep.push(Finding::warn(
                        "FILE.SIZE",
                        format!("{path}: chain has {} spare cluster(s)", chain.len() - expected.max(1)),
                    ));
                }
            }
        }
        Ok(reachable)
    }

    fn check_lost(&mut self, reachable: &ClusterBitmap, rep: &mut VerifyReport) -> FsCheckerResult {
        let g = *self.table.geometry();
        let mut lost = 0u32;
        let mut first_lost = None;

        self.io.read_chunks_streamed::<FAT_ENTRY_SIZE, _>(
            g.fat_entry_offset(FAT_FIRST_CLUSTER, 0),
            g.cluster_count as usize,
            SCAN_CHUNK,
            |index, raw| {
                let cluster = FAT_FIRST_CLUSTER + index as u32;
                let value = u32::from_le_bytes(*raw) & FAT_MASK;
                if value != FAT_FREE && value != FAT_BAD_CLUSTER && !reachable.is_marked(cluster) {
                    lost += 1;
                    first_lost.get_or_insert(cluster);
                }
                true
            },
        )?;

        if let Some(first) = first_lost {
            rep.push(Finding::warn(
                "CHAIN.LOST",
                format!("{lost} allocated cluster(s) are not reachable (first: {first})"),
            ));
        }
        Ok(())
    }

    fn check_free_hint(&mut self, opts: &CheckOptions, rep: &mut VerifyReport) -> FsCheckerResult {
        let measured = self.table.count_free(self.io)?;
        let recorded = self.hint.free_count();
        let next = self.hint.next_free();

        let count_ok = recorded == measured;
        if !count_ok {
            rep.push(Finding::warn(
                "FSINFO.FREE",
                format!("Free count hint is {recorded}, the FAT has {measured} free cluster(s)"),
            ));
        }

        let g = *self.table.geometry();
        let next_ok = next == FAT_FSINFO_UNKNOWN
            || ((FAT_FIRST_CLUSTER..=g.max_valid_cluster()).contains(&next)
                && self.table.lookup(self.io, next)? == FAT_FREE);
        if !next_ok {
            rep.push(Finding::warn(
                "FSINFO.NEXT",
                format!("Next-free hint {next} does not name a free cluster"),
            ));
        }

        if opts.repair && !(count_ok && next_ok) {
            self.hint.rebuild(self.io, self.table)?;
            rep.push(Finding::info(
                "FSINFO.REPAIR",
                format!(
                    "Free-space hint rebuilt: free={} next={}",
                    self.hint.free_count(),
                    self.hint.next_free()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fat::chain::write_entry_all;
    use crate::fs::fat32::test_utils::*;

    fn codes(rep: &VerifyReport, min: Severity) -> Vec<&'static str> {
        rep.findings.iter().filter(|f| f.sev >= min).map(|f| f.code).collect()
    }

    #[test]
    fn fresh_and_used_volumes_are_clean() {
        let mut image = image_with_dirs(&["docs"]);
        let mut vol = mount(&mut image);
        vol.copy_from_host("/docs/readme.md", &mut &[7u8; 2000][..], 2000).unwrap();

        let rep = vol.check(CheckOptions::default()).unwrap();
        assert!(rep.ok(), "{rep}");
        assert!(codes(&rep, Severity::Warn).is_empty(), "{rep}");
    }

    #[test]
    fn stale_free_count_is_reported_and_repaired() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        let real = g.cluster_count - 1;
        io.write_u32_at(g.sector_offset(g.fsinfo_sector as u64) + 488, real - 10).unwrap();

        let mut vol = Fat32Volume::open(io).unwrap();
        let rep = vol.check(CheckOptions::default()).unwrap();
        assert_eq!(codes(&rep, Severity::Warn), ["FSINFO.FREE"]);
        assert_eq!(vol.hint().free_count(), real - 10);

        let rep = vol.check(CheckOptions { repair: true }).unwrap();
        assert_eq!(rep.with_code("FSINFO.REPAIR").count(), 1);
        assert_eq!(vol.hint().free_count(), real);
        assert_eq!(vol.hint().next_free(), 3);

        let rep = vol.check(CheckOptions::default()).unwrap();
        assert!(codes(&rep, Severity::Warn).is_empty(), "{rep}");
    }

    #[test]
    fn mirror_and_lost_clusters_are_found() {
        let mut image = formatted_image();
        let mut io = MemBlockIO::new(&mut image);
        let g = read_geometry(&mut io);
        // FAT #1 disagrees at cluster 100; cluster 200 is allocated but unreachable.
        io.write_u32_at(g.fat_entry_offset(100, 1), FAT_EOC).unwrap();
        write_entry_all(&mut io, &g, 200, FAT_EOC).unwrap();

        let mut vol = Fat32Volume::open(io).unwrap();
        let rep = vol.check(CheckOptions::default()).unwrap();
        assert_eq!(rep.with_code("FAT.MIRROR").count(), 1);
        assert!(rep.with_code("CHAIN.LOST").any(|f| f.msg.contains("first: 200")));
        assert!(rep.has_error());
    }

    #[test]
    fn cross_links_and_short_chains_are_errors() {
        let mut image = formatted_image();
        let mut vol = mount(&mut image);
        let bpc = vol.geometry().bytes_per_cluster() as usize;
        let a = vol.copy_from_host("/A.BIN", &mut &vec![1u8; 2 * bpc][..], 2 * bpc as u64).unwrap();
        let b = vol.copy_from_host("/B.BIN", &mut &vec![2u8; 2 * bpc][..], 2 * bpc as u64).unwrap();

        let mut io = vol.into_inner();
        let g = read_geometry(&mut io);
        // A's first cluster now jumps into B's chain.
        write_entry_all(&mut io, &g, a.first_cluster, b.first_cluster).unwrap();

        let mut vol = Fat32Volume::open(io).unwrap();
        let rep = vol.check(CheckOptions::default()).unwrap();
        assert_eq!(rep.with_code("CHAIN.XLINK").count(), 1, "{rep}");
        assert!(rep.with_code("FILE.SIZE").any(|f| f.sev == Severity::Warn));
    }
}
