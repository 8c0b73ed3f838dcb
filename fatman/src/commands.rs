// SPDX-License-Identifier: MIT

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use colored::Colorize;
use fatmanfs::{extract_name_from_path, fat32::*};
use log::{info, warn};

use crate::utils::{
    progress::copy_bar,
    string::{pretty_bytes, sep_u64},
};

/// One side of a `cp`: inside the image or on the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Image(String),
    Local(PathBuf),
}

impl Location {
    pub fn parse(s: &str) -> Result<Self, String> {
        if let Some(path) = s.strip_prefix("image:") {
            Ok(Location::Image(path.to_string()))
        } else if let Some(path) = s.strip_prefix("local:") {
            Ok(Location::Local(PathBuf::from(path)))
        } else {
            Err(format!("'{s}' must start with image: or local:"))
        }
    }
}

/// Image file plus how to reach the volume inside it.
pub struct ImageArgs<'a> {
    pub path: &'a Path,
    pub offset: u64,
    pub quiet: bool,
}

impl ImageArgs<'_> {
    fn open_file(&self, writable: bool) -> anyhow::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(writable)
            .open(self.path)
            .with_context(|| format!("cannot open image {}", self.path.display()))
    }

    fn io<'f>(&self, file: &'f mut File, writable: bool) -> StdBlockIO<'f, File> {
        let io = StdBlockIO::new_with_offset(file, self.offset);
        if writable { io } else { io.into_read_only() }
    }
}

pub fn info(image: &ImageArgs) -> anyhow::Result<()> {
    let mut file = image.open_file(false)?;
    let mut io = image.io(&mut file, false);
    let info = volume_info(&mut io)?;
    println!("{info}");
    Ok(())
}

pub fn ls(image: &ImageArgs, tree: bool, long: bool) -> anyhow::Result<()> {
    let mut file = image.open_file(false)?;
    let vol = Fat32Volume::open(image.io(&mut file, false))?;

    if tree {
        print_tree(vol.tree(), long);
        return Ok(());
    }

    for path in vol.list() {
        if long {
            let node = vol.resolve(&path, Lookup::Any)?;
            println!(
                "{}  {}  {:>14}  {}",
                node.attributes.flag_string(),
                format_modified(node),
                sep_u64(node.size as u64),
                path
            );
        } else {
            println!("{path}");
        }
    }
    Ok(())
}

fn format_modified(node: &DirectoryNode) -> String {
    match node.modified() {
        Some(ts) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}",
            ts.year(),
            ts.month() as u8,
            ts.day(),
            ts.hour(),
            ts.minute()
        ),
        None => "----------------".to_string(),
    }
}

fn print_tree(tree: &DirectoryTree, long: bool) {
    println!("/");
    // Whether each ancestor was the last entry of its directory.
    let mut last_at_depth: Vec<bool> = Vec::new();

    let mut rows: Vec<(usize, String, bool, u32)> = Vec::new();
    tree.walk(|_, node, depth| rows.push((depth, node.name.clone(), node.is_dir, node.size)));

    for (i, (depth, name, is_dir, size)) in rows.iter().enumerate() {
        let is_last = rows[i + 1..]
            .iter()
            .take_while(|(d, ..)| d >= depth)
            .all(|(d, ..)| d != depth);

        last_at_depth.truncate(*depth);

        let mut line = String::new();
        for &ancestor_last in &last_at_depth {
            line.push_str(if ancestor_last { "    " } else { "│   " });
        }
        line.push_str(if is_last { "└── " } else { "├── " });

        let label = if *is_dir {
            format!("{name}/").blue().bold().to_string()
        } else if long {
            format!("{name} ({})", pretty_bytes(*size as u64))
        } else {
            name.clone()
        };
        println!("{line}{label}");

        last_at_depth.push(is_last);
    }
}

pub fn cp(image: &ImageArgs, src: Location, dst: Location) -> anyhow::Result<()> {
    match (src, dst) {
        (Location::Image(from), Location::Local(to)) => copy_out(image, &from, &to),
        (Location::Local(from), Location::Image(to)) => copy_in(image, &from, &to),
        _ => bail!("cp needs one image: and one local: location"),
    }
}

fn copy_out(image: &ImageArgs, from: &str, to: &Path) -> anyhow::Result<()> {
    let mut file = image.open_file(false)?;
    let mut vol = Fat32Volume::open(image.io(&mut file, false))?;
    let size = vol.resolve(from, Lookup::File)?.size as u64;

    let dest = if to.is_dir() {
        to.join(extract_name_from_path(from))
    } else {
        to.to_path_buf()
    };
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    // Written beside the destination, then renamed into place.
    let tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("cannot create a temporary file in {}", dir.display()))?;
    let pb = copy_bar(size, from, image.quiet);
    let mut writer = pb.wrap_write(tmp.as_file());
    let written = vol.copy_to_host(from, &mut writer)?;
    writer.flush()?;
    drop(writer);
    pb.finish_and_clear();

    tmp.persist(&dest)
        .with_context(|| format!("cannot write {}", dest.display()))?;
    info!("copied {from} -> {} ({})", dest.display(), pretty_bytes(written));
    Ok(())
}

fn copy_in(image: &ImageArgs, from: &Path, to: &str) -> anyhow::Result<()> {
    let src = File::open(from).with_context(|| format!("cannot open {}", from.display()))?;
    let size = src.metadata()?.len();

    let mut file = image.open_file(true)?;
    let mut vol = Fat32Volume::open(image.io(&mut file, true))?;

    let target = if to.ends_with('/') || vol.resolve(to, Lookup::Dir).is_ok() {
        let name = from
            .file_name()
            .and_then(|n| n.to_str())
            .context("source file name is not valid UTF-8")?;
        fatmanfs::join_paths(to, name)
    } else {
        to.to_string()
    };

    let pb = copy_bar(size, &target, image.quiet);
    let mut reader = pb.wrap_read(src);
    let node = vol.copy_from_host(&target, &mut reader, size)?;
    pb.finish_and_clear();
    vol.flush()?;

    if (node.size as u64) < size {
        warn!("{} shrank while copying; stored {} of {size} bytes", from.display(), node.size);
    }
    info!("copied {} -> {target} ({})", from.display(), pretty_bytes(node.size as u64));
    Ok(())
}

pub fn rm(image: &ImageArgs, path: &str) -> anyhow::Result<()> {
    let mut file = image.open_file(true)?;
    let mut vol = Fat32Volume::open(image.io(&mut file, true))?;
    let report = vol.delete(path)?;
    vol.flush()?;
    info!(
        "removed {path}: {} cluster(s) freed, {} record(s) marked",
        report.clusters_freed, report.records_marked
    );
    Ok(())
}

pub fn mkdir(image: &ImageArgs, path: &str) -> anyhow::Result<()> {
    let mut file = image.open_file(true)?;
    let mut vol = Fat32Volume::open(image.io(&mut file, true))?;
    let node = vol.create_dir(path)?;
    vol.flush()?;
    info!("created {path} at cluster {}", node.first_cluster);
    Ok(())
}

/// Returns whether the volume is free of errors.
pub fn check(image: &ImageArgs, repair: bool) -> anyhow::Result<bool> {
    let mut file = image.open_file(repair)?;
    let mut vol = Fat32Volume::open(image.io(&mut file, repair))?;
    let report = vol.check(CheckOptions { repair })?;
    if repair {
        vol.flush()?;
    }

    print!(
        "{}",
        report.display_with(ReportDisplayOpts {
            min_level: if image.quiet { Severity::Warn } else { Severity::Info },
            show_summary: true,
            ..ReportDisplayOpts::default()
        })
    );
    Ok(report.ok())
}

pub struct FormatArgs {
    pub size: u64,
    pub label: Option<String>,
    /// `None` picks the largest cluster size the volume can hold.
    pub cluster_size: Option<u32>,
}

const CLUSTER_CANDIDATES: [u32; 4] = [4096, 2048, 1024, 512];

pub fn format(image: &ImageArgs, args: FormatArgs) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(image.path)
        .with_context(|| format!("cannot open image {}", image.path.display()))?;

    let needed = image.offset + args.size;
    if file.metadata()?.len() < needed {
        file.set_len(needed)?;
    }

    let mut opts = Fat32FormatOptions::new(args.size);
    opts.label = args.label;
    opts.cluster_size = match args.cluster_size {
        Some(size) => size,
        None => CLUSTER_CANDIDATES
            .into_iter()
            .find(|&size| Fat32Layout::from_options(&opts.clone().with_cluster_size(size)).is_ok())
            .unwrap_or(CLUSTER_CANDIDATES[0]),
    };

    let mut io = image.io(&mut file, true);
    let layout = format_volume(&mut io, &opts).map_err(FsError::from)?;
    info!(
        "{}: FAT32, {} clusters of {}, {} free",
        image.path.display(),
        sep_u64(layout.cluster_count as u64),
        pretty_bytes(layout.bytes_per_cluster() as u64),
        pretty_bytes((layout.cluster_count as u64 - 1) * layout.bytes_per_cluster() as u64)
    );
    Ok(())
}
