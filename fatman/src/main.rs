// SPDX-License-Identifier: MIT

mod commands;
mod utils;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand, error::ErrorKind};
use fatmanfs::{FsError, FsErrorKind};
use log::error;

use crate::commands::{FormatArgs, ImageArgs, Location};
use crate::utils::{
    log::{LogLevel, init},
    string::parse_size,
};

#[derive(Parser)]
#[command(name = "fatman", version, about = "Inspect and edit FAT32 images", long_about = None)]
struct Cli {
    /// Byte offset of the volume inside the image (e.g. a partition start)
    #[arg(long, global = true, default_value_t = 0)]
    offset: u64,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More output; repeat for trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the volume geometry and free-space record
    Info { image: PathBuf },
    /// List files and empty directories
    Ls {
        image: PathBuf,
        /// Draw the directory tree
        #[arg(long)]
        tree: bool,
        /// Show sizes and modification times
        #[arg(short, long)]
        long: bool,
    },
    /// Copy between the image and the host (image:/path, local:path)
    Cp {
        image: PathBuf,
        #[arg(value_parser = Location::parse)]
        src: Location,
        #[arg(value_parser = Location::parse)]
        dst: Location,
    },
    /// Delete a file or directory tree
    Rm { image: PathBuf, path: String },
    /// Create a directory
    Mkdir { image: PathBuf, path: String },
    /// Verify the volume, optionally rebuilding the free-space record
    Check {
        image: PathBuf,
        #[arg(long)]
        repair: bool,
    },
    /// Create a fresh FAT32 volume (the file is created or extended)
    Format {
        image: PathBuf,
        /// Volume size, e.g. 64M
        #[arg(long, value_parser = parse_size)]
        size: u64,
        #[arg(long)]
        label: Option<String>,
        /// Bytes per cluster; picked from the volume size when omitted
        #[arg(long, value_parser = parse_size)]
        cluster_size: Option<u64>,
    },
}

impl Commands {
    fn image(&self) -> &Path {
        match self {
            Commands::Info { image }
            | Commands::Ls { image, .. }
            | Commands::Cp { image, .. }
            | Commands::Rm { image, .. }
            | Commands::Mkdir { image, .. }
            | Commands::Check { image, .. }
            | Commands::Format { image, .. } => image,
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(fs) = err.downcast_ref::<FsError>() else {
        return 1;
    };
    match fs.kind() {
        FsErrorKind::VolumeFormat => 10,
        FsErrorKind::ClusterRange => 11,
        FsErrorKind::PathNotFound => 12,
        FsErrorKind::PathConflict => 13,
        FsErrorKind::InsufficientSpace => 14,
        FsErrorKind::CorruptDirectory => 15,
        FsErrorKind::Io => 16,
        FsErrorKind::Internal => 1,
    }
}

/// Returns `Ok(false)` when `check` found errors.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let Cli {
        offset,
        quiet,
        command,
        ..
    } = cli;
    let image = ImageArgs {
        path: command.image(),
        offset,
        quiet,
    };

    match &command {
        Commands::Info { .. } => commands::info(&image)?,
        Commands::Ls { tree, long, .. } => commands::ls(&image, *tree, *long)?,
        Commands::Cp { src, dst, .. } => {
            let same_side = matches!(
                (src, dst),
                (Location::Image(_), Location::Image(_)) | (Location::Local(_), Location::Local(_))
            );
            if same_side {
                Cli::command()
                    .error(ErrorKind::ArgumentConflict, "cp needs one image: and one local: location")
                    .exit();
            }
            commands::cp(&image, src.clone(), dst.clone())?
        }
        Commands::Rm { path, .. } => commands::rm(&image, path)?,
        Commands::Mkdir { path, .. } => commands::mkdir(&image, path)?,
        Commands::Check { repair, .. } => return commands::check(&image, *repair),
        Commands::Format {
            size,
            label,
            cluster_size,
            ..
        } => {
            let cluster_size = cluster_size.map(|size| {
                u32::try_from(size).unwrap_or_else(|_| {
                    Cli::command()
                        .error(ErrorKind::ValueValidation, "--cluster-size is too large")
                        .exit()
                })
            });
            let args = FormatArgs {
                size: *size,
                label: label.clone(),
                cluster_size,
            };
            commands::format(&image, args)?
        }
    }
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init(LogLevel::from_flags(cli.quiet, cli.verbose));

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
