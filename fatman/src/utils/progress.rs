// SPDX-License-Identifier: MIT

use indicatif::{ProgressBar, ProgressStyle};

/// Byte-count bar for copies; hidden when `quiet` is set.
pub fn copy_bar(total_size: u64, message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total_size);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.white}] {bytes}/{total_bytes} (ETA {eta_precise}) {msg}")
    {
        pb.set_style(style.progress_chars("█░░"));
    }
    pb.set_message(message.to_string());
    pb
}
