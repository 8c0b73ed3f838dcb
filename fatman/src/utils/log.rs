// SPDX-License-Identifier: MIT

use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Quiet,
    Normal,
    Verbose,
    Trace,
}

impl LogLevel {
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => LogLevel::Quiet,
            (false, 0) => LogLevel::Normal,
            (false, 1) => LogLevel::Verbose,
            (false, _) => LogLevel::Trace,
        }
    }

    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Quiet => LevelFilter::Warn,
            LogLevel::Normal => LevelFilter::Info,
            LogLevel::Verbose => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// `[fatman]`-prefixed diagnostics on stderr. Command results go to stdout.
struct CliLogger;

static LOGGER: CliLogger = CliLogger;

impl Log for CliLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = record.args().to_string();
        let line = match record.level() {
            Level::Error => format!("{} {}", "error:".red().bold(), msg),
            Level::Warn => format!("{} {}", "warning:".yellow().bold(), msg),
            Level::Info => msg,
            Level::Debug | Level::Trace => msg.dimmed().to_string(),
        };
        eprintln!("{} {line}", "[fatman]".bold());
    }

    fn flush(&self) {}
}

pub fn init(level: LogLevel) {
    // A second call only keeps the first logger; the level still applies.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level.filter());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_pick_a_level() {
        assert_eq!(LogLevel::from_flags(true, 3), LogLevel::Quiet);
        assert_eq!(LogLevel::from_flags(false, 0), LogLevel::Normal);
        assert_eq!(LogLevel::from_flags(false, 1), LogLevel::Verbose);
        assert_eq!(LogLevel::from_flags(false, 2).filter(), LevelFilter::Trace);
    }
}
