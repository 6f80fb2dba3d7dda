use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use env_logger::{Builder, Logger, Target};
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Where log records go.
///
/// * `<dir>/<debug_file>`: everything from `level` up to warnings
/// * `<dir>/<error_file>`: errors only
/// * stderr: whatever `RUST_LOG` enables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub debug_file: String,
    pub error_file: String,
    pub level: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            debug_file: "debug.log".to_string(),
            error_file: "error.log".to_string(),
            level: LevelFilter::Debug,
        }
    }
}

/// Passes records at or below a maximum severity (`Warn` lets through
/// warnings, info and debug, but not errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxLevelFilter(pub Level);

impl MaxLevelFilter {
    pub fn allows(&self, level: Level) -> bool {
        // `log` orders Error < Warn < Info, i.e. most severe first.
        level >= self.0
    }
}

/// Fans records out to the debug file, the error file and stderr.
pub struct SplitLogger {
    debug: Logger,
    debug_filter: MaxLevelFilter,
    error: Logger,
    stderr: Option<Logger>,
}

impl SplitLogger {
    /// Open (appending) both log files, creating the directory if needed.
    pub fn new(config: &LogConfig) -> std::io::Result<Self> {
        fs::create_dir_all(&config.dir)?;
        let debug = file_logger(&config.dir.join(&config.debug_file), config.level)?;
        let error = file_logger(&config.dir.join(&config.error_file), LevelFilter::Error)?;
        Ok(Self {
            debug,
            debug_filter: MaxLevelFilter(Level::Warn),
            error,
            stderr: None,
        })
    }

    /// Also echo to stderr, filtered by `RUST_LOG`.
    pub fn with_stderr(mut self) -> Self {
        self.stderr = Some(Builder::from_default_env().build());
        self
    }

    pub fn max_level(&self) -> LevelFilter {
        let stderr = self
            .stderr
            .as_ref()
            .map_or(LevelFilter::Off, |l| l.filter());
        self.debug.filter().max(self.error.filter()).max(stderr)
    }
}

impl Log for SplitLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.debug.enabled(metadata)
            || self.error.enabled(metadata)
            || self.stderr.as_ref().is_some_and(|l| l.enabled(metadata))
    }

    fn log(&self, record: &Record) {
        if self.debug_filter.allows(record.level()) {
            self.debug.log(record);
        } else {
            self.error.log(record);
        }
        if let Some(stderr) = &self.stderr {
            stderr.log(record);
        }
    }

    fn flush(&self) {
        self.debug.flush();
        self.error.flush();
        if let Some(stderr) = &self.stderr {
            stderr.flush();
        }
    }
}

fn file_logger(path: &Path, level: LevelFilter) -> std::io::Result<Logger> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Builder::new()
        .filter_level(level)
        .target(Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                buf.timestamp(),
                record.level(),
                record.args()
            )
        })
        .build())
}

/// Install the process-wide logger described by `config`.
///
/// Fails if the log files cannot be opened or a logger is already set.
pub fn setup_logging(config: &LogConfig) -> anyhow::Result<()> {
    let logger = SplitLogger::new(config)?.with_stderr();
    let max_level = logger.max_level();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}
