//! Command-line interface definitions
//!
//! Provides CLI argument parsing using clap for the ManimGL notebook driver.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Drive an interactive ManimGL session from notebook-style commands
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "manim-notebook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Scene file to work on
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Start the scene at this line (one-based)
    #[arg(short = 'n', long, value_name = "LINE")]
    pub line: Option<usize>,

    /// Play the whole scene instead of stopping at a line
    #[arg(short, long)]
    pub whole_scene: bool,

    /// ManimGL executable (overrides settings and MANIMGL_PATH)
    #[arg(long, value_name = "PATH")]
    pub manimgl: Option<String>,

    /// Do not start a session until asked to
    #[arg(long)]
    pub no_start: bool,

    /// Enable diagnostic mode (auto-log to temp file)
    #[arg(short, long)]
    pub diagnostic: bool,

    /// Log directory (implies diagnostic mode)
    #[arg(short = 'l', long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log file name (implies diagnostic mode)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub log_file: Option<String>,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Increase logging verbosity (-v, -vv, -vvv)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only errors)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    /// Check if diagnostic mode is enabled (output to file)
    ///
    /// Returns true if `--diagnostic` is set, or if `--log-dir` or `--log-file` is specified.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    /// Get the log level based on CLI arguments
    ///
    /// - `--quiet`: ERROR
    /// - default: INFO
    /// - `-v`: DEBUG
    /// - `-vv` or more: TRACE
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::INFO,
                1 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Get the log file path for diagnostic mode
    ///
    /// Uses the specified log directory and file name, or defaults to:
    /// - Directory: system temp directory
    /// - File: `manim-notebook-{timestamp}.log`
    pub fn log_path(&self) -> PathBuf {
        let dir = self.log_dir.clone().unwrap_or_else(std::env::temp_dir);

        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("manim-notebook-{timestamp}.log")
        });

        dir.join(filename)
    }

    /// Zero-based cursor line the session starts from
    pub fn cursor_line(&self) -> Option<usize> {
        self.line.map(|line| line.saturating_sub(1))
    }
}
