//! Worker configuration.

use std::io;

use clap::Parser;
use loot_protocol::LogLevel;
use thiserror::Error;

pub const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024; // 16 MB

/// Errors that stop the worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("I/O error on the protocol stream: {0}")]
    Io(#[from] io::Error),
}

/// Worker configuration settings, parsed from the command line.
#[derive(Debug, Clone, Parser)]
#[command(name = "loot-worker")]
#[command(about = "Serve LOOT engine requests over stdin/stdout", version)]
pub struct WorkerConfig {
    /// Engine log notifications below this level are not forwarded
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,

    /// Maximum accepted request line length in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}
