//! LOOT Worker Entrypoint
//!
//! Reads newline-delimited JSON requests from stdin until EOF and writes log
//! notifications and terminal messages to stdout. Diagnostics go to stderr;
//! `LOOT_WORKER_LOG` sets the tracing filter.

use std::process::ExitCode;

use clap::Parser;
use loot_worker::{RpcHandler, WorkerConfig, WorkerError};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("LOOT_WORKER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = WorkerConfig::parse();

    let mut handler = RpcHandler::with_memory_engine(config);
    if let Err(e) = handler.run().map_err(WorkerError::from) {
        error!(error = %e, "worker loop failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
