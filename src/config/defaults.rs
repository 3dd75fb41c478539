//! Built-in defaults (layer 1)

use std::path::PathBuf;

/// Environment variable replacing `worker.program`.
pub const WORKER_ENV: &str = "LOOT_WORKER";

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "LOOT_ASYNC_LOG";

/// Worker binary looked up on `PATH` (or next to the running executable).
pub const DEFAULT_WORKER_PROGRAM: &str = "loot-worker";

/// Time the worker gets to exit after its stdin is closed (default: 2s)
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2000;

pub const DEFAULT_LANGUAGE: &str = "en";

pub const DEFAULT_LOG_FILTER: &str = "info";

pub(super) fn worker_program() -> PathBuf {
    PathBuf::from(DEFAULT_WORKER_PROGRAM)
}

pub(super) fn shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

pub(super) fn language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

pub(super) fn log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
