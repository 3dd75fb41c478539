//! Tracing setup and the default engine log handler.

use std::sync::Arc;

use loot_protocol::LogLevel;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LOG_ENV;
use crate::host::LogHandler;

/// Install the fmt subscriber on stderr.
///
/// The filter comes from `LOOT_ASYNC_LOG`, falling back to `default_filter`
/// (normally `logging.filter` from the config). Returns false if a global
/// subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

/// Log handler re-emitting engine notifications as tracing events under
/// the `loot` target.
pub fn tracing_log_handler() -> LogHandler {
    Arc::new(|level: LogLevel, message: &str| match level {
        LogLevel::Trace => tracing::trace!(target: "loot", "{}", message),
        LogLevel::Debug => tracing::debug!(target: "loot", "{}", message),
        LogLevel::Info => tracing::info!(target: "loot", "{}", message),
        LogLevel::Warning => tracing::warn!(target: "loot", "{}", message),
        LogLevel::Error | LogLevel::Fatal => tracing::error!(target: "loot", level = %level, "{}", message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_accepts_every_level() {
        let handler = tracing_log_handler();
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Fatal,
        ] {
            handler(level, "message");
        }
    }
}
