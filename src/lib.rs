//! loot-async - asynchronous access to the LOOT engine
//!
//! The engine is synchronous and single-threaded, so it runs in a separate
//! worker process. This crate serializes calls from any number of callers
//! into a strict one-at-a-time FIFO request stream to that worker, routes
//! its log notifications and replies, and fails every outstanding call
//! cleanly when the worker goes away.

pub mod config;
pub mod host;
pub mod logging;
pub mod mock;

pub use config::{ConfigError, Overrides, SessionConfig};
pub use host::{
    CallError, CallResult, Dispatcher, GameSettings, LogHandler, LootAsync, Router, RouterError, SessionOptions,
    WorkerChannel, WorkerCommand,
};
pub use loot_protocol::{GameId, Group, LogLevel, Operation, Request, WorkerMessage};
