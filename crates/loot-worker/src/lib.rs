//! LOOT Worker
//!
//! The worker is a long-lived child process that owns the single-threaded
//! LOOT engine. It reads newline-delimited JSON requests from stdin, runs
//! them one at a time, and writes log notifications and exactly one terminal
//! message per request to stdout.
//!
//! This crate can be used in two modes:
//! - **Standalone binary**: spawned by the controller's process channel
//! - **In-process library**: `RpcHandler::run_with_io` for tests

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod memory;
pub mod rpc;

pub use config::{WorkerConfig, WorkerError};
pub use engine::{Engine, EngineError, EngineFactory, EngineResult, InitParams, Logger};
pub use memory::MemoryEngine;
pub use rpc::RpcHandler;
