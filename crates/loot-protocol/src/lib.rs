//! LOOT Worker Protocol Types
//!
//! Defines the newline-delimited JSON messages exchanged between the
//! controlling process and the worker process hosting the LOOT engine.
//!
//! Outbound (controller → worker): `{"type": op, "args": [...], "id": n}`
//! Inbound (worker → controller): exactly one of `error`, `result` or `log`.

pub mod error;
pub mod game;
pub mod log;
pub mod ops;
pub mod request;
pub mod response;
pub mod types;

pub use error::ProtocolError;
pub use game::GameId;
pub use log::{LogLevel, LogNotification};
pub use ops::Operation;
pub use request::Request;
pub use response::WorkerMessage;
pub use types::{EdgeType, Group, MasterlistInfo, Message, MessageType, Plugin, PluginMetadata, Vertex};

/// Name of the group every plugin belongs to unless metadata says otherwise.
pub const DEFAULT_GROUP: &str = "default";
