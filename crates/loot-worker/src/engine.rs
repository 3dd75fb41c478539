//! Engine abstraction hosted by the worker.
//!
//! The worker never runs two engine operations at once; implementations may
//! assume exclusive, single-threaded access.

use std::sync::{Arc, Mutex, PoisonError};

use loot_protocol::{
    GameId, Group, LogLevel, LogNotification, MasterlistInfo, Message, Plugin, PluginMetadata,
    Vertex, WorkerMessage,
};
use serde_json::{json, Value};

/// Engine errors, reported to the controller as `{error, details}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("game not supported")]
    UnsupportedGame(String),

    #[error("engine not initialized")]
    NotInitialized,

    #[error("Invalid value passed to \"{func}\"")]
    InvalidParameter {
        func: String,
        arg: String,
        value: String,
    },

    #[error("Cyclic interaction detected: {}", format_cycle(.cycle))]
    CyclicInteraction { cycle: Vec<Vertex> },

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid arguments for {op}: {reason}")]
    InvalidArguments { op: String, reason: String },

    #[error("{0}")]
    Other(String),
}

fn format_cycle(cycle: &[Vertex]) -> String {
    let mut names: Vec<&str> = cycle.iter().map(|v| v.name.as_str()).collect();
    if let Some(first) = cycle.first() {
        names.push(first.name.as_str());
    }
    names.join(" -> ")
}

impl EngineError {
    pub fn invalid_parameter(func: &str, arg: &str, value: &str) -> Self {
        EngineError::InvalidParameter {
            func: func.to_string(),
            arg: arg.to_string(),
            value: value.to_string(),
        }
    }

    /// Machine-readable data for the error, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            EngineError::UnsupportedGame(game) => Some(json!({ "gameId": game })),
            EngineError::InvalidParameter { func, arg, value } => {
                Some(json!({ "func": func, "arg": arg, "value": value }))
            }
            EngineError::CyclicInteraction { cycle } => Some(json!({ "cycle": cycle })),
            EngineError::UnknownOperation(op) => Some(json!({ "op": op })),
            _ => None,
        }
    }

    /// Convert to the terminal wire message.
    pub fn to_message(&self) -> WorkerMessage {
        match self.details() {
            Some(details) => WorkerMessage::error_with_details(self.to_string(), details),
            None => WorkerMessage::error(self.to_string()),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Arguments of the `init` operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InitParams {
    pub game_id: GameId,
    pub game_path: String,
    pub game_local_path: String,
    pub language: String,
}

/// Collects engine log lines until the worker flushes them to stdout.
#[derive(Debug, Clone)]
pub struct Logger {
    buffer: Arc<Mutex<Vec<LogNotification>>>,
    min_level: LogLevel,
}

impl Logger {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            min_level,
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        if level < self.min_level {
            return;
        }
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogNotification::new(level, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    /// Take every buffered notification, oldest first.
    pub fn drain(&self) -> Vec<LogNotification> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Trace)
    }
}

/// The LOOT engine operation set.
pub trait Engine {
    fn update_masterlist(
        &mut self,
        masterlist_path: &str,
        remote_url: &str,
        remote_branch: &str,
    ) -> EngineResult<bool>;

    fn get_masterlist_revision(
        &self,
        masterlist_path: &str,
        get_short_id: bool,
    ) -> EngineResult<MasterlistInfo>;

    fn load_lists(&mut self, masterlist_path: &str, userlist_path: Option<&str>) -> EngineResult<()>;

    fn load_plugins(&mut self, plugins: &[String], load_headers_only: bool) -> EngineResult<()>;

    fn get_plugin(&self, plugin_name: &str) -> EngineResult<Plugin>;

    fn get_plugin_metadata(&self, plugin_name: &str) -> EngineResult<PluginMetadata>;

    fn sort_plugins(&mut self, plugins: &[String]) -> EngineResult<Vec<String>>;

    fn set_load_order(&mut self, plugins: &[String]) -> EngineResult<()>;

    fn get_load_order(&self) -> EngineResult<Vec<String>>;

    fn load_current_load_order_state(&mut self) -> EngineResult<()>;

    fn is_plugin_active(&self, plugin_name: &str) -> EngineResult<bool>;

    fn get_groups(&self, include_user_metadata: bool) -> EngineResult<Vec<Group>>;

    fn get_user_groups(&self) -> EngineResult<Vec<Group>>;

    fn set_user_groups(&mut self, groups: Vec<Group>) -> EngineResult<()>;

    fn get_groups_path(&self, from_group: &str, to_group: &str) -> EngineResult<Vec<Vertex>>;

    fn get_general_messages(&self, evaluate_conditions: bool) -> EngineResult<Vec<Message>>;
}

/// Creates an engine instance for an `init` request.
pub trait EngineFactory {
    fn create(&self, params: &InitParams, logger: Logger) -> EngineResult<Box<dyn Engine>>;
}

impl<F> EngineFactory for F
where
    F: Fn(&InitParams, Logger) -> EngineResult<Box<dyn Engine>>,
{
    fn create(&self, params: &InitParams, logger: Logger) -> EngineResult<Box<dyn Engine>> {
        self(params, logger)
    }
}
