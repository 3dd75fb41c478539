//! Session configuration
//!
//! Settings are resolved in four layers, later layers winning:
//! 1. Built-in defaults
//! 2. Config file (TOML)
//! 3. Environment (`LOOT_WORKER`)
//! 4. CLI flags
//!
//! Only `game.id` and `game.path` have no default; they must come from the
//! file or the command line.

mod defaults;

use std::path::{Path, PathBuf};
use std::time::Duration;

use loot_protocol::GameId;
use serde::{Deserialize, Serialize};

use crate::host::{GameSettings, SessionOptions, WorkerCommand};

pub use defaults::{
    DEFAULT_LANGUAGE, DEFAULT_LOG_FILTER, DEFAULT_SHUTDOWN_TIMEOUT_MS, DEFAULT_WORKER_PROGRAM, LOG_ENV,
    WORKER_ENV,
};

/// Full session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub game: GameSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[worker]`: how the worker process is launched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Worker executable (default: "loot-worker")
    #[serde(default = "defaults::worker_program")]
    pub program: PathBuf,

    /// Extra arguments passed to the worker
    #[serde(default)]
    pub args: Vec<String>,

    /// Grace period before the worker is killed on shutdown
    #[serde(default = "defaults::shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            program: defaults::worker_program(),
            args: Vec::new(),
            shutdown_timeout_ms: defaults::shutdown_timeout_ms(),
        }
    }
}

/// `[game]`: arguments of the initialization exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSection {
    /// Game identifier, e.g. "skyrimse"
    pub id: Option<String>,

    /// Game install directory
    pub path: Option<String>,

    /// Game local data directory (empty: engine default)
    #[serde(default)]
    pub local_path: String,

    #[serde(default = "defaults::language")]
    pub language: String,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            id: None,
            path: None,
            local_path: String::new(),
            language: defaults::language(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// tracing-subscriber filter directive, overridden by `LOOT_ASYNC_LOG`
    #[serde(default = "defaults::log_filter")]
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: defaults::log_filter(),
        }
    }
}

/// Command-line values that override the file (layer 4).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub worker: Option<PathBuf>,
    pub game: Option<String>,
    pub game_path: Option<String>,
    pub local_path: Option<String>,
    pub language: Option<String>,
}

/// Errors that can occur when loading or resolving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Missing required setting '{0}'")]
    MissingField(&'static str),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        2
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that are present. Missing game settings are reported
    /// later by [`SessionConfig::game_settings`], after overrides apply.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.program.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "worker.program",
                reason: "must not be empty".to_string(),
            });
        }

        if let Some(id) = &self.game.id {
            id.parse::<GameId>().map_err(|e| ConfigError::InvalidValue {
                field: "game.id",
                reason: e.to_string(),
            })?;
        }

        if self.game.language.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "game.language",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(program) = lookup(WORKER_ENV).filter(|p| !p.is_empty()) {
            self.worker.program = PathBuf::from(program);
        }
    }

    /// Apply command-line overrides and re-validate.
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        if let Some(worker) = &overrides.worker {
            self.worker.program = worker.clone();
        }
        if let Some(game) = &overrides.game {
            self.game.id = Some(game.clone());
        }
        if let Some(path) = &overrides.game_path {
            self.game.path = Some(path.clone());
        }
        if let Some(local_path) = &overrides.local_path {
            self.game.local_path = local_path.clone();
        }
        if let Some(language) = &overrides.language {
            self.game.language = language.clone();
        }
        self.validate()
    }

    pub fn worker_command(&self) -> WorkerCommand {
        WorkerCommand {
            program: self.worker.program.clone(),
            args: self.worker.args.clone(),
        }
    }

    /// Resolve the initialization settings; `game.id` and `game.path` are
    /// required here.
    pub fn game_settings(&self) -> Result<GameSettings, ConfigError> {
        let id = self.game.id.as_deref().ok_or(ConfigError::MissingField("game.id"))?;
        let game_id = id.parse::<GameId>().map_err(|e| ConfigError::InvalidValue {
            field: "game.id",
            reason: e.to_string(),
        })?;
        let path = self.game.path.as_deref().ok_or(ConfigError::MissingField("game.path"))?;

        Ok(GameSettings::new(game_id, path)
            .with_local_path(self.game.local_path.as_str())
            .with_language(self.game.language.as_str()))
    }

    pub fn session_options(&self) -> Result<SessionOptions, ConfigError> {
        Ok(SessionOptions {
            worker: self.worker_command(),
            game: self.game_settings()?,
            shutdown_timeout: Duration::from_millis(self.worker.shutdown_timeout_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = SessionConfig::parse("").unwrap();
        assert_eq!(config.worker.program, PathBuf::from("loot-worker"));
        assert_eq!(config.worker.shutdown_timeout_ms, 2000);
        assert_eq!(config.game.language, "en");
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_missing_game_reported_on_resolve() {
        let config = SessionConfig::parse("").unwrap();
        assert!(matches!(config.game_settings(), Err(ConfigError::MissingField("game.id"))));
    }

    #[test]
    fn test_unknown_game_rejected() {
        let err = SessionConfig::parse("[game]\nid = \"morrowind\"\npath = \"/g\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "game.id", .. }));
    }

    #[test]
    fn test_env_then_overrides() {
        let mut config = SessionConfig::parse("[worker]\nprogram = \"/opt/loot-worker\"\n").unwrap();

        config.apply_env_from(|key| (key == WORKER_ENV).then(|| "/env/loot-worker".to_string()));
        assert_eq!(config.worker.program, PathBuf::from("/env/loot-worker"));

        let overrides = Overrides {
            worker: Some(PathBuf::from("/cli/loot-worker")),
            game: Some("oblivion".to_string()),
            game_path: Some("/games/oblivion".to_string()),
            ..Overrides::default()
        };
        config.apply_overrides(&overrides).unwrap();

        let options = config.session_options().unwrap();
        assert_eq!(options.worker.program, PathBuf::from("/cli/loot-worker"));
        assert_eq!(options.game, GameSettings::new(GameId::Oblivion, "/games/oblivion"));
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let mut config = SessionConfig::default();
        config.apply_env_from(|_| Some(String::new()));
        assert_eq!(config.worker.program, PathBuf::from(DEFAULT_WORKER_PROGRAM));
    }
}
