//! Session Config Tests
//!
//! Loading `loot-async.toml` from disk and resolving it into session options.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use loot_async::config::{ConfigError, Overrides, SessionConfig};
use loot_async::{GameId, GameSettings};
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_config_file() {
    let file = write_config(
        r#"
        [worker]
        program = "/opt/loot/loot-worker"
        args = ["--log-level", "debug"]
        shutdown_timeout_ms = 500

        [game]
        id = "skyrimse"
        path = "/games/skyrim"
        local_path = "/home/u/.local/skyrim"
        language = "fr"

        [logging]
        filter = "loot_async=debug"
        "#,
    );

    let config = SessionConfig::load(file.path()).unwrap();
    assert_eq!(config.logging.filter, "loot_async=debug");

    let options = config.session_options().unwrap();
    assert_eq!(options.worker.program, PathBuf::from("/opt/loot/loot-worker"));
    assert_eq!(options.worker.args, vec!["--log-level", "debug"]);
    assert_eq!(options.shutdown_timeout, Duration::from_millis(500));
    assert_eq!(
        options.game,
        GameSettings::new(GameId::SkyrimSe, "/games/skyrim")
            .with_local_path("/home/u/.local/skyrim")
            .with_language("fr")
    );
}

#[test]
fn test_missing_file() {
    let err = SessionConfig::load(&PathBuf::from("/nonexistent/loot-async.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_malformed_toml() {
    let file = write_config("[worker\nprogram = ");
    assert!(matches!(SessionConfig::load(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_cli_fills_missing_game_path() {
    let file = write_config("[game]\nid = \"fallout4\"\n");
    let mut config = SessionConfig::load(file.path()).unwrap();
    assert!(matches!(config.session_options(), Err(ConfigError::MissingField("game.path"))));

    config
        .apply_overrides(&Overrides {
            game_path: Some("/games/fo4".to_string()),
            ..Overrides::default()
        })
        .unwrap();
    assert_eq!(config.game_settings().unwrap().game_path, "/games/fo4");
}

#[test]
fn test_override_with_bad_game_rejected() {
    let mut config = SessionConfig::default();
    let err = config
        .apply_overrides(&Overrides {
            game: Some("daggerfall".to_string()),
            ..Overrides::default()
        })
        .unwrap_err();
    assert!(err.to_string().contains("game.id"), "unexpected error: {}", err);
}
