//! Operation dispatcher.
//!
//! Routes a decoded request onto the matching engine method and encodes the
//! return value as the opaque `result` payload.

use loot_protocol::{GameId, Group, Operation, Request};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::engine::{Engine, EngineError, EngineResult, InitParams};

/// Positional argument accessor with engine-style error reporting.
struct Args<'a> {
    op: Operation,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(request: &'a Request) -> Self {
        Self {
            op: request.op,
            values: &request.args,
        }
    }

    fn required<T: DeserializeOwned>(&self, index: usize, name: &str) -> EngineResult<T> {
        let value = self.values.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| EngineError::InvalidArguments {
            op: self.op.to_string(),
            reason: format!("argument {} ({}): {}", index, name, e),
        })
    }

    fn optional<T: DeserializeOwned>(&self, index: usize, name: &str) -> EngineResult<Option<T>> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.required(index, name).map(Some),
        }
    }
}

fn encode<T: Serialize>(value: T) -> EngineResult<Value> {
    serde_json::to_value(value).map_err(|e| EngineError::Other(format!("failed to encode result: {}", e)))
}

/// Decode the arguments of an `init` request.
pub fn parse_init(request: &Request) -> EngineResult<InitParams> {
    let args = Args::new(request);
    let game: String = args.required(0, "gameId")?;
    let game_id = game
        .parse::<GameId>()
        .map_err(|_| EngineError::UnsupportedGame(game.clone()))?;

    Ok(InitParams {
        game_id,
        game_path: args.required(1, "gamePath")?,
        game_local_path: args.optional(2, "gameLocalPath")?.unwrap_or_default(),
        language: args.optional(3, "language")?.unwrap_or_else(|| "en".to_string()),
    })
}

/// Dispatch a non-init request to the engine.
pub fn dispatch(engine: &mut dyn Engine, request: &Request) -> EngineResult<Value> {
    let args = Args::new(request);

    match request.op {
        Operation::Init => Err(EngineError::Other(
            "init must be handled by the worker, not the engine".to_string(),
        )),
        Operation::UpdateMasterlist => encode(engine.update_masterlist(
            &args.required::<String>(0, "masterlistPath")?,
            &args.required::<String>(1, "remoteUrl")?,
            &args.required::<String>(2, "remoteBranch")?,
        )?),
        Operation::GetMasterlistRevision => encode(engine.get_masterlist_revision(
            &args.required::<String>(0, "masterlistPath")?,
            args.optional(1, "getShortId")?.unwrap_or(false),
        )?),
        Operation::LoadLists => {
            let userlist: Option<String> = args.optional(1, "userlistPath")?;
            engine.load_lists(&args.required::<String>(0, "masterlistPath")?, userlist.as_deref())?;
            Ok(Value::Null)
        }
        Operation::LoadPlugins => {
            engine.load_plugins(
                &args.required::<Vec<String>>(0, "plugins")?,
                args.optional(1, "loadHeadersOnly")?.unwrap_or(false),
            )?;
            Ok(Value::Null)
        }
        Operation::GetPlugin => encode(engine.get_plugin(&args.required::<String>(0, "pluginName")?)?),
        Operation::GetPluginMetadata => {
            encode(engine.get_plugin_metadata(&args.required::<String>(0, "pluginName")?)?)
        }
        Operation::SortPlugins => encode(engine.sort_plugins(&args.required::<Vec<String>>(0, "plugins")?)?),
        Operation::SetLoadOrder => {
            engine.set_load_order(&args.required::<Vec<String>>(0, "plugins")?)?;
            Ok(Value::Null)
        }
        Operation::GetLoadOrder => encode(engine.get_load_order()?),
        Operation::LoadCurrentLoadOrderState => {
            engine.load_current_load_order_state()?;
            Ok(Value::Null)
        }
        Operation::IsPluginActive => {
            encode(engine.is_plugin_active(&args.required::<String>(0, "pluginName")?)?)
        }
        Operation::GetGroups => encode(engine.get_groups(args.optional(0, "includeUserMetadata")?.unwrap_or(true))?),
        Operation::GetUserGroups => encode(engine.get_user_groups()?),
        Operation::SetUserGroups => {
            engine.set_user_groups(args.required::<Vec<Group>>(0, "groups")?)?;
            Ok(Value::Null)
        }
        Operation::GetGroupsPath => encode(engine.get_groups_path(
            &args.required::<String>(0, "fromGroupName")?,
            &args.required::<String>(1, "toGroupName")?,
        )?),
        Operation::GetGeneralMessages => {
            encode(engine.get_general_messages(args.optional(0, "evaluateConditions")?.unwrap_or(false))?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_init_defaults() {
        let request = Request::new(Operation::Init, vec![json!("skyrimse"), json!("/games/skyrim")]);
        let params = parse_init(&request).unwrap();
        assert_eq!(params.game_id, GameId::SkyrimSe);
        assert_eq!(params.game_path, "/games/skyrim");
        assert_eq!(params.game_local_path, "");
        assert_eq!(params.language, "en");
    }

    #[test]
    fn test_parse_init_unsupported_game() {
        let request = Request::new(Operation::Init, vec![json!("morrowind"), json!("/games")]);
        assert_eq!(
            parse_init(&request).unwrap_err(),
            EngineError::UnsupportedGame("morrowind".to_string())
        );
    }

    #[test]
    fn test_missing_argument_is_reported() {
        let request = Request::new(Operation::Init, vec![json!("skyrim")]);
        match parse_init(&request).unwrap_err() {
            EngineError::InvalidArguments { op, reason } => {
                assert_eq!(op, "init");
                assert!(reason.contains("gamePath"), "reason: {}", reason);
            }
            other => panic!("expected InvalidArguments, got {:?}", other),
        }
    }
}
