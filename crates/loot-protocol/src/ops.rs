//! Engine operation table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Known operation names, as they appear in the `type` field.
pub mod names {
    pub const INIT: &str = "init";
    pub const UPDATE_MASTERLIST: &str = "updateMasterlist";
    pub const GET_MASTERLIST_REVISION: &str = "getMasterlistRevision";
    pub const LOAD_LISTS: &str = "loadLists";
    pub const LOAD_PLUGINS: &str = "loadPlugins";
    pub const GET_PLUGIN: &str = "getPlugin";
    pub const GET_PLUGIN_METADATA: &str = "getPluginMetadata";
    pub const SORT_PLUGINS: &str = "sortPlugins";
    pub const SET_LOAD_ORDER: &str = "setLoadOrder";
    pub const GET_LOAD_ORDER: &str = "getLoadOrder";
    pub const LOAD_CURRENT_LOAD_ORDER_STATE: &str = "loadCurrentLoadOrderState";
    pub const IS_PLUGIN_ACTIVE: &str = "isPluginActive";
    pub const GET_GROUPS: &str = "getGroups";
    pub const GET_USER_GROUPS: &str = "getUserGroups";
    pub const SET_USER_GROUPS: &str = "setUserGroups";
    pub const GET_GROUPS_PATH: &str = "getGroupsPath";
    pub const GET_GENERAL_MESSAGES: &str = "getGeneralMessages";
}

/// Operations the worker accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Creates the engine instance; must precede every other operation
    Init,
    UpdateMasterlist,
    GetMasterlistRevision,
    LoadLists,
    LoadPlugins,
    GetPlugin,
    GetPluginMetadata,
    SortPlugins,
    SetLoadOrder,
    GetLoadOrder,
    LoadCurrentLoadOrderState,
    IsPluginActive,
    GetGroups,
    GetUserGroups,
    SetUserGroups,
    GetGroupsPath,
    GetGeneralMessages,
}

impl Operation {
    /// Every operation, `Init` first.
    pub const ALL: [Operation; 17] = [
        Operation::Init,
        Operation::UpdateMasterlist,
        Operation::GetMasterlistRevision,
        Operation::LoadLists,
        Operation::LoadPlugins,
        Operation::GetPlugin,
        Operation::GetPluginMetadata,
        Operation::SortPlugins,
        Operation::SetLoadOrder,
        Operation::GetLoadOrder,
        Operation::LoadCurrentLoadOrderState,
        Operation::IsPluginActive,
        Operation::GetGroups,
        Operation::GetUserGroups,
        Operation::SetUserGroups,
        Operation::GetGroupsPath,
        Operation::GetGeneralMessages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Init => names::INIT,
            Operation::UpdateMasterlist => names::UPDATE_MASTERLIST,
            Operation::GetMasterlistRevision => names::GET_MASTERLIST_REVISION,
            Operation::LoadLists => names::LOAD_LISTS,
            Operation::LoadPlugins => names::LOAD_PLUGINS,
            Operation::GetPlugin => names::GET_PLUGIN,
            Operation::GetPluginMetadata => names::GET_PLUGIN_METADATA,
            Operation::SortPlugins => names::SORT_PLUGINS,
            Operation::SetLoadOrder => names::SET_LOAD_ORDER,
            Operation::GetLoadOrder => names::GET_LOAD_ORDER,
            Operation::LoadCurrentLoadOrderState => names::LOAD_CURRENT_LOAD_ORDER_STATE,
            Operation::IsPluginActive => names::IS_PLUGIN_ACTIVE,
            Operation::GetGroups => names::GET_GROUPS,
            Operation::GetUserGroups => names::GET_USER_GROUPS,
            Operation::SetUserGroups => names::SET_USER_GROUPS,
            Operation::GetGroupsPath => names::GET_GROUPS_PATH,
            Operation::GetGeneralMessages => names::GET_GENERAL_MESSAGES,
        }
    }

    /// Operations a caller may issue through the facade (everything but `init`).
    pub fn user_facing() -> impl Iterator<Item = Operation> {
        Operation::ALL.into_iter().filter(|op| *op != Operation::Init)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an operation name is not in the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_names_match_table() {
        for op in Operation::ALL {
            let value = serde_json::to_value(op).unwrap();
            assert_eq!(value, op.as_str());
        }
    }

    #[test]
    fn test_parse_operation() {
        assert_eq!("sortPlugins".parse::<Operation>().unwrap(), Operation::SortPlugins);
        assert!("sort_plugins".parse::<Operation>().is_err());
    }

    #[test]
    fn test_user_facing_excludes_init() {
        assert!(Operation::user_facing().all(|op| op != Operation::Init));
        assert_eq!(Operation::user_facing().count(), Operation::ALL.len() - 1);
    }
}
