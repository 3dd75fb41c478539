//! Engine data shapes carried in arguments and results.
//!
//! The dispatch core treats arguments and results as opaque JSON; these
//! types describe what the engine actually exchanges so both sides can
//! build and read them without hand-written JSON.

use serde::{Deserialize, Serialize};

/// Revision information about a masterlist file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterlistInfo {
    pub revision_id: String,
    pub revision_date: String,
    pub is_modified: bool,
}

/// A plugin group; plugins in a group load after every group in `after`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            after: Vec::new(),
        }
    }

    pub fn after(mut self, group: impl Into<String>) -> Self {
        self.after.push(group.into());
        self
    }
}

/// Kind of edge joining two vertices of a path or cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeType {
    Hardcoded,
    MasterFlag,
    Master,
    MasterlistRequirement,
    UserRequirement,
    MasterlistLoadAfter,
    UserLoadAfter,
    MasterlistGroup,
    UserGroup,
    RecordOverlap,
    AssetOverlap,
    TieBreak,
}

/// A vertex of a group path or interaction cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vertex {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_of_edge_to_next_vertex: Option<EdgeType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Say,
    Warn,
    Error,
}

/// A message attached to a plugin or to the masterlist in general.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Header information of a loaded plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub name: String,
    pub is_master: bool,
    pub is_light_plugin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub masters: Vec<String>,
}

/// Metadata the masterlist and userlist hold about one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub incompatibilities: Vec<String>,
    #[serde(default)]
    pub load_after_files: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub group: String,
}

fn enabled_default() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_wire_shape() {
        let group = Group::new("late").after("default");
        assert_eq!(
            serde_json::to_value(&group).unwrap(),
            json!({"name": "late", "after": ["default"]})
        );
    }

    #[test]
    fn test_vertex_edge_type_names() {
        let vertex = Vertex {
            name: "early".to_string(),
            type_of_edge_to_next_vertex: Some(EdgeType::MasterlistGroup),
        };
        assert_eq!(
            serde_json::to_value(&vertex).unwrap(),
            json!({"name": "early", "typeOfEdgeToNextVertex": "masterlistGroup"})
        );
    }
}
