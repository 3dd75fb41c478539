//! In-memory reference engine.
//!
//! Keeps lists, plugins, load order and groups in memory so the full
//! controller ↔ worker pipeline can run without the native LOOT library.
//! Sorting only applies the rules the real engine treats as hard
//! constraints: the game master first, masters before non-masters, and
//! group ordering must be acyclic.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use loot_protocol::{
    EdgeType, Group, MasterlistInfo, Message, MessageType, Plugin, PluginMetadata, Vertex,
    DEFAULT_GROUP,
};

use crate::engine::{Engine, EngineError, EngineFactory, EngineResult, InitParams, Logger};

const PLUGIN_EXTENSIONS: [&str; 3] = [".esp", ".esm", ".esl"];

type GroupGraph = BTreeMap<String, Vec<(String, EdgeType)>>;

/// Factory producing a fresh [`MemoryEngine`] per `init`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryEngineFactory;

impl EngineFactory for MemoryEngineFactory {
    fn create(&self, params: &InitParams, logger: Logger) -> EngineResult<Box<dyn Engine>> {
        Ok(Box::new(MemoryEngine::new(params.clone(), logger)))
    }
}

pub struct MemoryEngine {
    params: InitParams,
    logger: Logger,
    /// Masterlist path -> number of updates applied
    masterlists: HashMap<String, u32>,
    masterlist_path: Option<String>,
    plugins: BTreeMap<String, Plugin>,
    load_order: Vec<String>,
    active: HashSet<String>,
    masterlist_groups: Vec<Group>,
    user_groups: Vec<Group>,
}

impl MemoryEngine {
    pub fn new(params: InitParams, logger: Logger) -> Self {
        logger.info(format!(
            "Initialising {} game handle at \"{}\" (language {})",
            params.game_id, params.game_path, params.language
        ));
        Self {
            params,
            logger,
            masterlists: HashMap::new(),
            masterlist_path: None,
            plugins: BTreeMap::new(),
            load_order: Vec::new(),
            active: HashSet::new(),
            masterlist_groups: vec![Group::new(DEFAULT_GROUP)],
            user_groups: Vec::new(),
        }
    }

    pub fn params(&self) -> &InitParams {
        &self.params
    }

    fn require_loaded(&self, plugin: &str) -> EngineResult<()> {
        if self.plugins.contains_key(plugin) {
            Ok(())
        } else {
            Err(EngineError::Other(format!("The plugin \"{}\" has not been loaded", plugin)))
        }
    }

    /// Masters first (the game master leading), everything else after; stable otherwise.
    fn master_partition(&self, plugins: &[String]) -> Vec<String> {
        let game_master = self.params.game_id.master_file();
        let rank = |name: &String| {
            if name.eq_ignore_ascii_case(game_master) {
                0
            } else if self.plugins.get(name).is_some_and(|p| p.is_master) {
                1
            } else {
                2
            }
        };
        let mut sorted = plugins.to_vec();
        sorted.sort_by_key(rank);
        sorted
    }

    fn group_graph(&self) -> GroupGraph {
        let mut graph = GroupGraph::new();
        let sources = self
            .masterlist_groups
            .iter()
            .map(|g| (g, EdgeType::MasterlistGroup))
            .chain(self.user_groups.iter().map(|g| (g, EdgeType::UserGroup)));

        for (group, edge) in sources {
            graph.entry(group.name.clone()).or_default();
            for earlier in &group.after {
                graph
                    .entry(earlier.clone())
                    .or_default()
                    .push((group.name.clone(), edge));
            }
        }
        graph
    }

    fn find_group_cycle(&self) -> Option<Vec<Vertex>> {
        let graph = self.group_graph();
        let mut done = HashSet::new();
        for node in graph.keys() {
            if done.contains(node) {
                continue;
            }
            let mut path = Vec::new();
            let mut edges = Vec::new();
            if let Some(cycle) = visit(&graph, node, &mut path, &mut edges, &mut done) {
                return Some(cycle);
            }
        }
        None
    }
}

fn visit(
    graph: &GroupGraph,
    node: &str,
    path: &mut Vec<String>,
    edges: &mut Vec<EdgeType>,
    done: &mut HashSet<String>,
) -> Option<Vec<Vertex>> {
    path.push(node.to_string());
    for (next, edge) in graph.get(node).into_iter().flatten() {
        if let Some(start) = path.iter().position(|n| n == next) {
            edges.push(*edge);
            return Some(
                (start..path.len())
                    .map(|i| Vertex {
                        name: path[i].clone(),
                        type_of_edge_to_next_vertex: Some(edges[i]),
                    })
                    .collect(),
            );
        }
        if done.contains(next) {
            continue;
        }
        edges.push(*edge);
        if let Some(cycle) = visit(graph, next, path, edges, done) {
            return Some(cycle);
        }
        edges.pop();
    }
    path.pop();
    done.insert(node.to_string());
    None
}

impl Engine for MemoryEngine {
    fn update_masterlist(
        &mut self,
        masterlist_path: &str,
        remote_url: &str,
        remote_branch: &str,
    ) -> EngineResult<bool> {
        if remote_url.is_empty() {
            return Err(EngineError::invalid_parameter("updateMasterlist", "remoteUrl", remote_url));
        }
        self.logger.info(format!(
            "Updating masterlist at \"{}\" from {} ({})",
            masterlist_path, remote_url, remote_branch
        ));
        let updates = self.masterlists.entry(masterlist_path.to_string()).or_insert(0);
        *updates += 1;
        Ok(*updates == 1)
    }

    fn get_masterlist_revision(
        &self,
        masterlist_path: &str,
        get_short_id: bool,
    ) -> EngineResult<MasterlistInfo> {
        let updates = self.masterlists.get(masterlist_path).ok_or_else(|| {
            EngineError::Other(format!("No masterlist found at \"{}\"", masterlist_path))
        })?;
        let mut revision_id = format!("{:040x}", updates);
        if get_short_id {
            revision_id.truncate(7);
        }
        Ok(MasterlistInfo {
            revision_id,
            revision_date: "unknown".to_string(),
            is_modified: false,
        })
    }

    fn load_lists(&mut self, masterlist_path: &str, userlist_path: Option<&str>) -> EngineResult<()> {
        if masterlist_path.is_empty() {
            return Err(EngineError::invalid_parameter("loadLists", "masterlistPath", masterlist_path));
        }
        self.logger.debug(format!("Loading masterlist from \"{}\"", masterlist_path));
        if let Some(userlist) = userlist_path.filter(|p| !p.is_empty()) {
            self.logger.debug(format!("Loading userlist from \"{}\"", userlist));
        }
        self.masterlist_path = Some(masterlist_path.to_string());
        Ok(())
    }

    fn load_plugins(&mut self, plugins: &[String], load_headers_only: bool) -> EngineResult<()> {
        for name in plugins {
            let lower = name.to_ascii_lowercase();
            if !PLUGIN_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
                return Err(EngineError::invalid_parameter("loadPlugins", "plugins", name));
            }
            let is_light_plugin = lower.ends_with(".esl");
            self.plugins.insert(
                name.clone(),
                Plugin {
                    name: name.clone(),
                    is_master: is_light_plugin || lower.ends_with(".esm"),
                    is_light_plugin,
                    version: None,
                    masters: Vec::new(),
                },
            );
        }
        self.logger.debug(format!(
            "Loaded {} plugins ({})",
            plugins.len(),
            if load_headers_only { "headers only" } else { "full" }
        ));
        Ok(())
    }

    fn get_plugin(&self, plugin_name: &str) -> EngineResult<Plugin> {
        self.plugins
            .get(plugin_name)
            .cloned()
            .ok_or_else(|| EngineError::Other("Invalid plugin name".to_string()))
    }

    fn get_plugin_metadata(&self, plugin_name: &str) -> EngineResult<PluginMetadata> {
        if !self.plugins.contains_key(plugin_name) {
            return Err(EngineError::invalid_parameter("getPluginMetaData", "pluginName", plugin_name));
        }
        Ok(PluginMetadata {
            name: plugin_name.to_string(),
            messages: Vec::new(),
            tags: Vec::new(),
            incompatibilities: Vec::new(),
            load_after_files: Vec::new(),
            requirements: Vec::new(),
            enabled: true,
            group: DEFAULT_GROUP.to_string(),
        })
    }

    fn sort_plugins(&mut self, plugins: &[String]) -> EngineResult<Vec<String>> {
        for plugin in plugins {
            self.require_loaded(plugin)?;
        }
        if let Some(cycle) = self.find_group_cycle() {
            return Err(EngineError::CyclicInteraction { cycle });
        }
        self.logger.info(format!("Sorting {} plugins", plugins.len()));
        Ok(self.master_partition(plugins))
    }

    fn set_load_order(&mut self, plugins: &[String]) -> EngineResult<()> {
        let game_master = self.params.game_id.master_file();
        let master_index = plugins.iter().position(|p| p.eq_ignore_ascii_case(game_master));
        if matches!(master_index, Some(index) if index != 0) {
            return Err(EngineError::Other(format!("\"{}\" must load first", game_master)));
        }
        self.load_order = plugins.to_vec();
        Ok(())
    }

    fn get_load_order(&self) -> EngineResult<Vec<String>> {
        Ok(self.load_order.clone())
    }

    fn load_current_load_order_state(&mut self) -> EngineResult<()> {
        if self.load_order.is_empty() {
            let names: Vec<String> = self.plugins.keys().cloned().collect();
            self.load_order = self.master_partition(&names);
        }
        self.active = self.load_order.iter().cloned().collect();
        self.logger.debug(format!("Current load order has {} plugins", self.load_order.len()));
        Ok(())
    }

    fn is_plugin_active(&self, plugin_name: &str) -> EngineResult<bool> {
        Ok(self.active.contains(plugin_name))
    }

    fn get_groups(&self, include_user_metadata: bool) -> EngineResult<Vec<Group>> {
        let mut groups = self.masterlist_groups.clone();
        if include_user_metadata {
            for user in &self.user_groups {
                match groups.iter_mut().find(|g| g.name == user.name) {
                    Some(existing) => {
                        for after in &user.after {
                            if !existing.after.contains(after) {
                                existing.after.push(after.clone());
                            }
                        }
                    }
                    None => groups.push(user.clone()),
                }
            }
        }
        Ok(groups)
    }

    fn get_user_groups(&self) -> EngineResult<Vec<Group>> {
        Ok(self.user_groups.clone())
    }

    fn set_user_groups(&mut self, groups: Vec<Group>) -> EngineResult<()> {
        self.logger.debug(format!("Setting {} user groups", groups.len()));
        self.user_groups = groups;
        Ok(())
    }

    fn get_groups_path(&self, from_group: &str, to_group: &str) -> EngineResult<Vec<Vertex>> {
        let graph = self.group_graph();
        for name in [from_group, to_group] {
            if !graph.contains_key(name) {
                return Err(EngineError::Other(format!("The group \"{}\" does not exist", name)));
            }
        }

        let mut previous: HashMap<&str, (&str, EdgeType)> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::from([from_group]);
        let mut queue = VecDeque::from([from_group]);
        while let Some(node) = queue.pop_front() {
            if node == to_group {
                break;
            }
            for (next, edge) in graph.get(node).into_iter().flatten() {
                if seen.insert(next.as_str()) {
                    previous.insert(next.as_str(), (node, *edge));
                    queue.push_back(next.as_str());
                }
            }
        }

        if from_group != to_group && !previous.contains_key(to_group) {
            return Ok(Vec::new());
        }

        let mut path = vec![Vertex {
            name: to_group.to_string(),
            type_of_edge_to_next_vertex: None,
        }];
        let mut current = to_group;
        while let Some((prev, edge)) = previous.get(current) {
            path.push(Vertex {
                name: prev.to_string(),
                type_of_edge_to_next_vertex: Some(*edge),
            });
            current = *prev;
        }
        path.reverse();
        Ok(path)
    }

    fn get_general_messages(&self, _evaluate_conditions: bool) -> EngineResult<Vec<Message>> {
        if self.masterlist_path.is_none() {
            return Ok(vec![Message {
                message_type: MessageType::Warn,
                content: "No masterlist has been loaded.".to_string(),
                condition: None,
            }]);
        }
        Ok(Vec::new())
    }
}
