//! The `Graph` model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::edge::{Edge, SlotKind};
use crate::error::{DagflowError, Result};
use crate::history::HistoryManager;
use crate::ids::{FlowId, GraphUuid, NodeId};
use crate::node::{ExecuteLocation, Node};
use crate::node_type::NodeTypeId;
use crate::settings::SettingsPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Development,
    Performance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    pub flow_id: FlowId,
    pub name: String,
    pub path: Option<String>,
    pub execution_mode: ExecutionMode,
    pub execution_location: ExecuteLocation,
    pub user_id: Option<String>,
}

impl FlowSettings {
    pub fn new(flow_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            flow_id: FlowId(flow_id.into()),
            name: name.into(),
            path: None,
            execution_mode: ExecutionMode::Development,
            execution_location: ExecuteLocation::Auto,
            user_id: None,
        }
    }
}

/// A graph is everything persisted in a flow-file: flow-level
/// settings, the node/edge sets, and the undo/redo history attached to
/// them. `history` is skipped from (de)serialization — a loaded flow-file
/// starts with empty history — history is session-scoped, not part of the
/// saved graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub flow_settings: FlowSettings,
    pub graph_uuid: GraphUuid,
    pub nodes: IndexMap<NodeId, Node>,
    pub edges: Vec<Edge>,

    #[serde(skip)]
    pub history: HistoryManager,
    next_id: i64,
}

/// Snapshot shape used for history capture/restore: everything in `Graph`
/// except the history manager itself (capturing the history inside its own
/// entries would be unbounded recursion).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphSnapshot {
    flow_settings: FlowSettings,
    graph_uuid: GraphUuid,
    nodes: IndexMap<NodeId, Node>,
    edges: Vec<Edge>,
    next_id: i64,
}

impl Graph {
    pub fn new(flow_settings: FlowSettings) -> Self {
        Self {
            flow_settings,
            graph_uuid: GraphUuid::new(),
            nodes: IndexMap::new(),
            edges: Vec::new(),
            history: HistoryManager::default(),
            next_id: 1,
        }
    }

    fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            flow_settings: self.flow_settings.clone(),
            graph_uuid: self.graph_uuid,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            next_id: self.next_id,
        }
    }

    fn apply_snapshot(&mut self, snapshot: GraphSnapshot) {
        let flow_id = self.flow_settings.flow_id.clone();
        self.flow_settings = snapshot.flow_settings;
        self.flow_settings.flow_id = flow_id;
        self.graph_uuid = snapshot.graph_uuid;
        self.nodes = snapshot.nodes;
        self.edges = snapshot.edges;
        self.next_id = snapshot.next_id;
    }

    /// Capture the current state into history if it differs from the
    /// top-of-stack entry. Call after any mutation that should be undoable,
    /// labeling it with a short action type (e.g. `"add_edge"`) and a
    /// human-readable description for an undo/redo menu.
    pub fn capture_history(
        &mut self,
        action_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<bool> {
        let snapshot = self.snapshot();
        self.history.capture_if_changed(&snapshot, action_type, description)
    }

    pub fn undo(&mut self) -> Result<crate::history::HistoryChange> {
        let mut restored = None;
        let change = self.history.undo(|s: GraphSnapshot| restored = Some(s))?;
        if let Some(s) = restored {
            self.apply_snapshot(s);
        }
        Ok(change)
    }

    pub fn redo(&mut self) -> Result<crate::history::HistoryChange> {
        let mut restored = None;
        let change = self.history.redo(|s: GraphSnapshot| restored = Some(s))?;
        if let Some(s) = restored {
            self.apply_snapshot(s);
        }
        Ok(change)
    }

    /// Step one of two-step node creation: allocate an id and insert
    /// a promise with placeholder settings. The node is not `is_correct`
    /// until `commit_settings` is called and its inputs are connected.
    pub fn add_node_promise(&mut self, type_id: NodeTypeId) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new_promise(id, type_id));
        id
    }

    /// Step two: commit real settings onto a promise, replacing
    /// `SettingsPayload::Placeholder` wholesale, then reset the node and
    /// everything downstream of it.
    pub fn commit_settings(&mut self, id: NodeId, settings: SettingsPayload) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(DagflowError::GraphInvalid(format!("no such node {id}")));
        }
        self.nodes.get_mut(&id).unwrap().setting_input = settings;
        self.reset_from(id);
        Ok(())
    }

    fn path_exists(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }
        let mut seen = std::collections::HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            for edge in &self.edges {
                if edge.from == current {
                    queue.push_back(edge.to);
                }
            }
        }
        false
    }

    /// Connect `from -> to` on the given slot. Rejects the edge if it would
    /// create a cycle or if `to`'s node type does not
    /// have a slot of this kind.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, slot: SlotKind) -> Result<()> {
        if !self.nodes.contains_key(&from) || !self.nodes.contains_key(&to) {
            return Err(DagflowError::GraphInvalid("edge references unknown node".into()));
        }
        if self.path_exists(to, from) {
            return Err(DagflowError::GraphInvalid(format!(
                "adding edge {from}->{to} would create a cycle"
            )));
        }

        let template = self.nodes[&to].template();
        let is_two_input = matches!(template.input_arity, crate::node_type::InputArity::Two);
        if is_two_input && matches!(slot, SlotKind::Main) {
            return Err(DagflowError::GraphInvalid(format!(
                "node {to} requires left/right inputs, not main"
            )));
        }
        if !is_two_input && !matches!(slot, SlotKind::Main) {
            return Err(DagflowError::GraphInvalid(format!(
                "node {to} does not accept a {slot:?} input"
            )));
        }

        self.edges.push(Edge::new(from, to, slot));
        self.reset_from(to);
        Ok(())
    }

    pub fn delete_edge(&mut self, from: NodeId, to: NodeId, slot: SlotKind) -> Result<()> {
        let before = self.edges.len();
        self.edges
            .retain(|e| !(e.from == from && e.to == to && e.slot == slot));
        if self.edges.len() == before {
            return Err(DagflowError::GraphInvalid("no such edge".into()));
        }
        self.reset_from(to);
        Ok(())
    }

    /// Delete a node and every edge touching it, then reset everything that
    /// was downstream of it.
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        if self.nodes.shift_remove(&id).is_none() {
            return Err(DagflowError::GraphInvalid(format!("no such node {id}")));
        }
        let downstream: Vec<NodeId> = self
            .edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to)
            .collect();
        self.edges.retain(|e| e.from != id && e.to != id);
        for d in downstream {
            self.reset_from(d);
        }
        Ok(())
    }

    /// Reset `id` and every node transitively downstream of it — resetting
    /// a node invalidates anything depending on its output.
    pub fn reset_from(&mut self, id: NodeId) {
        let mut queue = VecDeque::from([id]);
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&current) {
                node.reset();
            }
            for edge in &self.edges {
                if edge.from == current {
                    queue.push_back(edge.to);
                }
            }
        }
    }

    pub fn inputs_of(&self, id: NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.to == id).collect()
    }

    /// A node is correct once its settings are committed and it has
    /// enough connected inputs for its type's arity.
    pub fn is_correct(&self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        if !node.has_committed_settings() {
            return false;
        }
        let template = node.template();
        let input_count = self.inputs_of(id).len();
        if template.is_multi() {
            input_count >= 1
        } else {
            input_count == template.required_inputs()
        }
    }

    /// The whole graph is runnable only once every node in it is correct.
    pub fn is_valid(&self) -> bool {
        self.nodes.keys().all(|id| self.is_correct(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Graph {
        Graph::new(FlowSettings::new("flow-1", "test"))
    }

    #[test]
    fn rejects_cycle() {
        let mut g = graph();
        let a = g.add_node_promise(NodeTypeId::ManualInput);
        let b = g.add_node_promise(NodeTypeId::Filter);
        g.add_edge(a, b, SlotKind::Main).unwrap();
        let err = g.add_edge(b, a, SlotKind::Main).unwrap_err();
        assert!(matches!(err, DagflowError::GraphInvalid(_)));
    }

    #[test]
    fn delete_node_resets_downstream() {
        let mut g = graph();
        let a = g.add_node_promise(NodeTypeId::ManualInput);
        let b = g.add_node_promise(NodeTypeId::Filter);
        g.add_edge(a, b, SlotKind::Main).unwrap();
        g.commit_settings(
            b,
            SettingsPayload::Filter {
                predicate: "x > 1".into(),
            },
        )
        .unwrap();
        g.nodes.get_mut(&b).unwrap().cached_hash = Some(42);
        g.delete_node(a).unwrap();
        assert!(g.nodes[&b].cached_hash.is_none());
    }

    #[test]
    fn is_correct_requires_settings_and_inputs() {
        let mut g = graph();
        let a = g.add_node_promise(NodeTypeId::ManualInput);
        let b = g.add_node_promise(NodeTypeId::Filter);
        assert!(!g.is_correct(b));
        g.add_edge(a, b, SlotKind::Main).unwrap();
        assert!(!g.is_correct(b));
        g.commit_settings(
            b,
            SettingsPayload::Filter {
                predicate: "x > 1".into(),
            },
        )
        .unwrap();
        assert!(g.is_correct(b));
    }

    #[test]
    fn undo_redo_restores_edges() {
        let mut g = graph();
        let a = g.add_node_promise(NodeTypeId::ManualInput);
        g.capture_history("add_node", "Add Manual Input node").unwrap();
        let b = g.add_node_promise(NodeTypeId::Filter);
        g.add_edge(a, b, SlotKind::Main).unwrap();
        g.capture_history("add_edge", "Connect Manual Input to Filter").unwrap();
        assert_eq!(g.edges.len(), 1);

        let change = g.undo().unwrap();
        assert!(change.success);
        assert_eq!(change.action_type.as_deref(), Some("add_edge"));
        assert_eq!(g.edges.len(), 0);
        assert_eq!(g.nodes.len(), 1);

        let change = g.redo().unwrap();
        assert!(change.success);
        assert_eq!(g.edges.len(), 1);
        assert_eq!(g.nodes.len(), 2);
    }
}
