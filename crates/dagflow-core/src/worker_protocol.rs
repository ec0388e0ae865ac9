//! Wire types for the stateless HTTP worker the remote executor talks to.
//! Kept here rather than in `dagflow-exec` or the worker crate itself: a
//! worker binary needs these types without depending on the scheduler, and
//! the scheduler needs them without depending on the worker's service code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{FlowId, NodeId};
use crate::settings::SettingsPayload;

/// One of the three operations a worker accepts. `Sample` is the only one
/// carrying a parameter; the others are fully described by their tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    ComputeAndCache,
    Sample { n: usize },
    RowCount,
}

/// What a worker needs to rebuild the node's lazy plan: its type tag
/// (`NodeTypeId::tag()`), its committed settings, and the content-addressed
/// keys of its already-materialized inputs. Stands in for a serialized
/// physical plan — this workspace has no logical-plan encoder, so the
/// worker re-derives the `DataFrame` through the same node-type dispatch
/// the local executor uses rather than deserializing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecipe {
    pub node_type: String,
    pub settings: SettingsPayload,
    pub input_cache_keys: HashMap<String, String>,
    pub main_input_cache_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub operation: Operation,
    pub cache_key: String,
    pub plan_bytes: Vec<u8>,
    pub flow_id: FlowId,
    pub node_id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
    TimedOut,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Canceled | TaskState::TimedOut)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
}
