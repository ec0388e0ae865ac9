//! Run results. Produced by `dagflow-exec`'s
//! scheduler after executing a graph; kept here since it is part of the
//! public shape a CLI or worker response serializes.

use crate::ids::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunResult {
    pub node_id: NodeId,
    pub success: bool,
    pub run_time_ms: u64,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub skipped_cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInformation {
    pub success: bool,
    pub nodes: Vec<NodeRunResult>,
    pub total_time_ms: u64,
}

impl RunInformation {
    pub fn from_node_results(nodes: Vec<NodeRunResult>, total_time_ms: u64) -> Self {
        let success = nodes.iter().all(|n| n.success);
        Self {
            success,
            nodes,
            total_time_ms,
        }
    }

    pub fn failed_nodes(&self) -> Vec<&NodeRunResult> {
        self.nodes.iter().filter(|n| !n.success).collect()
    }
}
