//! The `Node` model — a direct generalization of `NodeStep` /
//! `NodeStepStats` / `NodeStepSettings` / `NodeSchemaInformation` /
//! `NodeResults` into one Rust type with explicit state rather than four
//! loosely-coupled dataclasses.

use crate::ids::NodeId;
use crate::node_type::{template_for, NodeTemplate, NodeTypeId};
use crate::schema::Schema;
use crate::schema_callback::SchemaCallback;
use crate::settings::SettingsPayload;
use serde::{Deserialize, Serialize};

/// Where a node is permitted/intended to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecuteLocation {
    Local,
    Remote,
    Auto,
}

/// Lifecycle status of a node's last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    NotRun,
    Running,
    Completed,
    Error,
    Canceled,
}

/// Settings that govern how a node participates in a run, independent of
/// its type-specific `SettingsPayload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunSettings {
    pub cache_results: bool,
    pub renew_schema: bool,
    pub streamable: bool,
    pub execute_location: ExecuteLocation,
}

impl Default for NodeRunSettings {
    fn default() -> Self {
        Self {
            cache_results: true,
            renew_schema: true,
            streamable: true,
            execute_location: ExecuteLocation::Auto,
        }
    }
}

/// Predicted and materialized schema state for a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSchemaInfo {
    pub predicted_schema: Option<Schema>,
    pub result_schema: Option<Schema>,
}

/// Outcome of a node's last execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeResults {
    pub run_time_ms: Option<u64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl NodeResults {
    pub fn reset(&mut self) {
        *self = NodeResults::default();
    }
}

/// Handle to a small materialized sample of this node's output, kept for
/// UI preview without re-running the node or re-reading its full cached
/// result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleDataHandle {
    pub cache_hash: u128,
    pub row_count: usize,
}

/// A single node in the graph. `setting_input` starts as
/// `SettingsPayload::Placeholder` for a bare promise and is replaced
/// wholesale when settings are committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub type_id: NodeTypeId,
    pub setting_input: SettingsPayload,
    pub run_settings: NodeRunSettings,
    pub schema: NodeSchemaInfo,
    pub results: NodeResults,

    #[serde(skip)]
    pub status: RunStatusCell,

    /// True once a schema callback or settings repair raised; blocks
    /// execution until the node is re-configured.
    pub setup_errors: bool,

    /// Cached `Node.hash`. `None` means "needs recomputation".
    #[serde(skip)]
    pub cached_hash: Option<u128>,

    /// Handle to a cached UI-preview sample of this node's output.
    pub example_data: Option<ExampleDataHandle>,

    /// Free text describing the last execution or setup failure, if any.
    pub error_text: Option<String>,

    /// Single-execution schema-prediction callback. Session-local: set by
    /// the host after loading a flow-file, never persisted.
    #[serde(skip)]
    pub schema_callback: Option<SchemaCallback>,
}

/// Wraps `RunStatus` behind a plain field but keeps it out of the
/// hand-written `Serialize`/`Deserialize` derive defaults: run status is
/// process-local, never persisted in a flow-file.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunStatusCell(pub RunStatus);

impl Default for RunStatus {
    fn default() -> Self {
        RunStatus::NotRun
    }
}

impl Node {
    pub fn new_promise(id: NodeId, type_id: NodeTypeId) -> Self {
        Self {
            id,
            type_id,
            setting_input: SettingsPayload::Placeholder,
            run_settings: NodeRunSettings::default(),
            schema: NodeSchemaInfo::default(),
            results: NodeResults::default(),
            status: RunStatusCell::default(),
            setup_errors: false,
            cached_hash: None,
            example_data: None,
            error_text: None,
            schema_callback: None,
        }
    }

    /// Attach the schema-prediction callback for this node. Typically set
    /// once by the host after loading a flow-file, since the generator
    /// closure needs live access to upstream schemas and the dataframe
    /// adapter that the bare `Node` model doesn't hold.
    pub fn set_schema_callback(&mut self, callback: SchemaCallback) {
        self.schema_callback = Some(callback);
    }

    /// Run (or reuse) the schema-prediction callback and cache its result.
    /// On failure, flags `setup_errors` and caches an empty schema rather
    /// than leaving `predicted_schema` stale.
    pub async fn predict_schema(&mut self) -> Schema {
        let Some(callback) = self.schema_callback.clone() else {
            return self.schema.predicted_schema.clone().unwrap_or_default();
        };
        match callback.get().await {
            Ok(schema) => {
                self.schema.predicted_schema = Some(schema.clone());
                self.setup_errors = false;
                schema
            }
            Err(e) => {
                self.setup_errors = true;
                self.error_text = Some(e.to_string());
                self.schema.predicted_schema = Some(Schema::default());
                Schema::default()
            }
        }
    }

    pub fn template(&self) -> NodeTemplate {
        template_for(self.type_id)
    }

    /// A node is "correct" once it has committed, non-placeholder
    /// settings and enough connected inputs for its arity.
    pub fn has_committed_settings(&self) -> bool {
        !self.setting_input.is_placeholder()
    }

    /// Invalidate cached hash, predicted/result schema, and results — called
    /// whenever this node's settings or an upstream dependency changes.
    /// Note: this clears the cached `predicted_schema` mirror but not the
    /// `SchemaCallback`'s own internal cache (an async operation this sync
    /// method can't perform) — callers that reset a node whose upstream
    /// schema changed should also `await node.schema_callback().reset()`.
    pub fn reset(&mut self) {
        self.cached_hash = None;
        self.schema.predicted_schema = None;
        self.schema.result_schema = None;
        self.results.reset();
        self.status.0 = RunStatus::NotRun;
        self.example_data = None;
        self.error_text = None;
    }

    /// Cache decision: mirrors `NodeStep.needs_run`.
    pub fn needs_run(&self, cache_exists: bool) -> bool {
        if !matches!(self.status.0, RunStatus::Completed) {
            return true;
        }
        if self.run_settings.cache_results {
            !cache_exists
        } else {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DagflowError;
    use crate::schema::DType;

    #[tokio::test]
    async fn predict_schema_success_caches_and_clears_setup_errors() {
        let mut node = Node::new_promise(NodeId(1), NodeTypeId::Filter);
        node.setup_errors = true;
        node.set_schema_callback(SchemaCallback::new(|| async {
            Ok(vec![crate::schema::SchemaField::new("a", DType::Int64)])
        }));
        let schema = node.predict_schema().await;
        assert_eq!(schema.len(), 1);
        assert!(!node.setup_errors);
        assert!(node.schema.predicted_schema.is_some());
    }

    #[tokio::test]
    async fn predict_schema_failure_sets_setup_errors_and_empty_schema() {
        let mut node = Node::new_promise(NodeId(1), NodeTypeId::Filter);
        node.set_schema_callback(SchemaCallback::new(|| async {
            Err(DagflowError::GraphInvalid("bad predicate".into()))
        }));
        let schema = node.predict_schema().await;
        assert!(schema.is_empty());
        assert!(node.setup_errors);
        assert!(node.error_text.as_deref().unwrap().contains("bad predicate"));
    }
}
