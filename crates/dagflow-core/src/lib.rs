//! Graph model for dagflow: nodes, edges, hashing, schema propagation,
//! settings repair, and undo/redo history. This crate has no I/O — column
//! data lives behind the `DataframeAdapter` trait in `dagflow-dataframe`,
//! execution lives in `dagflow-exec`.

pub mod edge;
pub mod error;
pub mod graph;
pub mod hash;
pub mod history;
pub mod ids;
pub mod node;
pub mod node_type;
pub mod run_info;
pub mod schema;
pub mod schema_callback;
pub mod setting_repair;
pub mod settings;
pub mod worker_protocol;

pub use edge::{Edge, SlotKind};
pub use error::{DagflowError, Result};
pub use graph::{ExecutionMode, FlowSettings, Graph};
pub use ids::{FlowId, GraphUuid, NodeId};
pub use node::{ExampleDataHandle, ExecuteLocation, Node, NodeResults, NodeRunSettings, NodeSchemaInfo, RunStatus};
pub use node_type::{InputArity, NodeTemplate, NodeTypeId, TransformType};
pub use run_info::{NodeRunResult, RunInformation};
pub use schema::{DType, Schema, SchemaField};
pub use schema_callback::SchemaCallback;
pub use settings::SettingsPayload;
pub use worker_protocol::{NodeRecipe, Operation, StatusResponse, SubmitRequest, SubmitResponse, TaskState};
