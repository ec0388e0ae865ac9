//! The `Artifact` record and its supporting types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dagflow_core::FlowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

/// Catalog namespace an artifact belongs to. A string rather than a graph
/// concept: namespaces outlive any one flow and are shared across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactStatus {
    Pending,
    Active,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializationFormat {
    Pickle,
    Joblib,
    Parquet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: ArtifactId,
    pub name: String,
    pub version: u32,
    pub namespace_id: NamespaceId,
    pub source_node_id: Option<i64>,
    pub source_flow_id: Option<FlowId>,
    pub format: SerializationFormat,
    pub sha256: String,
    pub size_bytes: u64,
    pub python_type: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub status: ArtifactStatus,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}
