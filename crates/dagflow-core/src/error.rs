use crate::ids::NodeId;

/// Error kinds produced by the graph model and, via re-export, the rest of
/// the engine.
#[derive(Debug, thiserror::Error)]
pub enum DagflowError {
    #[error("graph invalid: {0}")]
    GraphInvalid(String),

    #[error("settings invalid for node {node}: {message}")]
    SettingsInvalid { node: NodeId, message: String },

    #[error("schema drift on node {node}: {message}")]
    SchemaDrift { node: NodeId, message: String },

    #[error("execution failed on node {node}: {message}")]
    ExecutionFailed { node: NodeId, message: String },

    #[error("remote execution failed (code {error_code:?}): {description}")]
    RemoteFailed {
        error_code: Option<i64>,
        description: String,
    },

    #[error("remote worker killed the task (likely OOM)")]
    RemoteKilled,

    #[error("cache file missing for an upstream node: {0}")]
    MissingInputCache(String),

    #[error("run canceled")]
    Canceled,

    #[error("unsupported python_script construct: {0}")]
    CodegenUnsupported(String),

    #[error("artifact conflict: {0}")]
    ArtifactConflict(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DagflowError>;
