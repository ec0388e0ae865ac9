//! Versioned, content-addressed artifact store. Backs two callers: the
//! `python_script` kernel-scoped artifact API in `dagflow-codegen`'s
//! generated code, and, through the same `sha256_hex`/`ArtifactStore`
//! primitives, anything wanting durable storage keyed by content hash
//! rather than by run.

pub mod format;
pub mod model;
pub mod store;

pub use format::detect_format;
pub use model::{Artifact, ArtifactId, ArtifactStatus, NamespaceId, SerializationFormat};
pub use store::{sha256_hex, ArtifactMetadata, ArtifactStore, FinalizeResult, ListFilter, PrepareUpload};
