//! A local, filesystem-backed `ArtifactStore`: metadata lives in an
//! in-process, mutex-guarded index (mirroring the single-mutex discipline
//! `dagflow_core::history::HistoryManager` uses for its own state); blobs
//! live as plain files under a base directory, named by their storage key.
//! `prepare_upload`/`finalize` are the same two-phase "reserve, then
//! confirm" shape as the graph model's node-creation lifecycle
//! (promise → commit): a `pending` row reserves a version number and a
//! path before the caller has written a single byte, and only `finalize`
//! makes the artifact visible to lookups.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

use dagflow_core::{DagflowError, FlowId, Result};

use crate::model::{Artifact, ArtifactId, ArtifactStatus, NamespaceId, SerializationFormat};

#[derive(Debug, Clone)]
pub struct PrepareUpload {
    pub artifact_id: ArtifactId,
    pub version: u32,
    pub storage_key: String,
    pub upload_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FinalizeResult {
    pub status: ArtifactStatus,
    pub artifact_id: ArtifactId,
    pub version: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactMetadata {
    pub source_node_id: Option<i64>,
    pub source_flow_id: Option<FlowId>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub python_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub namespace_id: Option<NamespaceId>,
    pub tags: Vec<String>,
    pub name_contains: Option<String>,
    pub python_type_contains: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

pub struct ArtifactStore {
    base_dir: PathBuf,
    rows: Mutex<HashMap<ArtifactId, Artifact>>,
}

impl ArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), rows: Mutex::new(HashMap::new()) }
    }

    pub fn prepare_upload(
        &self,
        name: &str,
        namespace_id: Option<NamespaceId>,
        format: SerializationFormat,
        metadata: ArtifactMetadata,
    ) -> Result<PrepareUpload> {
        let namespace = namespace_id
            .or_else(|| metadata.source_flow_id.as_ref().map(|f| NamespaceId(f.0.clone())))
            .ok_or_else(|| {
                DagflowError::ArtifactConflict("namespace_id required when no source registration is given".into())
            })?;

        let mut rows = self.rows.lock().expect("artifact store mutex poisoned");
        let next_version = rows
            .values()
            .filter(|a| a.name == name && a.namespace_id == namespace && a.status == ArtifactStatus::Active)
            .map(|a| a.version)
            .max()
            .map(|v| v + 1)
            .unwrap_or(1);

        let artifact_id = ArtifactId::new();
        let storage_key = format!("{name}/v{next_version}/{}", artifact_id.0);
        let upload_path = self.base_dir.join(&storage_key);

        let artifact = Artifact {
            artifact_id,
            name: name.to_string(),
            version: next_version,
            namespace_id: namespace,
            source_node_id: metadata.source_node_id,
            source_flow_id: metadata.source_flow_id,
            format,
            sha256: String::new(),
            size_bytes: 0,
            python_type: metadata.python_type,
            description: metadata.description,
            tags: metadata.tags,
            status: ArtifactStatus::Pending,
            storage_key: storage_key.clone(),
            created_at: Utc::now(),
        };
        rows.insert(artifact_id, artifact);
        debug!(name, version = next_version, "reserved artifact upload slot");

        Ok(PrepareUpload { artifact_id, version: next_version, storage_key, upload_path })
    }

    pub fn finalize(
        &self,
        artifact_id: ArtifactId,
        storage_key: &str,
        sha256: &str,
        size_bytes: u64,
    ) -> Result<FinalizeResult> {
        let mut rows = self.rows.lock().expect("artifact store mutex poisoned");
        let row = rows
            .get_mut(&artifact_id)
            .ok_or_else(|| DagflowError::ArtifactNotFound(format!("{}", artifact_id.0)))?;

        if row.status != ArtifactStatus::Pending {
            return Err(DagflowError::ArtifactConflict(format!(
                "artifact {} is already {:?}",
                artifact_id.0, row.status
            )));
        }
        if row.storage_key != storage_key {
            return Err(DagflowError::ArtifactConflict("storage_key does not match the reserved upload".into()));
        }

        row.sha256 = sha256.to_string();
        row.size_bytes = size_bytes;
        row.status = ArtifactStatus::Active;

        Ok(FinalizeResult { status: row.status, artifact_id, version: row.version })
    }

    pub fn get_by_name(&self, name: &str, version: Option<u32>, namespace_id: Option<&NamespaceId>) -> Result<Artifact> {
        let rows = self.rows.lock().expect("artifact store mutex poisoned");
        let mut matches: Vec<&Artifact> = rows
            .values()
            .filter(|a| {
                a.name == name
                    && a.status == ArtifactStatus::Active
                    && namespace_id.map_or(true, |ns| &a.namespace_id == ns)
                    && version.map_or(true, |v| a.version == v)
            })
            .collect();
        matches.sort_by_key(|a| a.version);
        matches
            .last()
            .map(|a| (*a).clone())
            .ok_or_else(|| DagflowError::ArtifactNotFound(name.to_string()))
    }

    pub fn get_by_id(&self, artifact_id: ArtifactId) -> Result<Artifact> {
        let rows = self.rows.lock().expect("artifact store mutex poisoned");
        rows.get(&artifact_id).cloned().ok_or_else(|| DagflowError::ArtifactNotFound(format!("{}", artifact_id.0)))
    }

    pub fn list(&self, filter: &ListFilter) -> Vec<Artifact> {
        let rows = self.rows.lock().expect("artifact store mutex poisoned");
        let mut out: Vec<Artifact> = rows
            .values()
            .filter(|a| a.status == ArtifactStatus::Active)
            .filter(|a| filter.namespace_id.as_ref().map_or(true, |ns| &a.namespace_id == ns))
            .filter(|a| filter.name_contains.as_ref().map_or(true, |s| a.name.contains(s.as_str())))
            .filter(|a| filter.python_type_contains.as_ref().map_or(true, |s| a.python_type.contains(s.as_str())))
            .filter(|a| filter.tags.iter().all(|t| a.tags.contains(t)))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));

        let out = out.into_iter().skip(filter.offset);
        match filter.limit {
            Some(n) => out.take(n).collect(),
            None => out.collect(),
        }
    }

    /// `list`'s "names" variant: one entry per distinct name, the latest
    /// active version.
    pub fn list_names(&self, filter: &ListFilter) -> Vec<Artifact> {
        let mut by_name: HashMap<String, Artifact> = HashMap::new();
        for a in self.list(filter) {
            by_name
                .entry(a.name.clone())
                .and_modify(|existing| {
                    if a.version > existing.version {
                        *existing = a.clone();
                    }
                })
                .or_insert(a);
        }
        let mut out: Vec<Artifact> = by_name.into_values().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn delete(&self, artifact_id: ArtifactId) -> Result<()> {
        let mut rows = self.rows.lock().expect("artifact store mutex poisoned");
        let row = rows
            .get_mut(&artifact_id)
            .ok_or_else(|| DagflowError::ArtifactNotFound(format!("{}", artifact_id.0)))?;
        row.status = ArtifactStatus::Deleted;
        Ok(())
    }

    /// Soft-deletes every version of `name` in `namespace_id`.
    pub fn delete_all_versions(&self, name: &str, namespace_id: &NamespaceId) {
        let mut rows = self.rows.lock().expect("artifact store mutex poisoned");
        for row in rows.values_mut() {
            if row.name == name && &row.namespace_id == namespace_id {
                row.status = ArtifactStatus::Deleted;
            }
        }
    }

    /// Guard for deleting a flow registration: refuses while any active
    /// artifact still references it.
    pub fn delete_namespace_flow(&self, registration_id: &FlowId) -> Result<()> {
        let rows = self.rows.lock().expect("artifact store mutex poisoned");
        let still_referenced = rows
            .values()
            .any(|a| a.status == ArtifactStatus::Active && a.source_flow_id.as_ref() == Some(registration_id));
        if still_referenced {
            return Err(DagflowError::ArtifactConflict(format!(
                "registration {registration_id} still has active artifacts"
            )));
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ArtifactMetadata {
        ArtifactMetadata { python_type: "builtins.dict".to_string(), ..Default::default() }
    }

    #[test]
    fn versions_increase_monotonically_per_name_and_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = NamespaceId("ns".to_string());

        for expected_version in 1..=3u32 {
            let reserved = store.prepare_upload("model", Some(ns.clone()), SerializationFormat::Pickle, meta()).unwrap();
            assert_eq!(reserved.version, expected_version);
            store.finalize(reserved.artifact_id, &reserved.storage_key, "deadbeef", 4).unwrap();
        }
    }

    #[test]
    fn pending_artifact_is_invisible_to_get_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = NamespaceId("ns".to_string());
        store.prepare_upload("model", Some(ns.clone()), SerializationFormat::Pickle, meta()).unwrap();
        assert!(store.get_by_name("model", None, Some(&ns)).is_err());
    }

    #[test]
    fn get_by_name_without_version_returns_latest_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = NamespaceId("ns".to_string());
        for _ in 0..2 {
            let reserved = store.prepare_upload("model", Some(ns.clone()), SerializationFormat::Pickle, meta()).unwrap();
            store.finalize(reserved.artifact_id, &reserved.storage_key, "deadbeef", 4).unwrap();
        }
        let latest = store.get_by_name("model", None, Some(&ns)).unwrap();
        assert_eq!(latest.version, 2);
    }

    #[test]
    fn finalize_twice_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ns = NamespaceId("ns".to_string());
        let reserved = store.prepare_upload("model", Some(ns), SerializationFormat::Pickle, meta()).unwrap();
        store.finalize(reserved.artifact_id, &reserved.storage_key, "deadbeef", 4).unwrap();
        let err = store.finalize(reserved.artifact_id, &reserved.storage_key, "deadbeef", 4).unwrap_err();
        assert!(matches!(err, DagflowError::ArtifactConflict(_)));
    }

    #[test]
    fn delete_namespace_flow_refuses_while_active_artifacts_reference_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let flow = FlowId("flow-1".to_string());
        let mut metadata = meta();
        metadata.source_flow_id = Some(flow.clone());
        let reserved = store
            .prepare_upload("model", Some(NamespaceId("ns".to_string())), SerializationFormat::Pickle, metadata)
            .unwrap();
        store.finalize(reserved.artifact_id, &reserved.storage_key, "deadbeef", 4).unwrap();

        assert!(store.delete_namespace_flow(&flow).is_err());
        store.delete(reserved.artifact_id).unwrap();
        assert!(store.delete_namespace_flow(&flow).is_ok());
    }
}
