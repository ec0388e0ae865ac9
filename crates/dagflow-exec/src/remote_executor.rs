//! Remote execution: submit a node to a worker over HTTP, poll for
//! completion, fetch its result. Mirrors the request/poll/fetch shape
//! `dagflow-worker`'s service exposes (`POST /submit`, `GET
//! /status/{task_id}`, `GET /fetch/{cache_key}`, `POST /cancel/{task_id}`).
//! `polars_code`/`python_script` always go through here since this process
//! has no embedded Python/Polars runtime; other node types reach it only
//! when a node's `execute_location` is `Remote`.

use std::collections::HashMap;
use std::time::Duration;

use datafusion::dataframe::DataFrame;
use datafusion::prelude::{ParquetReadOptions, SessionContext};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use dagflow_core::edge::SlotKind;
use dagflow_core::node_type::NodeTypeId;
use dagflow_core::settings::SettingsPayload;
use dagflow_core::{
    DagflowError, FlowId, NodeId, NodeRecipe, Operation, Result, StatusResponse, SubmitRequest, SubmitResponse,
    TaskState,
};

use crate::cache::FsCache;

#[derive(Clone)]
pub struct RemoteExecutor {
    client: reqwest::Client,
    base_url: String,
    cache: FsCache,
    poll_interval: Duration,
}

impl RemoteExecutor {
    pub fn new(base_url: impl Into<String>, cache: FsCache) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache,
            poll_interval: Duration::from_millis(250),
        }
    }

    /// Ensure every input frame this node needs is available to the worker
    /// under a content-addressed key, then submit a `compute_and_cache` task,
    /// poll it to completion, and fetch the result.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        ctx: &SessionContext,
        flow_id: &FlowId,
        node_id: NodeId,
        node_type: NodeTypeId,
        node_hash: u128,
        settings: &SettingsPayload,
        inputs: &HashMap<SlotKind, (DataFrame, u128)>,
        main_inputs: &[(DataFrame, u128)],
        cancel: &CancellationToken,
    ) -> Result<DataFrame> {
        let mut input_cache_keys = HashMap::new();
        for (slot, (frame, hash)) in inputs {
            self.ensure_cached(frame.clone(), *hash).await?;
            input_cache_keys.insert(format!("{slot:?}"), format!("{hash:032x}"));
        }
        let mut main_input_cache_keys = Vec::new();
        for (frame, hash) in main_inputs {
            self.ensure_cached(frame.clone(), *hash).await?;
            main_input_cache_keys.push(format!("{hash:032x}"));
        }

        let recipe = NodeRecipe {
            node_type: node_type.tag().to_string(),
            settings: settings.clone(),
            input_cache_keys,
            main_input_cache_keys,
        };
        let plan_bytes = serde_json::to_vec(&recipe).map_err(|e| DagflowError::Other(e.into()))?;
        let cache_key = format!("{node_hash:032x}");

        let submit: SubmitResponse = self
            .client
            .post(format!("{}/submit", self.base_url))
            .json(&SubmitRequest {
                operation: Operation::ComputeAndCache,
                cache_key: cache_key.clone(),
                plan_bytes,
                flow_id: flow_id.clone(),
                node_id,
            })
            .send()
            .await
            .map_err(|e| DagflowError::Other(e.into()))?
            .json()
            .await
            .map_err(|e| DagflowError::Other(e.into()))?;

        loop {
            if cancel.is_cancelled() {
                let _ = self
                    .client
                    .post(format!("{}/cancel/{}", self.base_url, submit.task_id))
                    .send()
                    .await;
                return Err(DagflowError::Canceled);
            }

            let status: StatusResponse = self
                .client
                .get(format!("{}/status/{}", self.base_url, submit.task_id))
                .send()
                .await
                .map_err(|e| DagflowError::Other(e.into()))?
                .json()
                .await
                .map_err(|e| DagflowError::Other(e.into()))?;

            match status.status {
                TaskState::Queued | TaskState::Running => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                TaskState::Completed => {
                    let result_key = status.result_ref.unwrap_or(cache_key);
                    let hash = u128::from_str_radix(&result_key, 16).map_err(|e| DagflowError::Other(e.into()))?;
                    return self.fetch(ctx, hash).await;
                }
                TaskState::Failed => {
                    if status.error_code == Some(-1) {
                        warn!(node = node_id.0, "remote worker reported the task was killed, likely OOM");
                        return Err(DagflowError::RemoteKilled);
                    }
                    return Err(DagflowError::RemoteFailed {
                        error_code: status.error_code,
                        description: status.error_description.unwrap_or_default(),
                    });
                }
                TaskState::Canceled => return Err(DagflowError::Canceled),
                TaskState::TimedOut => {
                    return Err(DagflowError::RemoteFailed {
                        error_code: None,
                        description: "worker timed out the task".into(),
                    });
                }
            }
        }
    }

    async fn ensure_cached(&self, frame: DataFrame, hash: u128) -> Result<()> {
        if !self.cache.exists(hash) {
            self.cache.put(frame, hash).await?;
        }
        Ok(())
    }

    async fn fetch(&self, ctx: &SessionContext, hash: u128) -> Result<DataFrame> {
        if self.cache.exists(hash) {
            return self.cache.get(ctx, hash).await;
        }
        let bytes = self
            .client
            .get(format!("{}/fetch/{:032x}", self.base_url, hash))
            .send()
            .await
            .map_err(|e| DagflowError::Other(e.into()))?
            .bytes()
            .await
            .map_err(|e| DagflowError::Other(e.into()))?;
        let tmp = tempfile::Builder::new()
            .suffix(".parquet")
            .tempfile()
            .map_err(|e| DagflowError::Other(e.into()))?;
        std::fs::write(tmp.path(), &bytes).map_err(|e| DagflowError::Other(e.into()))?;
        ctx.read_parquet(tmp.path().to_str().unwrap(), ParquetReadOptions::default())
            .await
            .map_err(|e| DagflowError::Other(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use dagflow_core::{StatusResponse, SubmitResponse};

    /// A worker stand-in that always answers `/submit` with a task id and
    /// `/status/:id` with a killed (OOM) task, mirroring what a real worker
    /// reports when DataFusion raises `ResourcesExhausted`.
    async fn spawn_killed_worker() -> String {
        async fn submit() -> Json<SubmitResponse> {
            Json(SubmitResponse { task_id: "t1".to_string() })
        }
        async fn status() -> Json<StatusResponse> {
            Json(StatusResponse {
                status: TaskState::Failed,
                error_code: Some(-1),
                error_description: Some("Resources exhausted: memory limit".to_string()),
                result_ref: None,
            })
        }
        let app = Router::new().route("/submit", post(submit)).route("/status/:id", get(status));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn oom_status_maps_to_remote_killed() {
        let base_url = spawn_killed_worker().await;
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let executor = RemoteExecutor::new(base_url, cache);
        let ctx = SessionContext::new();

        let result = executor
            .run(
                &ctx,
                &FlowId("flow-1".to_string()),
                NodeId(1),
                NodeTypeId::Filter,
                42,
                &SettingsPayload::Filter { predicate: "x > 1".into() },
                &HashMap::new(),
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(DagflowError::RemoteKilled)));
    }
}
