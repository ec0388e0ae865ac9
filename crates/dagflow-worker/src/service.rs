//! Axum router implementing the worker HTTP protocol: submit a task, poll
//! its status, cancel it, fetch a cached result by content key. Each task
//! runs in a background tokio task; task state lives in an in-process,
//! mutex-guarded table — the same pattern `dagflow-artifacts`'s
//! `ArtifactStore` uses for its own row index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use dagflow_core::edge::SlotKind;
use dagflow_core::node_type::NodeTypeId;
use dagflow_core::DagflowError;
use dagflow_dataframe::{DataFusionAdapter, DataframeAdapter};
use dagflow_exec::node_exec::execute_node;
use dagflow_exec::FsCache;

use crate::protocol::{NodeRecipe, Operation, StatusResponse, SubmitRequest, SubmitResponse, TaskState};

struct TaskRecord {
    state: TaskState,
    error_code: Option<i64>,
    error_description: Option<String>,
    result_ref: Option<String>,
    cancel: CancellationToken,
}

impl TaskRecord {
    fn queued(cancel: CancellationToken) -> Self {
        Self { state: TaskState::Queued, error_code: None, error_description: None, result_ref: None, cancel }
    }
}

pub struct WorkerState {
    adapter: Arc<DataFusionAdapter>,
    cache: FsCache,
    tasks: Mutex<HashMap<String, TaskRecord>>,
}

impl WorkerState {
    pub fn new(adapter: Arc<DataFusionAdapter>, cache: FsCache) -> Self {
        Self { adapter, cache, tasks: Mutex::new(HashMap::new()) }
    }
}

pub fn router(state: Arc<WorkerState>) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .route("/status/:task_id", get(status))
        .route("/cancel/:task_id", post(cancel))
        .route("/fetch/:cache_key", get(fetch))
        .with_state(state)
}

fn slot_from_tag(tag: &str) -> Option<SlotKind> {
    match tag {
        "Main" => Some(SlotKind::Main),
        "Left" => Some(SlotKind::Left),
        "Right" => Some(SlotKind::Right),
        _ => None,
    }
}

async fn submit(State(state): State<Arc<WorkerState>>, Json(req): Json<SubmitRequest>) -> impl IntoResponse {
    let task_id = Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    state
        .tasks
        .lock()
        .expect("worker task table poisoned")
        .insert(task_id.clone(), TaskRecord::queued(cancel.clone()));

    info!(task_id = %task_id, flow_id = %req.flow_id, node = req.node_id.0, "task submitted");
    let state = state.clone();
    let spawned_id = task_id.clone();
    tokio::spawn(async move {
        run_task(state, spawned_id, req, cancel).await;
    });

    (StatusCode::OK, Json(SubmitResponse { task_id }))
}

async fn run_task(state: Arc<WorkerState>, task_id: String, req: SubmitRequest, cancel: CancellationToken) {
    {
        let mut tasks = state.tasks.lock().expect("worker task table poisoned");
        if let Some(record) = tasks.get_mut(&task_id) {
            record.state = TaskState::Running;
        }
    }

    let outcome = execute(&state, &req, &cancel).await;

    let mut tasks = state.tasks.lock().expect("worker task table poisoned");
    let Some(record) = tasks.get_mut(&task_id) else { return };
    if record.state == TaskState::Canceled {
        return;
    }
    match outcome {
        Ok(result_ref) => {
            record.state = TaskState::Completed;
            record.result_ref = Some(result_ref);
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "task failed");
            record.error_code = oom_error_code(&e);
            record.error_description = Some(e.to_string());
            record.state = TaskState::Failed;
        }
    }
}

/// DataFusion reports a configured memory-pool limit being exceeded as
/// `ResourcesExhausted`, whose `Display` text starts with "Resources
/// exhausted". This build's session has no pool limit configured by
/// default, so the mapping exists without yet having a trigger — a real
/// deployment would set one via the worker binary's memory-limit option.
fn oom_error_code(e: &DagflowError) -> Option<i64> {
    if e.to_string().contains("Resources exhausted") {
        Some(-1)
    } else {
        None
    }
}

async fn execute(
    state: &Arc<WorkerState>,
    req: &SubmitRequest,
    cancel: &CancellationToken,
) -> dagflow_core::Result<String> {
    let recipe: NodeRecipe = serde_json::from_slice(&req.plan_bytes).map_err(|e| DagflowError::Other(e.into()))?;
    let type_id = NodeTypeId::from_tag(&recipe.node_type)
        .ok_or_else(|| DagflowError::GraphInvalid(format!("unknown node type tag: {}", recipe.node_type)))?;

    let ctx = state.adapter.session_context().clone();
    let mut inputs = HashMap::new();
    for (slot_tag, key) in &recipe.input_cache_keys {
        let slot = slot_from_tag(slot_tag)
            .ok_or_else(|| DagflowError::GraphInvalid(format!("unknown input slot tag: {slot_tag}")))?;
        let hash = u128::from_str_radix(key, 16).map_err(|e| DagflowError::Other(e.into()))?;
        inputs.insert(slot, state.cache.get(&ctx, hash).await?);
    }
    let mut main_inputs = Vec::new();
    for key in &recipe.main_input_cache_keys {
        let hash = u128::from_str_radix(key, 16).map_err(|e| DagflowError::Other(e.into()))?;
        main_inputs.push(state.cache.get(&ctx, hash).await?);
    }

    if cancel.is_cancelled() {
        return Err(DagflowError::Canceled);
    }

    let frame = if type_id == NodeTypeId::PythonScript {
        crate::python_exec::execute_python_script(&state.adapter, req.node_id, &recipe.settings, &main_inputs).await?
    } else {
        execute_node(ctx.clone(), state.adapter.clone(), type_id, &recipe.settings, &inputs, &main_inputs).await?
    };

    match &req.operation {
        Operation::ComputeAndCache => {
            let hash = u128::from_str_radix(&req.cache_key, 16).map_err(|e| DagflowError::Other(e.into()))?;
            state.cache.put(frame, hash).await?;
            Ok(req.cache_key.clone())
        }
        Operation::RowCount => {
            let batches = state.adapter.collect(frame).await?;
            let count: usize = batches.iter().map(|b| b.num_rows()).sum();
            Ok(count.to_string())
        }
        Operation::Sample { n } => {
            let batches = state.adapter.sample_top_n(frame, *n).await?;
            let sampled = read_batches(&ctx, batches)?;
            let sample_hash = sample_cache_key(&req.cache_key, *n);
            state.cache.put(sampled, sample_hash).await?;
            Ok(format!("{sample_hash:032x}"))
        }
    }
}

fn read_batches(
    ctx: &datafusion::prelude::SessionContext,
    batches: Vec<datafusion::arrow::record_batch::RecordBatch>,
) -> dagflow_core::Result<datafusion::dataframe::DataFrame> {
    if batches.is_empty() {
        return Err(DagflowError::Other(anyhow::anyhow!("sample produced no batches to cache")));
    }
    let schema = batches[0].schema();
    let merged =
        datafusion::arrow::compute::concat_batches(&schema, batches.iter()).map_err(|e| DagflowError::Other(e.into()))?;
    ctx.read_batch(merged).map_err(|e| DagflowError::Other(e.into()))
}

/// Samples get their own cache slot distinct from the node's full-result
/// key so a later `compute_and_cache` for the same node doesn't collide
/// with an earlier sample.
fn sample_cache_key(cache_key: &str, n: usize) -> u128 {
    let base = u128::from_str_radix(cache_key, 16).unwrap_or(0);
    base ^ (n as u128).wrapping_mul(0x9E3779B97F4A7C15)
}

async fn status(State(state): State<Arc<WorkerState>>, Path(task_id): Path<String>) -> impl IntoResponse {
    let tasks = state.tasks.lock().expect("worker task table poisoned");
    match tasks.get(&task_id) {
        Some(record) => (
            StatusCode::OK,
            Json(StatusResponse {
                status: record.state,
                error_code: record.error_code,
                error_description: record.error_description.clone(),
                result_ref: record.result_ref.clone(),
            }),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn cancel(State(state): State<Arc<WorkerState>>, Path(task_id): Path<String>) -> impl IntoResponse {
    let mut tasks = state.tasks.lock().expect("worker task table poisoned");
    match tasks.get_mut(&task_id) {
        Some(record) => {
            record.cancel.cancel();
            if !matches!(record.state, TaskState::Completed | TaskState::Failed) {
                record.state = TaskState::Canceled;
            }
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn fetch(State(state): State<Arc<WorkerState>>, Path(cache_key): Path<String>) -> impl IntoResponse {
    let hash = match u128::from_str_radix(&cache_key, 16) {
        Ok(h) => h,
        Err(_) => return (StatusCode::BAD_REQUEST, "cache_key is not valid hex").into_response(),
    };
    match tokio::fs::read(state.cache.path_for(hash)).await {
        Ok(bytes) => (StatusCode::OK, Bytes::from(bytes)).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use dagflow_core::settings::SettingsPayload;
    use dagflow_core::{FlowId, NodeId};
    use tower::ServiceExt;

    async fn state_with_cached_input(hash: u128) -> (Arc<WorkerState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(DataFusionAdapter::new());
        let cache = FsCache::new(dir.path());
        let state = Arc::new(WorkerState::new(adapter.clone(), cache.clone()));

        let ctx = adapter.session_context().clone();
        let schema = datafusion::arrow::datatypes::Schema::new(vec![datafusion::arrow::datatypes::Field::new(
            "x",
            datafusion::arrow::datatypes::DataType::Int64,
            false,
        )]);
        let batch = datafusion::arrow::record_batch::RecordBatch::try_new(
            std::sync::Arc::new(schema),
            vec![std::sync::Arc::new(datafusion::arrow::array::Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();
        let frame = ctx.read_batch(batch).unwrap();
        cache.put(frame, hash).await.unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn submit_then_poll_row_count_reaches_completed() {
        let (state, _dir) = state_with_cached_input(0xAAA).await;
        let app = router(state);

        let req = SubmitRequest {
            operation: Operation::RowCount,
            cache_key: "bbb".into(),
            plan_bytes: serde_json::to_vec(&NodeRecipe {
                node_type: NodeTypeId::Sort.tag().to_string(),
                settings: SettingsPayload::Sort { by: vec!["x".into()], descending: vec![false] },
                input_cache_keys: HashMap::from([("Main".to_string(), format!("{:032x}", 0xAAAu128))]),
                main_input_cache_keys: Vec::new(),
            })
            .unwrap(),
            flow_id: FlowId("flow-1".into()),
            node_id: NodeId(1),
        };

        let response = app
            .clone()
            .oneshot(Request::builder().method("POST").uri("/submit").header("content-type", "application/json").body(Body::from(serde_json::to_vec(&req).unwrap())).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let submitted: SubmitResponse = serde_json::from_slice(&body).unwrap();

        let mut final_status = None;
        for _ in 0..50 {
            let resp = app
                .clone()
                .oneshot(Request::builder().method("GET").uri(format!("/status/{}", submitted.task_id)).body(Body::empty()).unwrap())
                .await
                .unwrap();
            let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let status: StatusResponse = serde_json::from_slice(&body).unwrap();
            if status.status.is_terminal() {
                final_status = Some(status);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let status = final_status.expect("task never reached a terminal state");
        assert_eq!(status.status, TaskState::Completed);
        assert_eq!(status.result_ref.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn unknown_task_status_is_404() {
        let (state, _dir) = state_with_cached_input(1).await;
        let app = router(state);
        let resp = app
            .oneshot(Request::builder().method("GET").uri("/status/does-not-exist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
