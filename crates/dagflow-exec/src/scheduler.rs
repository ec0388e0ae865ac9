//! Topological run scheduler. Orders a graph's nodes into levels with
//! Kahn's algorithm — each level holds every node whose dependencies already
//! ran — then drains a level through a `tokio::task::JoinSet` sized to the
//! level's width, capped by the machine's available parallelism. Grounded on
//! the per-stage `tokio::spawn` + channel pattern `rde-cli` uses to run one
//! task per pipeline operator, generalized here to one task per ready node
//! per level.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dagflow_core::edge::SlotKind;
use dagflow_core::hash::{node_data_hash, node_hash};
use dagflow_core::node_type::NodeTypeId;
use dagflow_core::settings::SettingsPayload;
use dagflow_core::{
    DagflowError, ExampleDataHandle, ExecuteLocation, ExecutionMode, FlowId, Graph, NodeId, NodeRunResult, Result,
    RunInformation, RunStatus,
};

use datafusion::dataframe::DataFrame;
use datafusion::prelude::SessionContext;

use dagflow_dataframe::{DataFusionAdapter, DataframeAdapter};

use crate::cache::FsCache;
use crate::local_executor::run_local;
use crate::node_exec::node_type_requires_remote;
use crate::remote_executor::RemoteExecutor;

/// Run-time configuration for one `Scheduler::run` call, independent of the
/// graph itself.
///
/// `mode` and `performance` are deliberately separate knobs: `mode` mirrors
/// `FlowSettings.execution_mode` (development vs. performance editing
/// context), while `performance` is the per-run override a caller can set
/// to favor cache reuse regardless of that context (e.g. a scheduled batch
/// run executed while the flow is still configured for `Development`).
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    pub mode: ExecutionMode,
    pub location: ExecuteLocation,
    pub performance: bool,
    pub reset_cache: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Development,
            location: ExecuteLocation::Auto,
            performance: false,
            reset_cache: false,
        }
    }
}

/// Whether a node with an existing cache entry still needs to run: a
/// `location` of `Local` always forces a re-run (ignoring the cache
/// entirely), a `reset_cache` run discards every cache hit, and otherwise a
/// cached node is skipped if it opted into caching or the run is in
/// performance mode.
fn needs_run(config: &RunConfig, cache_results: bool, cache_exists: bool) -> bool {
    if !cache_exists {
        return true;
    }
    if config.reset_cache {
        return true;
    }
    if matches!(config.location, ExecuteLocation::Local) {
        return true;
    }
    !(cache_results || config.performance)
}

pub struct Scheduler {
    adapter: Arc<DataFusionAdapter>,
    cache: FsCache,
    remote: Option<RemoteExecutor>,
}

struct NodeWork {
    id: NodeId,
    flow_id: FlowId,
    type_id: NodeTypeId,
    settings: SettingsPayload,
    execute_location: ExecuteLocation,
    cache_results: bool,
    streamable: bool,
    is_wide: bool,
    hash: u128,
    inputs: HashMap<SlotKind, (DataFrame, u128)>,
    main_inputs: Vec<(DataFrame, u128)>,
}

/// `(frame, skipped_cached, warnings, example_rows)` — `example_rows` is the
/// row count of the UI-preview sample taken for a locally-executed node
/// outside performance mode, `None` for a cache hit or a remote run.
type RunOneOutcome = (DataFrame, bool, Vec<String>, Option<usize>);
type TaskOutcome = (NodeId, std::result::Result<RunOneOutcome, DagflowError>, u64);

impl Scheduler {
    pub fn new(adapter: Arc<DataFusionAdapter>, cache: FsCache, remote: Option<RemoteExecutor>) -> Self {
        Self { adapter, cache, remote }
    }

    /// Kahn's algorithm with level partitioning: each returned `Vec<NodeId>`
    /// is every node whose upstream dependencies are all in a prior level (or
    /// have none), so every node within one level can run concurrently.
    fn levels(graph: &Graph) -> Result<Vec<Vec<NodeId>>> {
        let mut remaining: HashMap<NodeId, usize> = graph
            .nodes
            .keys()
            .map(|id| (*id, graph.inputs_of(*id).len()))
            .collect();
        let total = remaining.len();
        let mut done = 0usize;
        let mut levels = Vec::new();

        while done < total {
            let ready: Vec<NodeId> = remaining
                .iter()
                .filter(|(_, deg)| **deg == 0)
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                return Err(DagflowError::GraphInvalid(
                    "graph has a cycle or an unsatisfiable dependency".into(),
                ));
            }
            for id in &ready {
                remaining.remove(id);
            }
            for edge in &graph.edges {
                if ready.contains(&edge.from) {
                    if let Some(deg) = remaining.get_mut(&edge.to) {
                        *deg = deg.saturating_sub(1);
                    }
                }
            }
            done += ready.len();
            levels.push(ready);
        }
        Ok(levels)
    }

    fn compute_hash(graph: &Graph, id: NodeId) -> Result<u128> {
        let node = &graph.nodes[&id];
        let own = node_data_hash(node.type_id, &node.setting_input).map_err(DagflowError::Other)?;
        let deps: Vec<u128> = graph
            .inputs_of(id)
            .iter()
            .map(|e| graph.nodes[&e.from].cached_hash.unwrap_or(0))
            .collect();
        Ok(node_hash(own, &deps, node.template().is_multi(), graph.graph_uuid))
    }

    fn gather_work(
        graph: &Graph,
        frames: &HashMap<NodeId, (DataFrame, u128)>,
        id: NodeId,
    ) -> Result<NodeWork> {
        let node = &graph.nodes[&id];
        let mut inputs = HashMap::new();
        let mut main_inputs = Vec::new();
        for edge in graph.inputs_of(id) {
            let (frame, hash) = frames.get(&edge.from).cloned().ok_or_else(|| {
                DagflowError::GraphInvalid(format!(
                    "upstream node {} has no output frame available for node {}",
                    edge.from, id
                ))
            })?;
            if edge.slot == SlotKind::Main {
                main_inputs.push((frame.clone(), hash));
            }
            inputs.insert(edge.slot, (frame, hash));
        }
        Ok(NodeWork {
            id,
            flow_id: graph.flow_settings.flow_id.clone(),
            type_id: node.type_id,
            settings: node.setting_input.clone(),
            execute_location: node.run_settings.execute_location,
            cache_results: node.run_settings.cache_results,
            streamable: node.run_settings.streamable,
            is_wide: node.template().is_wide,
            hash: node.cached_hash.expect("hash computed before scheduling a level"),
            inputs,
            main_inputs,
        })
    }

    fn spawn(
        &self,
        join_set: &mut JoinSet<TaskOutcome>,
        work: NodeWork,
        config: RunConfig,
        cancel: CancellationToken,
    ) {
        let adapter = self.adapter.clone();
        let ctx = adapter.session_context().clone();
        let cache = self.cache.clone();
        let remote = self.remote.clone();

        join_set.spawn(async move {
            let start = Instant::now();
            let id = work.id;
            let outcome = run_one(adapter, ctx, cache, remote, work, config, cancel).await;
            (id, outcome, start.elapsed().as_millis() as u64)
        });
    }

    pub async fn run(&self, graph: &mut Graph, config: RunConfig, cancel: CancellationToken) -> Result<RunInformation> {
        if !graph.is_valid() {
            return Err(DagflowError::GraphInvalid(
                "graph has unconfigured nodes or missing connections".into(),
            ));
        }
        let levels = Self::levels(graph)?;
        let started = Instant::now();
        let parallelism = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

        let mut frames: HashMap<NodeId, (DataFrame, u128)> = HashMap::new();
        let mut results: Vec<NodeRunResult> = Vec::new();
        let mut failed: HashSet<NodeId> = HashSet::new();

        for level in levels {
            if cancel.is_cancelled() {
                for id in level {
                    if let Some(node) = graph.nodes.get_mut(&id) {
                        node.status.0 = RunStatus::Canceled;
                    }
                    results.push(canceled_result(id));
                    failed.insert(id);
                }
                continue;
            }

            for id in &level {
                let hash = Self::compute_hash(graph, *id)?;
                graph.nodes.get_mut(id).unwrap().cached_hash = Some(hash);
            }

            let runnable: Vec<NodeId> = level
                .into_iter()
                .filter(|id| {
                    let blocked = graph.inputs_of(*id).iter().any(|e| failed.contains(&e.from));
                    if blocked {
                        results.push(skipped_result(*id, "an upstream node failed"));
                        failed.insert(*id);
                    }
                    !blocked
                })
                .collect();

            let mut pending: VecDeque<NodeId> = runnable.into_iter().collect();
            let mut join_set: JoinSet<TaskOutcome> = JoinSet::new();
            let width = pending.len().min(parallelism.max(1));

            for _ in 0..width {
                if let Some(id) = pending.pop_front() {
                    let work = Self::gather_work(graph, &frames, id)?;
                    self.spawn(&mut join_set, work, config, cancel.child_token());
                }
            }

            while let Some(joined) = join_set.join_next().await {
                let (id, outcome, elapsed_ms) =
                    joined.map_err(|e| DagflowError::Other(e.into()))?;

                match outcome {
                    Ok((frame, skipped_cached, warnings, example_rows)) => {
                        let hash = graph.nodes[&id].cached_hash.unwrap();
                        frames.insert(id, (frame, hash));
                        let node = graph.nodes.get_mut(&id).unwrap();
                        node.status.0 = RunStatus::Completed;
                        if let Some(row_count) = example_rows {
                            node.example_data = Some(ExampleDataHandle { cache_hash: hash, row_count });
                        }
                        info!(node = id.0, ms = elapsed_ms, cached = skipped_cached, "node completed");
                        results.push(NodeRunResult {
                            node_id: id,
                            success: true,
                            run_time_ms: elapsed_ms,
                            error: None,
                            warnings,
                            skipped_cached,
                        });
                    }
                    Err(DagflowError::MissingInputCache(key)) => {
                        warn!(node = id.0, cache_key = %key, "missing cache entry, resetting upstream and retrying once");
                        graph.reset_from(id);
                        let hash = Self::compute_hash(graph, id)?;
                        graph.nodes.get_mut(&id).unwrap().cached_hash = Some(hash);
                        let work = Self::gather_work(graph, &frames, id)?;
                        match run_one(
                            self.adapter.clone(),
                            self.adapter.session_context().clone(),
                            self.cache.clone(),
                            self.remote.clone(),
                            work,
                            config,
                            cancel.child_token(),
                        )
                        .await
                        {
                            Ok((frame, skipped_cached, warnings, example_rows)) => {
                                frames.insert(id, (frame, hash));
                                let node = graph.nodes.get_mut(&id).unwrap();
                                node.status.0 = RunStatus::Completed;
                                if let Some(row_count) = example_rows {
                                    node.example_data = Some(ExampleDataHandle { cache_hash: hash, row_count });
                                }
                                results.push(NodeRunResult {
                                    node_id: id,
                                    success: true,
                                    run_time_ms: elapsed_ms,
                                    error: None,
                                    warnings,
                                    skipped_cached,
                                });
                            }
                            Err(e) => {
                                failed.insert(id);
                                record_failure(graph, id, &e, &mut results, elapsed_ms);
                            }
                        }
                    }
                    Err(e) => {
                        failed.insert(id);
                        record_failure(graph, id, &e, &mut results, elapsed_ms);
                    }
                }

                if let Some(id) = pending.pop_front() {
                    let work = Self::gather_work(graph, &frames, id)?;
                    self.spawn(&mut join_set, work, config, cancel.child_token());
                }
            }
        }

        Ok(RunInformation::from_node_results(results, started.elapsed().as_millis() as u64))
    }
}

fn record_failure(
    graph: &mut Graph,
    id: NodeId,
    error: &DagflowError,
    results: &mut Vec<NodeRunResult>,
    elapsed_ms: u64,
) {
    if let Some(node) = graph.nodes.get_mut(&id) {
        node.status.0 = RunStatus::Error;
        node.results.errors.push(error.to_string());
    }
    results.push(NodeRunResult {
        node_id: id,
        success: false,
        run_time_ms: elapsed_ms,
        error: Some(error.to_string()),
        warnings: Vec::new(),
        skipped_cached: false,
    });
}

fn canceled_result(id: NodeId) -> NodeRunResult {
    NodeRunResult {
        node_id: id,
        success: false,
        run_time_ms: 0,
        error: Some("run canceled".into()),
        warnings: Vec::new(),
        skipped_cached: false,
    }
}

fn skipped_result(id: NodeId, reason: &str) -> NodeRunResult {
    NodeRunResult {
        node_id: id,
        success: false,
        run_time_ms: 0,
        error: Some(reason.to_string()),
        warnings: Vec::new(),
        skipped_cached: false,
    }
}

async fn run_one(
    adapter: Arc<DataFusionAdapter>,
    ctx: SessionContext,
    cache: FsCache,
    remote: Option<RemoteExecutor>,
    work: NodeWork,
    config: RunConfig,
    cancel: CancellationToken,
) -> std::result::Result<RunOneOutcome, DagflowError> {
    if cancel.is_cancelled() {
        return Err(DagflowError::Canceled);
    }

    let cache_exists = cache.exists(work.hash);
    if !needs_run(&config, work.cache_results, cache_exists) {
        let frame = cache.get(&ctx, work.hash).await?;
        return Ok((frame, true, Vec::new(), None));
    }

    let must_remote = node_type_requires_remote(work.type_id);
    let use_remote = must_remote
        || matches!(work.execute_location, ExecuteLocation::Remote)
        || matches!(config.location, ExecuteLocation::Remote)
        || work.is_wide
        || work.cache_results;

    let mut warnings = Vec::new();
    let mut example_rows = None;
    let frame = if use_remote {
        let remote = remote.ok_or_else(|| DagflowError::ExecutionFailed {
            node: work.id,
            message: format!(
                "{:?} requires remote execution but no worker endpoint is configured",
                work.type_id
            ),
        })?;
        match remote
            .run(
                &ctx,
                &work.flow_id,
                work.id,
                work.type_id,
                work.hash,
                &work.settings,
                &work.inputs,
                &work.main_inputs,
                &cancel,
            )
            .await
        {
            Ok(frame) => frame,
            Err(DagflowError::RemoteKilled) if !must_remote => {
                warn!(node = work.id.0, "remote worker ran out of memory, falling back to local execution");
                warnings.push("remote execution hit a memory limit; fell back to local execution".to_string());
                let outcome = run_local_plain(ctx.clone(), adapter.clone(), &work, config.performance).await?;
                warnings.extend(outcome.warnings);
                example_rows = outcome.example_rows;
                outcome.frame
            }
            Err(e) => return Err(e),
        }
    } else {
        let outcome = run_local_plain(ctx.clone(), adapter.clone(), &work, config.performance).await?;
        warnings.extend(outcome.warnings);
        example_rows = outcome.example_rows;
        outcome.frame
    };

    if work.cache_results {
        cache.put(frame.clone(), work.hash).await?;
    }
    Ok((frame, false, warnings, example_rows))
}

async fn run_local_plain(
    ctx: SessionContext,
    adapter: Arc<DataFusionAdapter>,
    work: &NodeWork,
    performance: bool,
) -> Result<crate::local_executor::LocalRunOutcome> {
    let inputs: HashMap<SlotKind, DataFrame> =
        work.inputs.iter().map(|(slot, (frame, _))| (*slot, frame.clone())).collect();
    let main_inputs: Vec<DataFrame> = work.main_inputs.iter().map(|(f, _)| f.clone()).collect();
    run_local(
        ctx,
        adapter,
        work.id,
        work.type_id,
        &work.settings,
        &inputs,
        &main_inputs,
        work.streamable,
        performance,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_core::{FlowSettings, Graph};

    fn graph_with_two_independent_sources() -> Graph {
        let mut g = Graph::new(FlowSettings::new("flow-1", "test"));
        let a = g.add_node_promise(NodeTypeId::ManualInput);
        g.commit_settings(a, SettingsPayload::ManualInput { raw_data: vec![] }).unwrap();
        let b = g.add_node_promise(NodeTypeId::ManualInput);
        g.commit_settings(b, SettingsPayload::ManualInput { raw_data: vec![] }).unwrap();
        g
    }

    #[test]
    fn independent_sources_land_in_one_level() {
        let g = graph_with_two_independent_sources();
        let levels = Scheduler::levels(&g).unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].len(), 2);
    }

    /// A worker stand-in that always reports its task killed (OOM), so a
    /// `must_remote == false` node routed there has to fall back locally.
    async fn spawn_killed_worker() -> String {
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use dagflow_core::{StatusResponse, SubmitResponse, TaskState};

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
    async fn remote_oom_falls_back_to_local_and_records_a_warning() {
        let base_url = spawn_killed_worker().await;
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let remote = RemoteExecutor::new(base_url, cache.clone());
        let adapter = Arc::new(DataFusionAdapter::new());
        let scheduler = Scheduler::new(adapter, cache, Some(remote));

        let mut g = Graph::new(FlowSettings::new("flow-1", "test"));
        let a = g.add_node_promise(NodeTypeId::ManualInput);
        g.commit_settings(a, SettingsPayload::ManualInput { raw_data: vec![] }).unwrap();
        let b = g.add_node_promise(NodeTypeId::Filter);
        g.add_edge(a, b, SlotKind::Main).unwrap();
        g.commit_settings(b, SettingsPayload::Filter { predicate: "true".into() }).unwrap();
        g.nodes.get_mut(&b).unwrap().run_settings.execute_location = ExecuteLocation::Remote;

        let info = scheduler.run(&mut g, RunConfig::default(), CancellationToken::new()).await.unwrap();

        assert!(info.success, "run should succeed after falling back locally: {info:?}");
        let filtered = info.nodes.iter().find(|r| r.node_id == b).unwrap();
        assert!(filtered.success);
        assert!(filtered.warnings.iter().any(|w| w.contains("memory limit")));
    }

    #[test]
    fn chained_nodes_land_in_separate_levels() {
        let mut g = Graph::new(FlowSettings::new("flow-1", "test"));
        let a = g.add_node_promise(NodeTypeId::ManualInput);
        g.commit_settings(a, SettingsPayload::ManualInput { raw_data: vec![] }).unwrap();
        let b = g.add_node_promise(NodeTypeId::Filter);
        g.add_edge(a, b, SlotKind::Main).unwrap();
        g.commit_settings(b, SettingsPayload::Filter { predicate: "x > 1".into() }).unwrap();

        let levels = Scheduler::levels(&g).unwrap();
        assert_eq!(levels, vec![vec![a], vec![b]]);
    }
}
