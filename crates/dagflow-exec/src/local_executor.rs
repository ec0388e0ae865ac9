//! Local execution of one node's transform. Wraps `node_exec::execute_node`
//! with the policy decisions that belong at the executor layer rather than
//! the per-node-type dispatch: a `streamable` node's plan is left lazy (a
//! non-streamable one is collected eagerly here so a broken plan fails in
//! this node rather than downstream), a zero-row probe on a streaming plan
//! falls back to a fully materialized one when the input wasn't actually
//! empty, and — outside performance mode — a capped top-N sample is taken
//! for UI preview.

use std::collections::HashMap;
use std::sync::Arc;

use datafusion::dataframe::DataFrame;
use datafusion::prelude::SessionContext;
use tracing::{debug, warn};

use dagflow_core::edge::SlotKind;
use dagflow_core::node_type::NodeTypeId;
use dagflow_core::settings::SettingsPayload;
use dagflow_core::{DagflowError, NodeId, Result};

use dagflow_dataframe::{DataFusionAdapter, DataframeAdapter};

use crate::node_exec::execute_node;

/// Cap on the UI-preview sample taken after a non-performance-mode run.
pub const EXAMPLE_SAMPLE_ROWS: usize = 1000;

pub struct LocalRunOutcome {
    pub frame: DataFrame,
    /// Row count of the UI-preview sample taken, if the run wasn't in
    /// performance mode.
    pub example_rows: Option<usize>,
    pub warnings: Vec<String>,
}

async fn has_rows(adapter: &DataFusionAdapter, frame: DataFrame) -> Result<bool> {
    let probe = adapter.sample_top_n(frame, 1).await?;
    Ok(probe.iter().map(|b| b.num_rows()).sum::<usize>() > 0)
}

fn batches_to_frame(
    ctx: &SessionContext,
    batches: Vec<datafusion::arrow::record_batch::RecordBatch>,
) -> Result<DataFrame> {
    if batches.is_empty() {
        return Err(DagflowError::Other(anyhow::anyhow!("collected plan produced no batches")));
    }
    let schema = batches[0].schema();
    let merged = datafusion::arrow::compute::concat_batches(&schema, batches.iter())
        .map_err(|e| DagflowError::Other(e.into()))?;
    ctx.read_batch(merged).map_err(|e| DagflowError::Other(e.into()))
}

pub async fn run_local(
    ctx: SessionContext,
    adapter: Arc<DataFusionAdapter>,
    node_id: NodeId,
    type_id: NodeTypeId,
    settings: &SettingsPayload,
    inputs: &HashMap<SlotKind, DataFrame>,
    main_inputs: &[DataFrame],
    streamable: bool,
    performance: bool,
) -> Result<LocalRunOutcome> {
    let frame = execute_node(ctx.clone(), adapter.clone(), type_id, settings, inputs, main_inputs).await?;
    let mut warnings = Vec::new();

    let frame = if streamable {
        let output_has_rows = has_rows(&adapter, frame.clone()).await?;
        let input_has_rows = if main_inputs.is_empty() {
            true
        } else {
            let mut any = false;
            for input in main_inputs {
                if has_rows(&adapter, input.clone()).await? {
                    any = true;
                    break;
                }
            }
            any
        };
        if !output_has_rows && input_has_rows {
            warn!(node = node_id.0, "streaming plan produced zero rows on non-empty input; falling back to a collected plan");
            warnings.push(
                "streaming execution produced no rows on non-empty input; fell back to a fully materialized plan"
                    .to_string(),
            );
            let batches = adapter.collect(frame).await?;
            batches_to_frame(&ctx, batches)?
        } else {
            frame
        }
    } else {
        let batches = adapter.collect(frame.clone()).await?;
        debug!(node = node_id.0, rows = batches.iter().map(|b| b.num_rows()).sum::<usize>(), "materialized non-streaming node");
        frame
    };

    let example_rows = if performance {
        None
    } else {
        let sample = adapter.sample_top_n(frame.clone(), EXAMPLE_SAMPLE_ROWS).await?;
        Some(sample.iter().map(|b| b.num_rows()).sum::<usize>())
    };

    Ok(LocalRunOutcome { frame, example_rows, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_core::{DType, SchemaField};

    #[tokio::test]
    async fn performance_mode_skips_example_sample() {
        let ctx = SessionContext::new();
        let adapter = Arc::new(DataFusionAdapter::new());
        let settings = SettingsPayload::ManualInput { raw_data: vec![] };
        let outcome = run_local(
            ctx,
            adapter,
            NodeId(1),
            NodeTypeId::ManualInput,
            &settings,
            &HashMap::new(),
            &[],
            true,
            true,
        )
        .await
        .unwrap();
        assert!(outcome.example_rows.is_none());
    }

    #[tokio::test]
    async fn non_performance_mode_takes_example_sample() {
        let ctx = SessionContext::new();
        let adapter = Arc::new(DataFusionAdapter::new());
        let settings = SettingsPayload::ManualInput { raw_data: vec![] };
        let outcome = run_local(
            ctx,
            adapter,
            NodeId(1),
            NodeTypeId::ManualInput,
            &settings,
            &HashMap::new(),
            &[],
            true,
            false,
        )
        .await
        .unwrap();
        assert_eq!(outcome.example_rows, Some(0));
    }

    #[tokio::test]
    async fn non_streamable_node_is_collected_eagerly() {
        let ctx = SessionContext::new();
        let adapter = Arc::new(DataFusionAdapter::new());
        let settings = SettingsPayload::ManualInput { raw_data: vec![] };
        let outcome = run_local(
            ctx,
            adapter,
            NodeId(1),
            NodeTypeId::ManualInput,
            &settings,
            &HashMap::new(),
            &[],
            false,
            true,
        )
        .await
        .unwrap();
        assert!(outcome.warnings.is_empty());
    }

    #[allow(dead_code)]
    fn unused_schema_field_import() -> (DType, SchemaField) {
        (DType::Int64, SchemaField::new("x", DType::Int64))
    }
}
