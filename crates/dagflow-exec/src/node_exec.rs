//! Per-node-type transform execution against the Dataframe Adapter. Every
//! node type maps to either a direct `DataFrame` builder call (narrow,
//! single-input shapes) or a SQL string run through the adapter's
//! `SessionContext` (the approach `rde-tx`'s `SqlTransform` already uses
//! for ad hoc queries) — SQL is reached for once the equivalent builder
//! chain would be more convoluted than the query it replaces: group/pivot/
//! unpivot/join/fuzzy-match/text-to-rows.
//!
//! `polars_code` and `python_script` nodes have no local implementation:
//! this engine has no embedded Python or Polars runtime, so those two node
//! types are always routed to the remote worker regardless of a graph's
//! execution-location setting.

use std::collections::HashMap;
use std::sync::Arc;

use dagflow_core::edge::SlotKind;
use dagflow_core::node_type::NodeTypeId;
use dagflow_core::settings::{AggFn, JoinHow, SettingsPayload};
use dagflow_core::{DagflowError, Result};
use datafusion::arrow::array::{Array, Int64Array, StringArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::dataframe::DataFrame;
use datafusion::logical_expr::col;
use datafusion::prelude::SessionContext;

use dagflow_dataframe::descriptor::{SinkDescriptor, SourceDescriptor};
use dagflow_dataframe::{DataFusionAdapter, DataframeAdapter};

pub fn node_type_requires_remote(type_id: NodeTypeId) -> bool {
    matches!(type_id, NodeTypeId::PolarsCode | NodeTypeId::PythonScript)
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn sql_literal_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn agg_sql(agg: &AggFn, column: &str) -> String {
    let col = quote(column);
    match agg {
        AggFn::Sum => format!("SUM({col})"),
        AggFn::Mean => format!("AVG({col})"),
        AggFn::Min => format!("MIN({col})"),
        AggFn::Max => format!("MAX({col})"),
        AggFn::Count => format!("COUNT({col})"),
        AggFn::First => format!("FIRST_VALUE({col})"),
        AggFn::Last => format!("LAST_VALUE({col})"),
    }
}

/// Execute one node's transform. `inputs` holds one `DataFrame` per
/// connected slot; multi-input (`union`, `polars_code` as a merge point,
/// `python_script`, `graph_solver`) node types may see several `Main`
/// entries keyed positionally via `main_inputs`.
pub async fn execute_node(
    ctx: SessionContext,
    adapter: Arc<DataFusionAdapter>,
    type_id: NodeTypeId,
    settings: &SettingsPayload,
    inputs: &HashMap<SlotKind, DataFrame>,
    main_inputs: &[DataFrame],
) -> Result<DataFrame> {
    let ctx = &ctx;
    let adapter = adapter.as_ref();
    if node_type_requires_remote(type_id) {
        return Err(DagflowError::ExecutionFailed {
            node: dagflow_core::NodeId(0),
            message: format!(
                "{:?} has no local runtime; must be executed by a remote worker",
                type_id
            ),
        });
    }

    match (type_id, settings) {
        (NodeTypeId::ManualInput, SettingsPayload::ManualInput { raw_data }) => {
            manual_input_frame(ctx, raw_data)
        }
        (NodeTypeId::Read, SettingsPayload::Read { source, format }) => {
            let descriptor = source_descriptor(source, format)?;
            adapter.lazy_read(&descriptor).await
        }
        (NodeTypeId::ExternalSource, SettingsPayload::ExternalSource { descriptor }) => {
            let parsed: SourceDescriptor = serde_json::from_str(descriptor)
                .map_err(|e| DagflowError::Other(e.into()))?;
            adapter.lazy_read(&parsed).await
        }
        (NodeTypeId::Output, SettingsPayload::Output { sink, format, write_mode }) => {
            let frame = main_input(inputs)?;
            let descriptor = sink_descriptor(sink, format, *write_mode)?;
            adapter.write(frame.clone(), &descriptor).await?;
            Ok(frame.clone())
        }
        (NodeTypeId::Select, SettingsPayload::Select { select }) => {
            let frame = main_input(inputs)?;
            let exprs: Vec<_> = select
                .iter()
                .filter(|s| s.keep)
                .map(|s| col(&s.old_name).alias(&s.new_name))
                .collect();
            frame.clone().select(exprs).map_err(df_err)
        }
        (NodeTypeId::Filter, SettingsPayload::Filter { predicate }) => {
            let frame = main_input(inputs)?;
            sql_over(ctx, "view_main", frame, &format!("SELECT * FROM view_main WHERE {predicate}")).await
        }
        (NodeTypeId::Formula, SettingsPayload::Formula { output_column, expression }) => {
            let frame = main_input(inputs)?;
            let query = format!(
                "SELECT *, {expression} AS {} FROM view_main",
                quote(output_column)
            );
            sql_over(ctx, "view_main", frame, &query).await
        }
        (NodeTypeId::Sort, SettingsPayload::Sort { by, descending }) => {
            let frame = main_input(inputs)?;
            let order: Vec<String> = by
                .iter()
                .zip(descending.iter().chain(std::iter::repeat(&false)))
                .map(|(c, desc)| format!("{} {}", quote(c), if *desc { "DESC" } else { "ASC" }))
                .collect();
            let query = format!("SELECT * FROM view_main ORDER BY {}", order.join(", "));
            sql_over(ctx, "view_main", frame, &query).await
        }
        (NodeTypeId::Sample, SettingsPayload::Sample { n }) => {
            let frame = main_input(inputs)?;
            frame.clone().limit(0, Some(*n)).map_err(df_err)
        }
        (NodeTypeId::Unique, SettingsPayload::Unique { subset }) => {
            let frame = main_input(inputs)?;
            let query = if subset.is_empty() {
                "SELECT DISTINCT * FROM view_main".to_string()
            } else {
                format!(
                    "SELECT DISTINCT {} FROM view_main",
                    subset.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
                )
            };
            sql_over(ctx, "view_main", frame, &query).await
        }
        (NodeTypeId::RecordId, SettingsPayload::RecordId { output_column }) => {
            let frame = main_input(inputs)?;
            let query = format!(
                "SELECT *, ROW_NUMBER() OVER () AS {} FROM view_main",
                quote(output_column)
            );
            sql_over(ctx, "view_main", frame, &query).await
        }
        (NodeTypeId::RecordCount, SettingsPayload::RecordCount { output_column }) => {
            let frame = main_input(inputs)?;
            let query = format!("SELECT COUNT(*) AS {} FROM view_main", quote(output_column));
            sql_over(ctx, "view_main", frame, &query).await
        }
        (NodeTypeId::GroupBy, SettingsPayload::GroupBy { group_by, aggregations }) => {
            let frame = main_input(inputs)?;
            let group_cols: Vec<String> = group_by.iter().map(|c| quote(c)).collect();
            let agg_exprs: Vec<String> = aggregations
                .iter()
                .map(|a| format!("{} AS {}", agg_sql(&a.agg, &a.column), quote(&a.output_name)))
                .collect();
            let mut select_list = group_cols.clone();
            select_list.extend(agg_exprs);
            let query = format!(
                "SELECT {} FROM view_main{}",
                select_list.join(", "),
                if group_cols.is_empty() {
                    String::new()
                } else {
                    format!(" GROUP BY {}", group_cols.join(", "))
                }
            );
            sql_over(ctx, "view_main", frame, &query).await
        }
        (NodeTypeId::Unpivot, SettingsPayload::Unpivot { index, value_columns }) => {
            let frame = main_input(inputs)?;
            let index_cols = index.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
            let branches: Vec<String> = value_columns
                .iter()
                .map(|vc| {
                    format!(
                        "SELECT {index_cols}, {} AS key, {} AS value FROM view_main",
                        sql_literal_str(vc),
                        quote(vc)
                    )
                })
                .collect();
            let query = branches.join(" UNION ALL ");
            sql_over(ctx, "view_main", frame, &query).await
        }
        (NodeTypeId::Pivot, SettingsPayload::Pivot { index, pivot_column, value_column, agg }) => {
            let frame = main_input(inputs)?;
            pivot(ctx, frame, index, pivot_column, value_column, agg).await
        }
        (NodeTypeId::Join, SettingsPayload::Join { left_select, right_select, join_mapping, how }) => {
            let left = inputs
                .get(&SlotKind::Left)
                .ok_or_else(|| DagflowError::GraphInvalid("join missing left input".into()))?;
            let right = inputs
                .get(&SlotKind::Right)
                .ok_or_else(|| DagflowError::GraphInvalid("join missing right input".into()))?;
            let join_sql = join_how_sql(how);
            let on: Vec<String> = join_mapping
                .iter()
                .map(|m| format!("l.{} = r.{}", quote(&m.left_col), quote(&m.right_col)))
                .collect();
            let select = join_select_list(left_select, right_select);
            let query = format!(
                "SELECT {select} FROM view_left l {join_sql} JOIN view_right r ON {}",
                on.join(" AND ")
            );
            sql_over2(ctx, left, right, &query).await
        }
        (NodeTypeId::CrossJoin, SettingsPayload::CrossJoin { left_select, right_select }) => {
            let left = inputs
                .get(&SlotKind::Left)
                .ok_or_else(|| DagflowError::GraphInvalid("cross_join missing left input".into()))?;
            let right = inputs
                .get(&SlotKind::Right)
                .ok_or_else(|| DagflowError::GraphInvalid("cross_join missing right input".into()))?;
            let select = join_select_list(left_select, right_select);
            let query = format!("SELECT {select} FROM view_left l CROSS JOIN view_right r");
            sql_over2(ctx, left, right, &query).await
        }
        (NodeTypeId::FuzzyMatch, SettingsPayload::FuzzyMatch { left_select, right_select, mapping }) => {
            let left = inputs
                .get(&SlotKind::Left)
                .ok_or_else(|| DagflowError::GraphInvalid("fuzzy_match missing left input".into()))?;
            let right = inputs
                .get(&SlotKind::Right)
                .ok_or_else(|| DagflowError::GraphInvalid("fuzzy_match missing right input".into()))?;
            let select = join_select_list(left_select, right_select);
            let conditions: Vec<String> = mapping
                .iter()
                .map(|m| {
                    let threshold = m.threshold_score as f64 / 100.0;
                    format!(
                        "(1.0 - levenshtein(l.{lc}, r.{rc})::double / greatest(length(l.{lc}), length(r.{rc}))) >= {threshold}",
                        lc = quote(&m.left_col),
                        rc = quote(&m.right_col),
                    )
                })
                .collect();
            let query = format!(
                "SELECT {select} FROM view_left l CROSS JOIN view_right r WHERE {}",
                conditions.join(" AND ")
            );
            sql_over2(ctx, left, right, &query).await
        }
        (NodeTypeId::TextToRows, SettingsPayload::TextToRows { column, delimiter }) => {
            let frame = main_input(inputs)?;
            let query = format!(
                "SELECT * REPLACE (UNNEST(string_to_array({col}, {delim})) AS {col}) FROM view_main",
                col = quote(column),
                delim = sql_literal_str(delimiter),
            );
            sql_over(ctx, "view_main", frame, &query).await
        }
        (NodeTypeId::Union, SettingsPayload::Union {}) => union_all(ctx, main_inputs).await,
        (NodeTypeId::ExploreData, SettingsPayload::ExploreData {}) => Ok(main_input(inputs)?.clone()),
        (NodeTypeId::GraphSolver, SettingsPayload::GraphSolver { from_column, to_column, output_column }) => {
            graph_solver(ctx, adapter, main_inputs, from_column, to_column, output_column).await
        }
        _ => Err(DagflowError::SettingsInvalid {
            node: dagflow_core::NodeId(0),
            message: format!("settings payload does not match node type {:?}", type_id),
        }),
    }
}

fn df_err(e: datafusion::error::DataFusionError) -> DagflowError {
    DagflowError::Other(e.into())
}

fn main_input(inputs: &HashMap<SlotKind, DataFrame>) -> Result<&DataFrame> {
    inputs
        .get(&SlotKind::Main)
        .ok_or_else(|| DagflowError::GraphInvalid("node has no main input connected".into()))
}

async fn sql_over(ctx: &SessionContext, view: &str, frame: &DataFrame, query: &str) -> Result<DataFrame> {
    ctx.register_table(view, frame.clone().into_view())
        .map_err(df_err)?;
    let result = ctx.sql(query).await.map_err(df_err);
    ctx.deregister_table(view).map_err(df_err)?;
    result
}

async fn sql_over2(
    ctx: &SessionContext,
    left: &DataFrame,
    right: &DataFrame,
    query: &str,
) -> Result<DataFrame> {
    ctx.register_table("view_left", left.clone().into_view())
        .map_err(df_err)?;
    ctx.register_table("view_right", right.clone().into_view())
        .map_err(df_err)?;
    let result = ctx.sql(query).await.map_err(df_err);
    ctx.deregister_table("view_left").map_err(df_err)?;
    ctx.deregister_table("view_right").map_err(df_err)?;
    result
}

fn join_how_sql(how: &JoinHow) -> &'static str {
    match how {
        JoinHow::Inner => "INNER",
        JoinHow::Left => "LEFT",
        JoinHow::Right => "RIGHT",
        JoinHow::Outer => "FULL OUTER",
    }
}

fn join_select_list(
    left_select: &[dagflow_core::settings::SelectInput],
    right_select: &[dagflow_core::settings::SelectInput],
) -> String {
    let left_exprs = left_select
        .iter()
        .filter(|s| s.keep)
        .map(|s| format!("l.{} AS {}", quote(&s.old_name), quote(&s.new_name)));
    let right_exprs = right_select
        .iter()
        .filter(|s| s.keep)
        .map(|s| format!("r.{} AS {}", quote(&s.old_name), quote(&s.new_name)));
    left_exprs.chain(right_exprs).collect::<Vec<_>>().join(", ")
}

async fn union_all(ctx: &SessionContext, frames: &[DataFrame]) -> Result<DataFrame> {
    let mut iter = frames.iter().cloned();
    let first = iter
        .next()
        .ok_or_else(|| DagflowError::GraphInvalid("union requires at least one input".into()))?;
    let mut acc = first;
    for frame in iter {
        acc = acc.union(frame).map_err(df_err)?;
    }
    let _ = ctx;
    Ok(acc)
}

/// Pivot is resolved in two phases since the output columns depend on the
/// distinct values of `pivot_column`, which aren't known until the input is
/// read: first collect the distinct values, then build and run the
/// conditional-aggregation SQL they imply.
async fn pivot(
    ctx: &SessionContext,
    frame: &DataFrame,
    index: &[String],
    pivot_column: &str,
    value_column: &str,
    agg: &AggFn,
) -> Result<DataFrame> {
    ctx.register_table("view_main", frame.clone().into_view())
        .map_err(df_err)?;

    let distinct_query = format!(
        "SELECT DISTINCT {} FROM view_main ORDER BY 1",
        quote(pivot_column)
    );
    let distinct_values = ctx
        .sql(&distinct_query)
        .await
        .map_err(df_err)?
        .collect()
        .await
        .map_err(df_err)?;

    let mut values: Vec<String> = Vec::new();
    for batch in &distinct_values {
        if let Some(arr) = batch.column(0).as_any().downcast_ref::<StringArray>() {
            for i in 0..arr.len() {
                if arr.is_valid(i) {
                    values.push(arr.value(i).to_string());
                }
            }
        }
    }

    let index_cols: Vec<String> = index.iter().map(|c| quote(c)).collect();
    let agg_exprs: Vec<String> = values
        .iter()
        .map(|v| {
            format!(
                "{}(CASE WHEN {} = {} THEN {} END) AS {}",
                match agg {
                    AggFn::Sum => "SUM",
                    AggFn::Mean => "AVG",
                    AggFn::Min => "MIN",
                    AggFn::Max => "MAX",
                    AggFn::Count => "COUNT",
                    AggFn::First => "FIRST_VALUE",
                    AggFn::Last => "LAST_VALUE",
                },
                quote(pivot_column),
                sql_literal_str(v),
                quote(value_column),
                quote(v),
            )
        })
        .collect();

    let mut select_list = index_cols.clone();
    select_list.extend(agg_exprs);
    let query = format!(
        "SELECT {} FROM view_main{}",
        select_list.join(", "),
        if index_cols.is_empty() {
            String::new()
        } else {
            format!(" GROUP BY {}", index_cols.join(", "))
        }
    );
    let result = ctx.sql(&query).await.map_err(df_err);
    ctx.deregister_table("view_main").map_err(df_err)?;
    result
}

fn manual_input_frame(
    ctx: &SessionContext,
    raw_data: &[serde_json::Map<String, serde_json::Value>],
) -> Result<DataFrame> {
    if raw_data.is_empty() {
        let schema = Arc::new(ArrowSchema::empty());
        return ctx.read_batch(RecordBatch::new_empty(schema)).map_err(df_err);
    }

    let mut columns: Vec<&String> = raw_data[0].keys().collect();
    columns.sort();

    let mut fields = Vec::new();
    let mut arrays: Vec<Arc<dyn datafusion::arrow::array::Array>> = Vec::new();
    for column in &columns {
        let is_numeric = raw_data
            .iter()
            .all(|row| row.get(*column).map(|v| v.is_i64() || v.is_u64()).unwrap_or(true));
        if is_numeric {
            let values: Vec<Option<i64>> = raw_data
                .iter()
                .map(|row| row.get(*column).and_then(|v| v.as_i64()))
                .collect();
            fields.push(Field::new((*column).clone(), DataType::Int64, true));
            arrays.push(Arc::new(Int64Array::from(values)));
        } else {
            let values: Vec<Option<String>> = raw_data
                .iter()
                .map(|row| row.get(*column).map(|v| v.to_string().trim_matches('"').to_string()))
                .collect();
            fields.push(Field::new((*column).clone(), DataType::Utf8, true));
            arrays.push(Arc::new(StringArray::from(values)));
        }
    }

    let schema = Arc::new(ArrowSchema::new(fields));
    let batch = RecordBatch::try_new(schema, arrays).map_err(|e| DagflowError::Other(e.into()))?;
    ctx.read_batch(batch).map_err(df_err)
}

fn source_descriptor(source: &str, format: &str) -> Result<SourceDescriptor> {
    Ok(match format {
        "csv" => SourceDescriptor::Csv {
            path: source.to_string(),
            has_header: true,
            delimiter: b',',
        },
        "parquet" => SourceDescriptor::Parquet { path: source.to_string() },
        "json_ndjson" => SourceDescriptor::JsonNdjson { path: source.to_string() },
        other => {
            return Err(DagflowError::SettingsInvalid {
                node: dagflow_core::NodeId(0),
                message: format!("unknown read format {other}"),
            })
        }
    })
}

fn sink_descriptor(
    sink: &str,
    format: &str,
    write_mode: dagflow_core::settings::WriteMode,
) -> Result<SinkDescriptor> {
    let write_mode = match write_mode {
        dagflow_core::settings::WriteMode::Overwrite => {
            dagflow_dataframe::descriptor::SinkWriteMode::Overwrite
        }
        dagflow_core::settings::WriteMode::Append => {
            dagflow_dataframe::descriptor::SinkWriteMode::Append
        }
    };
    Ok(match format {
        "csv" => SinkDescriptor::Csv { path: sink.to_string(), write_mode },
        "parquet" => SinkDescriptor::Parquet { path: sink.to_string(), write_mode },
        "json_ndjson" => SinkDescriptor::JsonNdjson { path: sink.to_string(), write_mode },
        other => {
            return Err(DagflowError::SettingsInvalid {
                node: dagflow_core::NodeId(0),
                message: format!("unknown output format {other}"),
            })
        }
    })
}

/// Union-find over `(from_column, to_column)` edges, producing
/// `output_column` as a connected-component id per row. Not expressible as
/// SQL; this is the one node type executed with plain Rust logic over the
/// collected batches.
async fn graph_solver(
    ctx: &SessionContext,
    adapter: &DataFusionAdapter,
    main_inputs: &[DataFrame],
    from_column: &str,
    to_column: &str,
    output_column: &str,
) -> Result<DataFrame> {
    let frame = main_inputs
        .first()
        .cloned()
        .ok_or_else(|| DagflowError::GraphInvalid("graph_solver requires a main input".into()))?;
    let batches = adapter.collect(frame).await?;

    let mut parent: HashMap<String, String> = HashMap::new();
    fn find(parent: &mut HashMap<String, String>, x: &str) -> String {
        let next = parent.get(x).cloned().unwrap_or_else(|| x.to_string());
        if next == x {
            x.to_string()
        } else {
            let root = find(parent, &next);
            parent.insert(x.to_string(), root.clone());
            root
        }
    }
    fn union(parent: &mut HashMap<String, String>, a: &str, b: &str) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            parent.insert(ra, rb);
        }
    }

    for batch in &batches {
        let from_idx = batch.schema().index_of(from_column).map_err(|e| DagflowError::Other(e.into()))?;
        let to_idx = batch.schema().index_of(to_column).map_err(|e| DagflowError::Other(e.into()))?;
        let from_arr = batch
            .column(from_idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| DagflowError::GraphInvalid("graph_solver from_column must be a string column".into()))?;
        let to_arr = batch
            .column(to_idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| DagflowError::GraphInvalid("graph_solver to_column must be a string column".into()))?;
        for i in 0..batch.num_rows() {
            if from_arr.is_valid(i) && to_arr.is_valid(i) {
                union(&mut parent, from_arr.value(i), to_arr.value(i));
            }
        }
    }

    let mut roots: Vec<String> = parent.keys().cloned().collect();
    roots.sort();
    let mut component_ids: HashMap<String, i64> = HashMap::new();
    for node in &roots {
        let root = find(&mut parent, node);
        let next_id = component_ids.len() as i64;
        component_ids.entry(root).or_insert(next_id);
    }

    let node_col: Vec<&str> = roots.iter().map(|s| s.as_str()).collect();
    let component_col: Vec<i64> = roots
        .iter()
        .map(|n| {
            let root = find(&mut parent, n);
            *component_ids.get(&root).unwrap()
        })
        .collect();

    let schema = Arc::new(ArrowSchema::new(vec![
        Field::new(from_column, DataType::Utf8, false),
        Field::new(output_column, DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(StringArray::from(node_col)), Arc::new(Int64Array::from(component_col))],
    )
    .map_err(|e| DagflowError::Other(e.into()))?;
    ctx.read_batch(batch).map_err(df_err)
}
