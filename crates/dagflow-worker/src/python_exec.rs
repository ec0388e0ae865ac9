//! Executes one `python_script` node out-of-process: `dagflow_codegen`
//! generates the node's rewritten function body, this module wraps it in a
//! small driver script that loads each main input from a temp Parquet file
//! and writes the result back to one, then runs that script under the
//! system `python3` (with `polars` on its path) via `tokio::process::Command`
//! and reads the output back in. Grounded on the same spawn/capture/timeout
//! shape `workflow-nodes`' process-execution task uses for running an
//! arbitrary external command.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use datafusion::dataframe::DataFrame;
use tokio::process::Command;
use tracing::debug;

use dagflow_codegen::pipeline::PipelineNode;
use dagflow_codegen::{assemble_pipeline, generate_node};
use dagflow_core::settings::SettingsPayload;
use dagflow_core::{DagflowError, NodeId, Result};
use dagflow_dataframe::descriptor::{SinkDescriptor, SinkWriteMode, SourceDescriptor};
use dagflow_dataframe::DataFusionAdapter;
use dagflow_dataframe::DataframeAdapter;

const TIMEOUT_SECS: u64 = 300;

fn input_var(i: usize) -> String {
    format!("_input_{i}")
}

/// Builds the driver script: hoisted imports (plus `polars`, which the
/// generated function signature always references even when the node's own
/// code never imports it directly), the single node's `_artifacts` entry,
/// its function definition, the main-input loads, then the call line.
fn build_driver_script(pipeline_node: &PipelineNode, input_paths: &[std::path::PathBuf], output_path: &Path) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("import polars as pl".to_string());
    for import in &pipeline_node.generated.imports {
        if import != "import polars as pl" {
            lines.push(import.clone());
        }
    }
    lines.push(String::new());
    lines.push(format!("_artifacts = {{{:?}: {{}}}}", pipeline_node.kernel_id));
    lines.push(String::new());
    lines.push(pipeline_node.generated.function.function_def.clone());
    lines.push(String::new());
    for (i, path) in input_paths.iter().enumerate() {
        lines.push(format!("{} = pl.read_parquet({:?}).lazy()", input_var(i), path));
    }
    lines.push(pipeline_node.generated.function.call_code.clone());
    let var_name = format!("df_{}", pipeline_node.node_id);
    lines.push(format!("{var_name}.collect().write_parquet({:?})", output_path));
    lines.join("\n")
}

pub async fn execute_python_script(
    adapter: &DataFusionAdapter,
    node_id: NodeId,
    settings: &SettingsPayload,
    main_inputs: &[DataFrame],
) -> Result<DataFrame> {
    let SettingsPayload::PythonScript { code, kernel_id, .. } = settings else {
        return Err(DagflowError::SettingsInvalid {
            node: node_id,
            message: "python_script execution requires PythonScript settings".into(),
        });
    };

    let work_dir = tempfile::tempdir().map_err(|e| DagflowError::Other(e.into()))?;

    let mut input_vars = BTreeMap::new();
    let mut input_paths = Vec::new();
    for (i, frame) in main_inputs.iter().enumerate() {
        let path = work_dir.path().join(format!("input_{i}.parquet"));
        adapter
            .write(
                frame.clone(),
                &SinkDescriptor::Parquet { path: path.to_string_lossy().to_string(), write_mode: SinkWriteMode::Overwrite },
            )
            .await?;
        input_vars.insert(format!("main_{i}"), input_var(i));
        input_paths.push(path);
    }

    let generated = generate_node(node_id.0 as u64, code, kernel_id.as_deref(), &input_vars)?;
    let pipeline_node = PipelineNode {
        node_id: node_id.0 as u64,
        kernel_id: kernel_id.clone().unwrap_or_else(|| "_default".to_string()),
        generated,
    };
    // Runs `kernel_artifacts::validate` against this single node; cheap and
    // catches an unresolved artifact reference before we ever spawn python3.
    assemble_pipeline(std::slice::from_ref(&pipeline_node))?;

    let output_path = work_dir.path().join("output.parquet");
    let script = build_driver_script(&pipeline_node, &input_paths, &output_path);
    let script_path = work_dir.path().join("driver.py");
    tokio::fs::write(&script_path, &script).await.map_err(|e| DagflowError::Other(e.into()))?;

    debug!(node = node_id.0, script = %script_path.display(), "running generated python_script node");

    let mut cmd = Command::new("python3");
    cmd.arg(&script_path);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());

    let output = tokio::time::timeout(Duration::from_secs(TIMEOUT_SECS), async {
        let child = cmd.spawn().map_err(|e| {
            DagflowError::ExecutionFailed { node: node_id, message: format!("failed to spawn python3: {e}") }
        })?;
        child
            .wait_with_output()
            .await
            .map_err(|e| DagflowError::ExecutionFailed { node: node_id, message: format!("failed to wait for python3: {e}") })
    })
    .await
    .map_err(|_| DagflowError::ExecutionFailed {
        node: node_id,
        message: format!("python_script node timed out after {TIMEOUT_SECS}s"),
    })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DagflowError::ExecutionFailed {
            node: node_id,
            message: format!("generated python_script exited with {}: {}", output.status, stderr.trim()),
        });
    }

    adapter
        .lazy_read(&SourceDescriptor::Parquet { path: output_path.to_string_lossy().to_string() })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_script_loads_inputs_before_the_call_line() {
        let code = "df = flowfile.read_input()\nflowfile.publish_output(df)\n";
        let generated = generate_node(1, code, Some("k"), &{
            let mut m = BTreeMap::new();
            m.insert("main_0".to_string(), input_var(0));
            m
        })
        .unwrap();
        let pipeline_node = PipelineNode { node_id: 1, kernel_id: "k".to_string(), generated };
        let input_paths = vec![std::path::PathBuf::from("/tmp/input_0.parquet")];
        let output_path = std::path::PathBuf::from("/tmp/output.parquet");
        let script = build_driver_script(&pipeline_node, &input_paths, &output_path);

        let load_idx = script.find("_input_0 = pl.read_parquet").unwrap();
        let call_idx = script.find("df_1 = _node_1(").unwrap();
        assert!(load_idx < call_idx);
        assert!(script.contains("import polars as pl"));
        assert!(script.contains("write_parquet"));
    }
}
