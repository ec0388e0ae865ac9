//! Turns `python_script` node bodies into a generated, runnable Python
//! script: parse each node's code, analyze how it uses the `flowfile.*`
//! API, rewrite those calls to plain Python, then assemble every node into
//! a standalone function plus a call line. This is what lets a flow built
//! against the kernel-container runtime also be exported as one ordinary
//! `.py` file with no `flowfile` dependency at all.

pub mod analysis;
pub mod assembly;
pub mod ast;
pub mod kernel_artifacts;
pub mod lexer;
pub mod packages;
pub mod parser;
pub mod pipeline;
pub mod printer;
pub mod rewriter;

use std::collections::BTreeMap;

use dagflow_core::{DagflowError, Result};
use tracing::debug;

pub use analysis::{InputMode, UsageAnalysis};
pub use assembly::AssembledFunction;
pub use pipeline::{assemble_pipeline, AssembledPipeline, PipelineNode};

/// Everything code generation needs to place one node's function into the
/// final script.
pub struct GeneratedNode {
    pub analysis: UsageAnalysis,
    pub function: AssembledFunction,
    pub imports: Vec<String>,
    pub required_packages: Vec<String>,
}

/// Parse, analyze, rewrite, and assemble one `python_script` node's code.
///
/// `input_vars` maps this node's input slot names (e.g. `"main"`,
/// `"main_0"`) to the variable name the upstream node's function call was
/// bound to (e.g. `"df_3"`).
pub fn generate_node(
    node_id: u64,
    code: &str,
    kernel_id: Option<&str>,
    input_vars: &BTreeMap<String, String>,
) -> Result<GeneratedNode> {
    let module = parser::parse(code).map_err(DagflowError::CodegenUnsupported)?;
    let usage = analysis::analyze(&module);
    debug!(node_id, input_mode = ?usage.input_mode(), "analyzed python_script usage");

    if !usage.unsupported_calls.is_empty() {
        debug!(node_id, calls = ?usage.unsupported_calls, "python_script uses calls with no codegen equivalent");
    }

    let rewriter = rewriter::Rewriter::new(&usage, kernel_id);
    let rewritten = rewriter.rewrite_module(&module);

    let function = assembly::build_function_code(node_id, &rewritten, &usage, input_vars, kernel_id);
    let imports = assembly::extract_imports(&module);

    let mut import_modules = Vec::new();
    for line in &imports {
        if let Ok(m) = parser::parse(line) {
            import_modules.push(m);
        }
    }
    let required_packages = packages::required_packages(&import_modules);

    Ok(GeneratedNode { analysis: usage, function, imports, required_packages })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_input_passthrough_returns_input_df() {
        let code = "import flowfile\ndf = flowfile.read_input()\nflowfile.publish_output(df)\n";
        let gen = generate_node(5, code, Some("k1"), &BTreeMap::new()).unwrap();
        assert_eq!(gen.analysis.input_mode(), InputMode::Single);
        assert!(gen.function.function_def.contains("def _node_5(input_df: pl.LazyFrame)"));
        assert!(gen.function.function_def.contains("return df.lazy()") || gen.function.function_def.contains("return input_df"));
        assert_eq!(gen.function.call_code, "df_5 = _node_5(pl.LazyFrame())");
    }

    #[test]
    fn publish_and_read_artifact_are_kernel_scoped() {
        let code = "flowfile.publish_artifact(\"total\", 42)\nx = flowfile.read_artifact(\"total\")\nflowfile.publish_output(x)\n";
        let gen = generate_node(1, code, Some("kernel_a"), &BTreeMap::new()).unwrap();
        assert!(gen.function.function_def.contains("_artifacts['kernel_a']['total'] = 42"));
        assert!(gen.function.function_def.contains("_artifacts['kernel_a']['total']"));
    }

    #[test]
    fn log_info_becomes_print() {
        let code = "flowfile.log_info(\"starting\")\nflowfile.publish_output(flowfile.read_input())\n";
        let gen = generate_node(2, code, None, &BTreeMap::new()).unwrap();
        assert!(gen.function.function_def.contains("print(f\"[INFO] {"));
    }

    #[test]
    fn multi_input_mode_groups_by_base_name() {
        let code = "data = flowfile.read_inputs()\nflowfile.publish_output(data[\"main\"][0])\n";
        let mut input_vars = BTreeMap::new();
        input_vars.insert("main_0".to_string(), "df_1".to_string());
        input_vars.insert("main_1".to_string(), "df_3".to_string());
        let gen = generate_node(9, code, Some("k"), &input_vars).unwrap();
        assert_eq!(gen.analysis.input_mode(), InputMode::Multi);
        assert!(gen.function.call_code.contains("\"main\": [df_1, df_3]"));
    }

    #[test]
    fn non_flowfile_imports_survive_and_flowfile_import_is_dropped() {
        let code = "import flowfile\nimport polars as pl\nfrom math import sqrt\nflowfile.publish_output(flowfile.read_input())\n";
        let gen = generate_node(3, code, None, &BTreeMap::new()).unwrap();
        assert_eq!(gen.imports, vec!["import polars as pl".to_string(), "from math import sqrt".to_string()]);
    }

    #[test]
    fn required_packages_derives_from_imports_and_drops_stdlib() {
        let code = "import sklearn.linear_model\nimport json\nflowfile.publish_output(flowfile.read_input())\n";
        let gen = generate_node(4, code, None, &BTreeMap::new()).unwrap();
        assert_eq!(gen.required_packages, vec!["scikit-learn".to_string()]);
    }

    #[test]
    fn required_packages_falls_back_to_import_name_when_unmapped() {
        let code = "import requests\nflowfile.publish_output(flowfile.read_input())\n";
        let gen = generate_node(7, code, None, &BTreeMap::new()).unwrap();
        assert_eq!(gen.required_packages, vec!["requests".to_string()]);
    }

    #[test]
    fn dynamic_artifact_name_is_recorded_not_silently_dropped() {
        let code = "name = \"x\"\nflowfile.publish_artifact(name, 1)\nflowfile.publish_output(flowfile.read_input())\n";
        let gen = generate_node(6, code, None, &BTreeMap::new()).unwrap();
        assert_eq!(gen.analysis.dynamic_artifact_names.len(), 1);
    }
}
