//! Assembles every `python_script` node's generated function into one
//! standalone script: a module-level `_artifacts` dict (one entry per
//! kernel, empty until a node publishes into it), deduplicated hoisted
//! imports, then each node's function definition and call line in
//! topological order. This is the "export as a plain `.py` file" path —
//! the output has no `flowfile` import and no dependency on the
//! kernel-container runtime.

use std::collections::BTreeSet;

use dagflow_core::Result;

use crate::kernel_artifacts::{self, KernelNode};
use crate::GeneratedNode;

/// One `python_script` node ready to take its place in the assembled
/// script, in the topological order the caller already resolved.
pub struct PipelineNode {
    pub node_id: u64,
    pub kernel_id: String,
    pub generated: GeneratedNode,
}

pub struct AssembledPipeline {
    pub source: String,
    pub required_packages: Vec<String>,
}

/// Validate artifact references across the whole pipeline, then concatenate
/// every node's generated code into one script.
pub fn assemble_pipeline(nodes: &[PipelineNode]) -> Result<AssembledPipeline> {
    let kernel_nodes: Vec<KernelNode<'_>> = nodes
        .iter()
        .map(|n| KernelNode { node_id: n.node_id, kernel_id: &n.kernel_id, analysis: &n.generated.analysis })
        .collect();
    kernel_artifacts::validate(&kernel_nodes)?;

    let mut imports: BTreeSet<String> = BTreeSet::new();
    let mut required_packages: BTreeSet<String> = BTreeSet::new();
    let mut kernel_ids: BTreeSet<&str> = BTreeSet::new();
    for n in nodes {
        for line in &n.generated.imports {
            imports.insert(line.clone());
        }
        for pkg in &n.generated.required_packages {
            required_packages.insert(pkg.clone());
        }
        kernel_ids.insert(n.kernel_id.as_str());
    }

    let mut lines = Vec::new();
    lines.extend(imports.iter().cloned());
    if !lines.is_empty() {
        lines.push(String::new());
    }

    if !kernel_ids.is_empty() {
        let entries: Vec<String> = kernel_ids.iter().map(|k| format!("{k:?}: {{}}")).collect();
        lines.push(format!("_artifacts = {{{}}}", entries.join(", ")));
        lines.push(String::new());
    }

    for n in nodes {
        lines.push(n.generated.function.function_def.clone());
        lines.push(String::new());
    }
    for n in nodes {
        lines.push(n.generated.function.call_code.clone());
    }

    Ok(AssembledPipeline { source: lines.join("\n"), required_packages: required_packages.into_iter().collect() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_node;
    use std::collections::BTreeMap;

    #[test]
    fn no_python_nodes_omits_artifacts_init() {
        let assembled = assemble_pipeline(&[]).unwrap();
        assert!(!assembled.source.contains("_artifacts"));
    }

    #[test]
    fn single_kernel_gets_one_artifacts_entry() {
        let code = "flowfile.publish_artifact(\"total\", 42)\nflowfile.publish_output(flowfile.read_input())\n";
        let generated = generate_node(1, code, Some("kernel_a"), &BTreeMap::new()).unwrap();
        let nodes = vec![PipelineNode { node_id: 1, kernel_id: "kernel_a".to_string(), generated }];
        let assembled = assemble_pipeline(&nodes).unwrap();
        assert!(assembled.source.contains("_artifacts = {\"kernel_a\": {}}"));
        assert!(assembled.source.contains("def _node_1"));
        assert!(assembled.source.contains("df_1 = _node_1("));
    }

    #[test]
    fn two_kernels_get_sorted_distinct_entries() {
        let code = "flowfile.publish_output(flowfile.read_input())\n";
        let a = generate_node(1, code, Some("kernel_b"), &BTreeMap::new()).unwrap();
        let b = generate_node(2, code, Some("kernel_a"), &BTreeMap::new()).unwrap();
        let nodes = vec![
            PipelineNode { node_id: 1, kernel_id: "kernel_b".to_string(), generated: a },
            PipelineNode { node_id: 2, kernel_id: "kernel_a".to_string(), generated: b },
        ];
        let assembled = assemble_pipeline(&nodes).unwrap();
        assert!(assembled.source.contains("_artifacts = {\"kernel_a\": {}, \"kernel_b\": {}}"));
    }

    #[test]
    fn unresolved_artifact_reference_fails_assembly() {
        let code = "x = flowfile.read_artifact(\"missing\")\nflowfile.publish_output(flowfile.read_input())\n";
        let generated = generate_node(1, code, Some("kernel_a"), &BTreeMap::new()).unwrap();
        let nodes = vec![PipelineNode { node_id: 1, kernel_id: "kernel_a".to_string(), generated }];
        assert!(assemble_pipeline(&nodes).is_err());
    }
}
