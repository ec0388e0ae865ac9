//! Validates artifact references across a set of `python_script` nodes.
//! Artifacts are scoped to the kernel that publishes them (see
//! `rewriter`), so a node that reads or deletes a name never published in
//! its own kernel is a hard error, not a runtime surprise.

use std::collections::{HashMap, HashSet};

use dagflow_core::{DagflowError, Result};

use crate::analysis::UsageAnalysis;

/// One `python_script` node's kernel assignment and usage analysis.
pub struct KernelNode<'a> {
    pub node_id: u64,
    pub kernel_id: &'a str,
    pub analysis: &'a UsageAnalysis,
}

pub fn validate(nodes: &[KernelNode<'_>]) -> Result<()> {
    let mut published_by_kernel: HashMap<&str, HashSet<&str>> = HashMap::new();
    for n in nodes {
        let set = published_by_kernel.entry(n.kernel_id).or_default();
        for (name, _) in &n.analysis.artifacts_published {
            set.insert(name.as_str());
        }
    }

    for n in nodes {
        let published = published_by_kernel.get(n.kernel_id).cloned().unwrap_or_default();
        for name in n.analysis.artifacts_consumed.iter().chain(&n.analysis.artifacts_deleted) {
            if !published.contains(name.as_str()) {
                return Err(DagflowError::CodegenUnsupported(format!(
                    "node {} (kernel {}) references artifact \"{name}\" which no node in that kernel publishes",
                    n.node_id, n.kernel_id
                )));
            }
        }
        if !n.analysis.dynamic_artifact_names.is_empty() {
            return Err(DagflowError::CodegenUnsupported(format!(
                "node {} uses a dynamically computed artifact name, which code generation cannot resolve",
                n.node_id
            )));
        }
    }
    Ok(())
}
