//! Assembles a rewritten `python_script` body into a standalone function
//! definition plus a call line, so N node bodies can be concatenated into
//! one generated script: `def _node_5(input_df): ...` then `df_5 =
//! _node_5(df_3)`. This is the step that turns "a node's code" into "a line
//! in someone else's script".

use std::collections::BTreeMap;

use crate::analysis::{InputMode, UsageAnalysis};
use crate::ast::{Expr, Module, Stmt};
use crate::printer::{print_expr, print_stmt};
use crate::rewriter::Rewriter;

pub struct AssembledFunction {
    pub function_def: String,
    pub call_code: String,
}

/// Import lines from the module's top level, excluding `import flowfile` /
/// `from flowfile import ...`.
pub fn extract_imports(module: &Module) -> Vec<String> {
    let mut out = Vec::new();
    for s in &module.body {
        match s {
            Stmt::Import { names } => {
                let kept: Vec<String> = names.iter().filter(|n| !is_flowfile_name(n)).cloned().collect();
                if !kept.is_empty() {
                    out.push(format!("import {}", kept.join(", ")));
                }
            }
            Stmt::ImportFrom { module: m, names } => {
                let is_flowfile_module = m.as_deref().map(|m| m.contains("flowfile")).unwrap_or(false);
                if !is_flowfile_module {
                    out.push(print_stmt(s, 0).trim_end().to_string());
                }
            }
            _ => {}
        }
    }
    out
}

fn is_flowfile_name(name: &str) -> bool {
    name.split(" as ").next().unwrap_or(name) == "flowfile"
}

/// Drop top-level import statements; imports are hoisted to script level by
/// `extract_imports` and don't belong inside the per-node function body.
fn strip_top_level_imports(module: &Module) -> Module {
    let body = module
        .body
        .iter()
        .filter(|s| !matches!(s, Stmt::Import { .. } | Stmt::ImportFrom { .. }))
        .cloned()
        .collect();
    Module { body }
}

pub fn base_input_name(key: &str) -> String {
    match key.rsplit_once('_') {
        Some((base, suffix)) if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => base.to_string(),
        _ => key.to_string(),
    }
}

pub fn group_input_vars(input_vars: &BTreeMap<String, String>) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, var) in input_vars {
        grouped.entry(base_input_name(key)).or_default().push(var.clone());
    }
    grouped
}

/// Only a bare variable reference needs `.lazy()` appended: it's the only
/// case where the value might be an eager `pl.DataFrame` rather than
/// already a `pl.LazyFrame`. Literals, dict/list expressions, and anything
/// already ending in a `.lazy()` call are returned untouched.
fn build_return_for_output(output_expr: &Expr, analysis: &UsageAnalysis, kernel_id: Option<&str>) -> String {
    let rewriter = Rewriter::new(analysis, kernel_id);
    let rewritten_expr = rewriter.rewrite_expr_standalone(output_expr);
    let rewritten = print_expr(&rewritten_expr);
    if matches!(rewritten_expr, Expr::Name(_)) {
        format!("return {rewritten}.lazy()")
    } else {
        format!("return {rewritten}")
    }
}

/// Mirrors the runtime's own entry point shape: a `python_script` node's
/// rewritten body becomes `def _node_{id}(...) -> pl.LazyFrame: ...` plus a
/// `df_{id} = _node_{id}(...)` call, so generated scripts read like a
/// straight-line sequence of plain function calls.
pub fn build_function_code(
    node_id: u64,
    rewritten_module: &Module,
    analysis: &UsageAnalysis,
    input_vars: &BTreeMap<String, String>,
    kernel_id: Option<&str>,
) -> AssembledFunction {
    let func_name = format!("_node_{node_id}");
    let var_name = format!("df_{node_id}");

    let mut params = Vec::new();
    let mut args = Vec::new();

    match analysis.input_mode() {
        InputMode::Single => {
            params.push("input_df: pl.LazyFrame".to_string());
            let main_var = input_vars.get("main").cloned().or_else(|| {
                input_vars
                    .iter()
                    .filter(|(k, _)| k.starts_with("main"))
                    .min_by_key(|(k, _)| (*k).clone())
                    .map(|(_, v)| v.clone())
            });
            args.push(main_var.unwrap_or_else(|| "pl.LazyFrame()".to_string()));
        }
        InputMode::Multi => {
            params.push("inputs: dict[str, list[pl.LazyFrame]]".to_string());
            let grouped = group_input_vars(input_vars);
            let entries: Vec<String> =
                grouped.iter().map(|(k, vs)| format!("\"{k}\": [{}]", vs.join(", "))).collect();
            args.push(format!("{{{}}}", entries.join(", ")));
        }
        InputMode::None => {}
    }

    let return_type = if params.is_empty() { "pl.LazyFrame | None" } else { "pl.LazyFrame" };

    let mut body_lines: Vec<String> = Vec::new();
    if !analysis.unsupported_calls.is_empty() {
        let mut methods = analysis.unsupported_calls.clone();
        methods.sort();
        methods.dedup();
        body_lines.push("# WARNING: the following flowfile API calls are not supported in code".to_string());
        body_lines.push(format!("# generation and will not work outside the kernel runtime: {}", methods.join(", ")));
    }
    if !analysis.dynamic_artifact_names.is_empty() {
        body_lines.push("# WARNING: dynamic artifact names detected, these may not resolve correctly".to_string());
    }

    let stripped = strip_top_level_imports(rewritten_module);
    for s in &stripped.body {
        for line in print_stmt(s, 0).lines() {
            body_lines.push(line.to_string());
        }
    }

    if analysis.has_output && !analysis.output_exprs.is_empty() {
        let last = analysis.output_exprs.last().unwrap();
        if analysis.passthrough_output && analysis.input_mode() == InputMode::Single {
            body_lines.push("return input_df".to_string());
        } else {
            body_lines.push(build_return_for_output(last, analysis, kernel_id));
        }
    } else if analysis.input_mode() == InputMode::Single {
        body_lines.push("return input_df".to_string());
    } else if analysis.input_mode() == InputMode::Multi {
        let first_key = input_vars.keys().next().cloned().unwrap_or_else(|| "main".to_string());
        let base_key = base_input_name(&first_key);
        body_lines.push(format!("return inputs[\"{base_key}\"][0]"));
    } else if params.is_empty() {
        body_lines.push("return None".to_string());
    }

    if body_lines.is_empty() {
        body_lines.push("pass".to_string());
    }

    let indented: Vec<String> = body_lines.iter().map(|l| format!("    {l}")).collect();
    let function_def = format!("def {func_name}({}) -> {return_type}:\n{}", params.join(", "), indented.join("\n"));
    let call_code = format!("{var_name} = {func_name}({})", args.join(", "));

    AssembledFunction { function_def, call_code }
}
