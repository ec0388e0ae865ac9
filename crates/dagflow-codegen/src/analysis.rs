//! Walks a parsed `python_script` body and records how it uses the
//! `flowfile.*` API, mirroring the runtime semantics each call maps to
//! inside a kernel container: `read_input`/`read_inputs` are how the node's
//! upstream frames arrive, `publish_output` is how its result leaves,
//! `publish_artifact`/`read_artifact`/`delete_artifact`/`list_artifacts`
//! are the kernel-scoped key/value store, and `log*` calls go to the
//! kernel's stdout stream.

use crate::ast::{Expr, Module, Stmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    None,
    Single,
    Multi,
}

#[derive(Debug, Clone, Default)]
pub struct UsageAnalysis {
    pub input_mode: Option<InputMode>,
    pub has_read_input: bool,
    pub has_read_inputs: bool,
    pub has_output: bool,
    pub output_exprs: Vec<Expr>,
    pub passthrough_output: bool,
    pub artifacts_published: Vec<(String, Expr)>,
    pub artifacts_consumed: Vec<String>,
    pub artifacts_deleted: Vec<String>,
    pub has_logging: bool,
    pub has_list_artifacts: bool,
    pub dynamic_artifact_names: Vec<Expr>,
    pub unsupported_calls: Vec<String>,
}

impl UsageAnalysis {
    pub fn input_mode(&self) -> InputMode {
        self.input_mode.unwrap_or(InputMode::None)
    }
}

const UNSUPPORTED: &[&str] = &[
    "display",
    "publish_global",
    "get_global",
    "list_global_artifacts",
    "delete_global_artifact",
];

pub fn analyze(module: &Module) -> UsageAnalysis {
    let mut a = UsageAnalysis::default();
    for s in &module.body {
        walk_stmt(s, &mut a);
    }
    a
}

fn flowfile_method<'a>(e: &'a Expr) -> Option<&'a str> {
    if let Expr::Call { func, .. } = e {
        if let Expr::Attribute { value, attr } = func.as_ref() {
            if matches!(value.as_ref(), Expr::Name(n) if n == "flowfile") {
                return Some(attr.as_str());
            }
        }
    }
    None
}

fn is_passthrough_output(call: &Expr) -> bool {
    if let Expr::Call { args, .. } = call {
        if let Some(first) = args.first() {
            return flowfile_method(first) == Some("read_input");
        }
    }
    false
}

fn record_call(call: &Expr, a: &mut UsageAnalysis) {
    let Some(method) = flowfile_method(call) else { return };
    let Expr::Call { args, keywords, .. } = call else { return };
    match method {
        "read_input" => {
            a.has_read_input = true;
            if !a.has_read_inputs {
                a.input_mode = Some(InputMode::Single);
            }
        }
        "read_inputs" => {
            a.has_read_inputs = true;
            a.input_mode = Some(InputMode::Multi);
        }
        "publish_output" => {
            a.has_output = true;
            if let Some(first) = args.first() {
                a.output_exprs.push(first.clone());
                if is_passthrough_output(call) {
                    a.passthrough_output = true;
                }
            }
        }
        "publish_artifact" => {
            if args.len() >= 2 {
                if let Some(name) = args[0].as_str_literal() {
                    a.artifacts_published.push((name.to_string(), args[1].clone()));
                } else {
                    a.dynamic_artifact_names.push(args[0].clone());
                }
            }
        }
        "read_artifact" => {
            if let Some(first) = args.first() {
                if let Some(name) = first.as_str_literal() {
                    a.artifacts_consumed.push(name.to_string());
                } else {
                    a.dynamic_artifact_names.push(first.clone());
                }
            }
        }
        "delete_artifact" => {
            if let Some(first) = args.first() {
                if let Some(name) = first.as_str_literal() {
                    a.artifacts_deleted.push(name.to_string());
                } else {
                    a.dynamic_artifact_names.push(first.clone());
                }
            }
        }
        "list_artifacts" => {
            a.has_list_artifacts = true;
        }
        other if other == "log" || (other.starts_with("log_") && other.len() > "log_".len()) => {
            a.has_logging = true;
        }
        other if UNSUPPORTED.contains(&other) => {
            a.unsupported_calls.push(other.to_string());
        }
        _ => {}
    }
    let _ = keywords;
}

fn walk_stmt(s: &Stmt, a: &mut UsageAnalysis) {
    match s {
        Stmt::Assign { targets, value } => {
            targets.iter().for_each(|t| walk_expr(t, a));
            walk_expr(value, a);
        }
        Stmt::AugAssign { target, value, .. } => {
            walk_expr(target, a);
            walk_expr(value, a);
        }
        Stmt::ExprStmt { value } => walk_expr(value, a),
        Stmt::Return { value } => {
            if let Some(v) = value {
                walk_expr(v, a);
            }
        }
        Stmt::Delete { targets } => targets.iter().for_each(|t| walk_expr(t, a)),
        Stmt::Raise { exc } => {
            if let Some(e) = exc {
                walk_expr(e, a);
            }
        }
        Stmt::If { test, body, orelse } => {
            walk_expr(test, a);
            body.iter().for_each(|s| walk_stmt(s, a));
            orelse.iter().for_each(|s| walk_stmt(s, a));
        }
        Stmt::For { target, iter, body, orelse } => {
            walk_expr(target, a);
            walk_expr(iter, a);
            body.iter().for_each(|s| walk_stmt(s, a));
            orelse.iter().for_each(|s| walk_stmt(s, a));
        }
        Stmt::While { test, body, orelse } => {
            walk_expr(test, a);
            body.iter().for_each(|s| walk_stmt(s, a));
            orelse.iter().for_each(|s| walk_stmt(s, a));
        }
        Stmt::With { items, body } => {
            for (e, alias) in items {
                walk_expr(e, a);
                if let Some(al) = alias {
                    walk_expr(al, a);
                }
            }
            body.iter().for_each(|s| walk_stmt(s, a));
        }
        Stmt::FunctionDef { body, .. } => body.iter().for_each(|s| walk_stmt(s, a)),
        Stmt::ClassDef { body, .. } => body.iter().for_each(|s| walk_stmt(s, a)),
        Stmt::Try { body, handlers, orelse, finalbody } => {
            body.iter().for_each(|s| walk_stmt(s, a));
            for (_, hbody) in handlers {
                hbody.iter().for_each(|s| walk_stmt(s, a));
            }
            orelse.iter().for_each(|s| walk_stmt(s, a));
            finalbody.iter().for_each(|s| walk_stmt(s, a));
        }
        Stmt::Import { .. } | Stmt::ImportFrom { .. } | Stmt::Pass | Stmt::Break | Stmt::Continue | Stmt::Raw(_) => {}
    }
}

fn walk_expr(e: &Expr, a: &mut UsageAnalysis) {
    match e {
        Expr::Call { func, args, keywords } => {
            record_call(e, a);
            walk_expr(func, a);
            args.iter().for_each(|e| walk_expr(e, a));
            keywords.iter().for_each(|(_, e)| walk_expr(e, a));
        }
        Expr::Attribute { value, .. } => walk_expr(value, a),
        Expr::Subscript { value, index } => {
            walk_expr(value, a);
            walk_expr(index, a);
        }
        Expr::BinOp { left, right, .. } | Expr::Compare { left, right, .. } => {
            walk_expr(left, a);
            walk_expr(right, a);
        }
        Expr::UnaryOp { operand, .. } => walk_expr(operand, a),
        Expr::BoolOp { values, .. } => values.iter().for_each(|e| walk_expr(e, a)),
        Expr::List(items) | Expr::Tuple(items) => items.iter().for_each(|e| walk_expr(e, a)),
        Expr::Dict(items) => items.iter().for_each(|(k, v)| {
            walk_expr(k, a);
            walk_expr(v, a);
        }),
        Expr::Name(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::FString(_)
        | Expr::Bool(_)
        | Expr::None
        | Expr::Raw(_) => {}
    }
}
