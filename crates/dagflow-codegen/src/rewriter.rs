//! Rewrites `flowfile.*` calls into the plain-Python equivalents that run
//! outside a kernel container:
//!
//! ```text
//! flowfile.read_input()             -> input_df  (or inputs["main"][0])
//! flowfile.read_inputs()             -> inputs
//! flowfile.read_artifact("n")        -> _artifacts["<kernel_id>"]["n"]
//! flowfile.list_artifacts()          -> dict(_artifacts["<kernel_id>"])  (copy, not alias)
//! flowfile.log(msg[, level])         -> print(f"[{level}] {msg}")
//! flowfile.log_<level>(msg)          -> print(f"[<LEVEL>] {msg}")
//! flowfile.publish_output(e)         -> (the statement is dropped; callers
//!                                        build a `return` from `e` instead)
//! flowfile.publish_artifact("n", o)  -> _artifacts["<kernel_id>"]["n"] = o
//! flowfile.delete_artifact("n")      -> del _artifacts["<kernel_id>"]["n"]
//! ```
//!
//! Artifacts are scoped to the producing kernel so two kernels never see
//! each other's writes through a shared dict.

use crate::analysis::{InputMode, UsageAnalysis};
use crate::ast::{Expr, Module, Stmt};

pub struct Rewriter<'a> {
    analysis: &'a UsageAnalysis,
    kernel_id: String,
    input_var: &'static str,
}

impl<'a> Rewriter<'a> {
    pub fn new(analysis: &'a UsageAnalysis, kernel_id: Option<&str>) -> Self {
        let input_var = if analysis.input_mode() == InputMode::Single { "input_df" } else { "inputs" };
        Self {
            analysis,
            kernel_id: kernel_id.unwrap_or("_default").to_string(),
            input_var,
        }
    }

    pub fn rewrite_module(&self, module: &Module) -> Module {
        Module { body: self.rewrite_stmts(&module.body) }
    }

    pub fn rewrite_expr_standalone(&self, e: &Expr) -> Expr {
        self.rewrite_expr(e)
    }

    fn kernel_artifacts(&self) -> Expr {
        Expr::Subscript {
            value: Box::new(Expr::Name("_artifacts".to_string())),
            index: Box::new(Expr::Str(self.kernel_id.clone())),
        }
    }

    fn artifact_subscript(&self, name: &Expr) -> Expr {
        Expr::Subscript { value: Box::new(self.kernel_artifacts()), index: Box::new(name.clone()) }
    }

    fn rewrite_stmts(&self, stmts: &[Stmt]) -> Vec<Stmt> {
        stmts.iter().filter_map(|s| self.rewrite_stmt(s)).collect()
    }

    fn rewrite_stmt(&self, s: &Stmt) -> Option<Stmt> {
        if let Stmt::ExprStmt { value } = s {
            if let Some(rewritten) = self.rewrite_flowfile_expr_stmt(value) {
                return rewritten;
            }
        }
        Some(match s {
            Stmt::Assign { targets, value } => Stmt::Assign {
                targets: targets.iter().map(|t| self.rewrite_expr(t)).collect(),
                value: self.rewrite_expr(value),
            },
            Stmt::AugAssign { target, op, value } => Stmt::AugAssign {
                target: self.rewrite_expr(target),
                op: op.clone(),
                value: self.rewrite_expr(value),
            },
            Stmt::ExprStmt { value } => Stmt::ExprStmt { value: self.rewrite_expr(value) },
            Stmt::Return { value } => Stmt::Return { value: value.as_ref().map(|v| self.rewrite_expr(v)) },
            Stmt::Delete { targets } => {
                Stmt::Delete { targets: targets.iter().map(|t| self.rewrite_expr(t)).collect() }
            }
            Stmt::Raise { exc } => Stmt::Raise { exc: exc.as_ref().map(|e| self.rewrite_expr(e)) },
            Stmt::If { test, body, orelse } => Stmt::If {
                test: self.rewrite_expr(test),
                body: self.rewrite_stmts(body),
                orelse: self.rewrite_stmts(orelse),
            },
            Stmt::For { target, iter, body, orelse } => Stmt::For {
                target: self.rewrite_expr(target),
                iter: self.rewrite_expr(iter),
                body: self.rewrite_stmts(body),
                orelse: self.rewrite_stmts(orelse),
            },
            Stmt::While { test, body, orelse } => Stmt::While {
                test: self.rewrite_expr(test),
                body: self.rewrite_stmts(body),
                orelse: self.rewrite_stmts(orelse),
            },
            Stmt::With { items, body } => Stmt::With {
                items: items
                    .iter()
                    .map(|(e, alias)| (self.rewrite_expr(e), alias.as_ref().map(|a| self.rewrite_expr(a))))
                    .collect(),
                body: self.rewrite_stmts(body),
            },
            Stmt::FunctionDef { name, params_raw, return_raw, body } => Stmt::FunctionDef {
                name: name.clone(),
                params_raw: params_raw.clone(),
                return_raw: return_raw.clone(),
                body: self.rewrite_stmts(body),
            },
            Stmt::ClassDef { name, bases_raw, body } => {
                Stmt::ClassDef { name: name.clone(), bases_raw: bases_raw.clone(), body: self.rewrite_stmts(body) }
            }
            Stmt::Try { body, handlers, orelse, finalbody } => Stmt::Try {
                body: self.rewrite_stmts(body),
                handlers: handlers.iter().map(|(h, b)| (h.clone(), self.rewrite_stmts(b))).collect(),
                orelse: self.rewrite_stmts(orelse),
                finalbody: self.rewrite_stmts(finalbody),
            },
            Stmt::Import { .. } | Stmt::ImportFrom { .. } | Stmt::Pass | Stmt::Break | Stmt::Continue | Stmt::Raw(_) => {
                s.clone()
            }
        })
    }

    /// Handles the three `flowfile.*` calls that only make sense as whole
    /// statements. Returns `Some(None)` for a dropped statement, `Some(Some(_))`
    /// for a replacement, `None` if `value` isn't one of these calls (caller
    /// falls through to ordinary statement rewriting).
    fn rewrite_flowfile_expr_stmt(&self, value: &Expr) -> Option<Option<Stmt>> {
        let Expr::Call { func, args, .. } = value else { return None };
        let Expr::Attribute { value: recv, attr } = func.as_ref() else { return None };
        if !matches!(recv.as_ref(), Expr::Name(n) if n == "flowfile") {
            return None;
        }
        match attr.as_str() {
            "publish_output" => Some(None),
            "publish_artifact" if args.len() >= 2 => {
                let name = self.rewrite_expr(&args[0]);
                let obj = self.rewrite_expr(&args[1]);
                Some(Some(Stmt::Assign { targets: vec![self.artifact_subscript(&name)], value: obj }))
            }
            "delete_artifact" if !args.is_empty() => {
                let name = self.rewrite_expr(&args[0]);
                Some(Some(Stmt::Delete { targets: vec![self.artifact_subscript(&name)] }))
            }
            _ => None,
        }
    }

    fn rewrite_expr(&self, e: &Expr) -> Expr {
        match e {
            Expr::Call { func, args, keywords } => {
                let func_r = Box::new(self.rewrite_expr(func));
                let args_r: Vec<Expr> = args.iter().map(|a| self.rewrite_expr(a)).collect();
                let kw_r: Vec<(String, Expr)> =
                    keywords.iter().map(|(k, v)| (k.clone(), self.rewrite_expr(v))).collect();
                let rebuilt = Expr::Call { func: func_r, args: args_r, keywords: kw_r };
                self.rewrite_flowfile_call(&rebuilt).unwrap_or(rebuilt)
            }
            Expr::Attribute { value, attr } => {
                Expr::Attribute { value: Box::new(self.rewrite_expr(value)), attr: attr.clone() }
            }
            Expr::Subscript { value, index } => Expr::Subscript {
                value: Box::new(self.rewrite_expr(value)),
                index: Box::new(self.rewrite_expr(index)),
            },
            Expr::BinOp { left, op, right } => Expr::BinOp {
                left: Box::new(self.rewrite_expr(left)),
                op: op.clone(),
                right: Box::new(self.rewrite_expr(right)),
            },
            Expr::Compare { left, op, right } => Expr::Compare {
                left: Box::new(self.rewrite_expr(left)),
                op: op.clone(),
                right: Box::new(self.rewrite_expr(right)),
            },
            Expr::UnaryOp { op, operand } => {
                Expr::UnaryOp { op: op.clone(), operand: Box::new(self.rewrite_expr(operand)) }
            }
            Expr::BoolOp { op, values } => {
                Expr::BoolOp { op: op.clone(), values: values.iter().map(|v| self.rewrite_expr(v)).collect() }
            }
            Expr::List(items) => Expr::List(items.iter().map(|v| self.rewrite_expr(v)).collect()),
            Expr::Tuple(items) => Expr::Tuple(items.iter().map(|v| self.rewrite_expr(v)).collect()),
            Expr::Dict(items) => {
                Expr::Dict(items.iter().map(|(k, v)| (self.rewrite_expr(k), self.rewrite_expr(v))).collect())
            }
            Expr::Name(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::FString(_) | Expr::Bool(_)
            | Expr::None | Expr::Raw(_) => e.clone(),
        }
    }

    /// `rebuilt` has already had its children rewritten; this only handles
    /// the call's own head.
    fn rewrite_flowfile_call(&self, rebuilt: &Expr) -> Option<Expr> {
        let Expr::Call { func, args, .. } = rebuilt else { return None };
        let Expr::Attribute { value: recv, attr } = func.as_ref() else { return None };
        if !matches!(recv.as_ref(), Expr::Name(n) if n == "flowfile") {
            return None;
        }
        match attr.as_str() {
            "read_input" => Some(if self.analysis.input_mode() == InputMode::Multi {
                Expr::Subscript {
                    value: Box::new(Expr::Subscript {
                        value: Box::new(Expr::Name("inputs".to_string())),
                        index: Box::new(Expr::Str("main".to_string())),
                    }),
                    index: Box::new(Expr::Int("0".to_string())),
                }
            } else {
                Expr::Name(self.input_var.to_string())
            }),
            "read_inputs" => Some(Expr::Name(self.input_var.to_string())),
            "read_artifact" => args.first().map(|name| self.artifact_subscript(name)),
            "list_artifacts" => Some(Expr::Call {
                func: Box::new(Expr::Name("dict".to_string())),
                args: vec![self.kernel_artifacts()],
                keywords: vec![],
            }),
            "log" => Some(self.make_log_print(args, None)),
            _ if attr.starts_with("log_") && attr.len() > 4 => {
                let level = attr["log_".len()..].to_uppercase();
                Some(self.make_log_print(args, Some(&level)))
            }
            _ => None,
        }
    }

    fn make_log_print(&self, args: &[Expr], fixed_level: Option<&str>) -> Expr {
        let msg = args.first().cloned().unwrap_or(Expr::Str(String::new()));
        let level_text = match fixed_level {
            Some(l) => format!("[{l}] "),
            None => {
                let level = args.get(1).cloned().unwrap_or(Expr::Str("INFO".to_string()));
                return Expr::Call {
                    func: Box::new(Expr::Name("print".to_string())),
                    args: vec![Expr::FString(format!(
                        "[{{{}}}] {{{}}}",
                        crate::printer::print_expr(&level),
                        crate::printer::print_expr(&msg)
                    ))],
                    keywords: vec![],
                };
            }
        };
        Expr::Call {
            func: Box::new(Expr::Name("print".to_string())),
            args: vec![Expr::FString(format!("{level_text}{{{}}}", crate::printer::print_expr(&msg)))],
            keywords: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis;
    use crate::parser;
    use crate::printer::print_module;

    fn rewrite(code: &str, kernel_id: Option<&str>) -> String {
        let module = parser::parse(code).unwrap();
        let usage = analysis::analyze(&module);
        let rewriter = Rewriter::new(&usage, kernel_id);
        print_module(&rewriter.rewrite_module(&module))
    }

    #[test]
    fn list_artifacts_rewrites_to_dict_copy_not_alias() {
        let out = rewrite("flowfile.publish_output(flowfile.list_artifacts())\n", Some("kernel_a"));
        assert!(out.contains("dict(_artifacts['kernel_a'])"));
    }

    #[test]
    fn generic_log_level_suffix_is_rewritten() {
        let out = rewrite("flowfile.log_debug(\"x\")\nflowfile.publish_output(flowfile.read_input())\n", None);
        assert!(out.contains("print(f\"[DEBUG] {"));
    }
}
