//! Render `ast` nodes back to Python source. Prints parentheses around any
//! nested binary/boolean/compare/unary expression rather than tracking
//! operator precedence precisely — more parens than a human would write,
//! never fewer, so the output always evaluates the same as the input.

use crate::ast::{Expr, Module, Stmt};

pub fn print_module(m: &Module) -> String {
    print_block(&m.body, 0)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn print_block(stmts: &[Stmt], depth: usize) -> String {
    if stmts.is_empty() {
        return format!("{}pass\n", indent(depth));
    }
    let mut out = String::new();
    for s in stmts {
        out.push_str(&print_stmt(s, depth));
    }
    out
}

fn print_stmt(s: &Stmt, depth: usize) -> String {
    let pad = indent(depth);
    match s {
        Stmt::Import { names } => format!("{pad}import {}\n", names.join(", ")),
        Stmt::ImportFrom { module, names } => {
            let m = module.clone().unwrap_or_default();
            format!("{pad}from {m} import {}\n", names.join(", "))
        }
        Stmt::Assign { targets, value } => {
            let t: Vec<String> = targets.iter().map(print_expr).collect();
            format!("{pad}{} = {}\n", t.join(" = "), print_expr(value))
        }
        Stmt::AugAssign { target, op, value } => {
            format!("{pad}{} {op} {}\n", print_expr(target), print_expr(value))
        }
        Stmt::ExprStmt { value } => format!("{pad}{}\n", print_expr(value)),
        Stmt::Return { value } => match value {
            Some(v) => format!("{pad}return {}\n", print_expr(v)),
            None => format!("{pad}return\n"),
        },
        Stmt::Delete { targets } => {
            let t: Vec<String> = targets.iter().map(print_expr).collect();
            format!("{pad}del {}\n", t.join(", "))
        }
        Stmt::Pass => format!("{pad}pass\n"),
        Stmt::Break => format!("{pad}break\n"),
        Stmt::Continue => format!("{pad}continue\n"),
        Stmt::Raise { exc } => match exc {
            Some(e) => format!("{pad}raise {}\n", print_expr(e)),
            None => format!("{pad}raise\n"),
        },
        Stmt::If { test, body, orelse } => {
            let mut out = format!("{pad}if {}:\n{}", print_expr(test), print_block(body, depth + 1));
            if !orelse.is_empty() {
                if let [Stmt::If { .. }] = orelse.as_slice() {
                    let inner = print_stmt(&orelse[0], depth);
                    out.push_str(&inner.replacen(&format!("{pad}if"), &format!("{pad}elif"), 1));
                } else {
                    out.push_str(&format!("{pad}else:\n{}", print_block(orelse, depth + 1)));
                }
            }
            out
        }
        Stmt::For { target, iter, body, orelse } => {
            let mut out = format!(
                "{pad}for {} in {}:\n{}",
                print_expr(target),
                print_expr(iter),
                print_block(body, depth + 1)
            );
            if !orelse.is_empty() {
                out.push_str(&format!("{pad}else:\n{}", print_block(orelse, depth + 1)));
            }
            out
        }
        Stmt::While { test, body, orelse } => {
            let mut out = format!("{pad}while {}:\n{}", print_expr(test), print_block(body, depth + 1));
            if !orelse.is_empty() {
                out.push_str(&format!("{pad}else:\n{}", print_block(orelse, depth + 1)));
            }
            out
        }
        Stmt::With { items, body } => {
            let parts: Vec<String> = items
                .iter()
                .map(|(e, alias)| match alias {
                    Some(a) => format!("{} as {}", print_expr(e), print_expr(a)),
                    None => print_expr(e),
                })
                .collect();
            format!("{pad}with {}:\n{}", parts.join(", "), print_block(body, depth + 1))
        }
        Stmt::FunctionDef { name, params_raw, return_raw, body } => {
            let ret = return_raw.as_ref().map(|r| format!(" -> {r}")).unwrap_or_default();
            format!("{pad}def {name}({params_raw}){ret}:\n{}", print_block(body, depth + 1))
        }
        Stmt::ClassDef { name, bases_raw, body } => {
            let bases = bases_raw.clone().map(|b| format!("({b})")).unwrap_or_default();
            format!("{pad}class {name}{bases}:\n{}", print_block(body, depth + 1))
        }
        Stmt::Try { body, handlers, orelse, finalbody } => {
            let mut out = format!("{pad}try:\n{}", print_block(body, depth + 1));
            for (header, hbody) in handlers {
                let header = if header.is_empty() { "except".to_string() } else { header.clone() };
                out.push_str(&format!("{pad}{header}:\n{}", print_block(hbody, depth + 1)));
            }
            if !orelse.is_empty() {
                out.push_str(&format!("{pad}else:\n{}", print_block(orelse, depth + 1)));
            }
            if !finalbody.is_empty() {
                out.push_str(&format!("{pad}finally:\n{}", print_block(finalbody, depth + 1)));
            }
            out
        }
        Stmt::Raw(text) => format!("{pad}{text}\n"),
    }
}

pub fn print_expr(e: &Expr) -> String {
    match e {
        Expr::Name(n) => n.clone(),
        Expr::Int(v) | Expr::Float(v) => v.clone(),
        Expr::Str(v) => format!("'{v}'"),
        Expr::FString(v) => format!("f\"{v}\""),
        Expr::Bool(true) => "True".to_string(),
        Expr::Bool(false) => "False".to_string(),
        Expr::None => "None".to_string(),
        Expr::List(items) => format!("[{}]", items.iter().map(print_expr).collect::<Vec<_>>().join(", ")),
        Expr::Tuple(items) => {
            if items.len() == 1 {
                format!("({},)", print_expr(&items[0]))
            } else {
                format!("({})", items.iter().map(print_expr).collect::<Vec<_>>().join(", "))
            }
        }
        Expr::Dict(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|(k, v)| format!("{}: {}", print_expr(k), print_expr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Expr::Attribute { value, attr } => format!("{}.{attr}", print_expr(value)),
        Expr::Subscript { value, index } => format!("{}[{}]", print_expr(value), print_expr(index)),
        Expr::Call { func, args, keywords } => {
            let mut parts: Vec<String> = args.iter().map(print_expr).collect();
            parts.extend(keywords.iter().map(|(k, v)| format!("{k}={}", print_expr(v))));
            format!("{}({})", print_expr(func), parts.join(", "))
        }
        Expr::BinOp { left, op, right } => {
            format!("({} {op} {})", print_expr(left), print_expr(right))
        }
        Expr::UnaryOp { op, operand } => {
            if op == "not" {
                format!("(not {})", print_expr(operand))
            } else {
                format!("({op}{})", print_expr(operand))
            }
        }
        Expr::BoolOp { op, values } => {
            let parts: Vec<String> = values.iter().map(print_expr).collect();
            format!("({})", parts.join(&format!(" {op} ")))
        }
        Expr::Compare { left, op, right } => {
            format!("({} {op} {})", print_expr(left), print_expr(right))
        }
        Expr::Raw(text) => text.clone(),
    }
}
