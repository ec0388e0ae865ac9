//! Recursive-descent parser over `lexer::tokenize`'s output, producing the
//! `ast` module's tree. Expression parsing is a small precedence-climbing
//! parser; anything outside the supported grammar that appears where a
//! single token would resolve the ambiguity is rejected, not guessed at.

use crate::ast::{Expr, Module, Stmt};
use crate::lexer::Token;

pub fn parse(src: &str) -> Result<Module, String> {
    let tokens = crate::lexer::tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let body = p.parse_stmts_until_eof()?;
    Ok(Module { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

const COMPOUND_KEYWORDS: &[&str] = &["if", "for", "while", "with", "def", "class", "try"];

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn at_op(&self, s: &str) -> bool {
        matches!(self.peek(), Token::Op(o) if o == s)
    }

    fn at_name(&self, s: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == s)
    }

    fn eat_op(&mut self, s: &str) -> Result<(), String> {
        if self.at_op(s) {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected `{s}`, got {:?}", self.peek()))
        }
    }

    fn eat_name(&mut self, s: &str) -> Result<(), String> {
        if self.at_name(s) {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected keyword `{s}`, got {:?}", self.peek()))
        }
    }

    fn skip_blank_lines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.advance();
        }
    }

    fn parse_stmts_until_eof(&mut self) -> Result<Vec<Stmt>, String> {
        let mut out = Vec::new();
        self.skip_blank_lines();
        while !matches!(self.peek(), Token::Eof) {
            out.extend(self.parse_stmt()?);
            self.skip_blank_lines();
        }
        Ok(out)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, String> {
        self.eat_op(":")?;
        if matches!(self.peek(), Token::Newline) {
            self.advance();
            self.skip_blank_lines();
            if !matches!(self.peek(), Token::Indent) {
                return Err("expected indented block".to_string());
            }
            self.advance();
            let mut out = Vec::new();
            self.skip_blank_lines();
            while !matches!(self.peek(), Token::Dedent) {
                out.extend(self.parse_stmt()?);
                self.skip_blank_lines();
            }
            self.advance();
            Ok(out)
        } else {
            // single-line body: one or more small-statements on this line
            self.parse_simple_line()
        }
    }

    fn parse_stmt(&mut self) -> Result<Vec<Stmt>, String> {
        if let Token::Name(n) = self.peek().clone() {
            if COMPOUND_KEYWORDS.contains(&n.as_str()) {
                return Ok(vec![self.parse_compound(&n)?]);
            }
        }
        self.parse_simple_line()
    }

    fn parse_compound(&mut self, kw: &str) -> Result<Stmt, String> {
        match kw {
            "if" => {
                self.advance();
                let test = self.parse_expr_list()?;
                let body = self.parse_block()?;
                let orelse = self.parse_elif_or_else()?;
                Ok(Stmt::If { test, body, orelse })
            }
            "for" => {
                self.advance();
                let target = self.parse_target_list()?;
                self.eat_name("in")?;
                let iter = self.parse_expr_list()?;
                let body = self.parse_block()?;
                let orelse = self.parse_optional_else()?;
                Ok(Stmt::For { target, iter, body, orelse })
            }
            "while" => {
                self.advance();
                let test = self.parse_expr_list()?;
                let body = self.parse_block()?;
                let orelse = self.parse_optional_else()?;
                Ok(Stmt::While { test, body, orelse })
            }
            "with" => {
                self.advance();
                let mut items = Vec::new();
                loop {
                    let e = self.parse_expr()?;
                    let alias = if self.at_name("as") {
                        self.advance();
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    items.push((e, alias));
                    if self.at_op(",") {
                        self.advance();
                        continue;
                    }
                    break;
                }
                let body = self.parse_block()?;
                Ok(Stmt::With { items, body })
            }
            "def" => {
                self.advance();
                let name = self.expect_ident()?;
                self.eat_op("(")?;
                let params_raw = self.collect_raw_until_matching(")")?;
                let return_raw = if self.at_op("->") {
                    self.advance();
                    Some(self.collect_raw_until_any(&[":"]))
                } else {
                    None
                };
                let body = self.parse_block()?;
                Ok(Stmt::FunctionDef { name, params_raw, return_raw, body })
            }
            "class" => {
                self.advance();
                let name = self.expect_ident()?;
                let bases_raw = if self.at_op("(") {
                    self.advance();
                    Some(self.collect_raw_until_matching(")")?)
                } else {
                    None
                };
                let body = self.parse_block()?;
                Ok(Stmt::ClassDef { name, bases_raw, body })
            }
            "try" => {
                self.advance();
                let body = self.parse_block()?;
                let mut handlers = Vec::new();
                while self.at_name("except") {
                    let header = self.collect_raw_until_any(&[":"]);
                    let hbody = self.parse_block()?;
                    handlers.push((header.trim().to_string(), hbody));
                }
                let orelse = self.parse_optional_else()?;
                let finalbody = if self.at_name("finally") {
                    self.advance();
                    self.parse_block()?
                } else {
                    Vec::new()
                };
                Ok(Stmt::Try { body, handlers, orelse, finalbody })
            }
            _ => unreachable!(),
        }
    }

    fn parse_elif_or_else(&mut self) -> Result<Vec<Stmt>, String> {
        if self.at_name("elif") {
            self.advance();
            let test = self.parse_expr_list()?;
            let body = self.parse_block()?;
            let orelse = self.parse_elif_or_else()?;
            Ok(vec![Stmt::If { test, body, orelse }])
        } else {
            self.parse_optional_else()
        }
    }

    fn parse_optional_else(&mut self) -> Result<Vec<Stmt>, String> {
        if self.at_name("else") {
            self.advance();
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    /// Raw text (re-tokenized back to source-ish form) up to and including
    /// the matching close of whatever bracket was just opened.
    fn collect_raw_until_matching(&mut self, close: &str) -> Result<String, String> {
        let mut depth = 1;
        let mut parts = Vec::new();
        loop {
            match self.peek().clone() {
                Token::Op(o) if o == close && depth == 1 => {
                    self.advance();
                    break;
                }
                Token::Op(o) if matches!(o.as_str(), "(" | "[" | "{") => {
                    depth += 1;
                    parts.push(o);
                    self.advance();
                }
                Token::Op(o) if matches!(o.as_str(), ")" | "]" | "}") => {
                    depth -= 1;
                    parts.push(o);
                    self.advance();
                }
                Token::Eof => return Err("unexpected end of input in parameter list".to_string()),
                t => {
                    parts.push(token_text(&t));
                    self.advance();
                }
            }
        }
        Ok(join_tokens(&parts))
    }

    fn collect_raw_until_any(&mut self, stops: &[&str]) -> String {
        let mut parts = Vec::new();
        loop {
            if let Token::Op(o) = self.peek() {
                if stops.contains(&o.as_str()) {
                    break;
                }
            }
            if matches!(self.peek(), Token::Newline | Token::Eof) {
                break;
            }
            parts.push(token_text(self.peek()));
            self.advance();
        }
        join_tokens(&parts)
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        match self.advance() {
            Token::Name(n) => Ok(n),
            other => Err(format!("expected identifier, got {other:?}")),
        }
    }

    /// One or more semicolon-separated small statements on a single logical
    /// line, terminated by a newline (or EOF/DEDENT for a single-line
    /// compound body).
    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, String> {
        let mut out = vec![self.parse_small_stmt()?];
        while self.at_op(";") {
            self.advance();
            if matches!(self.peek(), Token::Newline | Token::Eof | Token::Dedent) {
                break;
            }
            out.push(self.parse_small_stmt()?);
        }
        if matches!(self.peek(), Token::Newline) {
            self.advance();
        }
        Ok(out)
    }

    fn parse_small_stmt(&mut self) -> Result<Stmt, String> {
        if let Token::Name(n) = self.peek().clone() {
            match n.as_str() {
                "import" => return self.parse_import(),
                "from" => return self.parse_import_from(),
                "pass" => {
                    self.advance();
                    return Ok(Stmt::Pass);
                }
                "break" => {
                    self.advance();
                    return Ok(Stmt::Break);
                }
                "continue" => {
                    self.advance();
                    return Ok(Stmt::Continue);
                }
                "return" => {
                    self.advance();
                    let value = if matches!(self.peek(), Token::Newline | Token::Eof) || self.at_op(";") {
                        None
                    } else {
                        Some(self.parse_expr_list()?)
                    };
                    return Ok(Stmt::Return { value });
                }
                "raise" => {
                    self.advance();
                    let exc = if matches!(self.peek(), Token::Newline | Token::Eof) {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    return Ok(Stmt::Raise { exc });
                }
                "del" => {
                    self.advance();
                    let mut targets = vec![self.parse_expr()?];
                    while self.at_op(",") {
                        self.advance();
                        targets.push(self.parse_expr()?);
                    }
                    return Ok(Stmt::Delete { targets });
                }
                "global" | "nonlocal" | "assert" => {
                    // not rewritten, carried through as raw text
                    let mut parts = vec![n];
                    self.advance();
                    parts.push(self.collect_raw_until_any(&[]));
                    return Ok(Stmt::Raw(parts.join(" ")));
                }
                _ => {}
            }
        }
        self.parse_expr_or_assign()
    }

    fn parse_import(&mut self) -> Result<Stmt, String> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let mut name = self.expect_ident()?;
            while self.at_op(".") {
                self.advance();
                name.push('.');
                name.push_str(&self.expect_ident()?);
            }
            if self.at_name("as") {
                self.advance();
                let alias = self.expect_ident()?;
                name = format!("{name} as {alias}");
            }
            names.push(name);
            if self.at_op(",") {
                self.advance();
                continue;
            }
            break;
        }
        Ok(Stmt::Import { names })
    }

    fn parse_import_from(&mut self) -> Result<Stmt, String> {
        self.advance();
        let mut module = String::new();
        while self.at_op(".") {
            self.advance();
            module.push('.');
        }
        if let Token::Name(_) = self.peek() {
            if !self.at_name("import") {
                module.push_str(&self.expect_ident()?);
                while self.at_op(".") {
                    self.advance();
                    module.push('.');
                    module.push_str(&self.expect_ident()?);
                }
            }
        }
        self.eat_name("import")?;
        let mut names = Vec::new();
        let parenthesized = self.at_op("(");
        if parenthesized {
            self.advance();
        }
        if self.at_op("*") {
            self.advance();
            names.push("*".to_string());
        } else {
            loop {
                let mut name = self.expect_ident()?;
                if self.at_name("as") {
                    self.advance();
                    name = format!("{name} as {}", self.expect_ident()?);
                }
                names.push(name);
                if self.at_op(",") {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        if parenthesized {
            self.eat_op(")")?;
        }
        Ok(Stmt::ImportFrom {
            module: if module.is_empty() { None } else { Some(module) },
            names,
        })
    }

    fn parse_expr_or_assign(&mut self) -> Result<Stmt, String> {
        let first = self.parse_expr_list()?;
        if self.at_op("=") {
            let mut targets = vec![first];
            let mut value;
            loop {
                self.advance();
                value = self.parse_expr_list()?;
                if self.at_op("=") {
                    targets.push(value.clone());
                    continue;
                }
                break;
            }
            return Ok(Stmt::Assign { targets, value });
        }
        for aug in ["+=", "-=", "*=", "/=", "//=", "%=", "**=", "&=", "|=", "^=", ">>=", "<<="] {
            if self.at_op(aug) {
                self.advance();
                let value = self.parse_expr_list()?;
                return Ok(Stmt::AugAssign { target: first, op: aug.to_string(), value });
            }
        }
        Ok(Stmt::ExprStmt { value: first })
    }

    fn parse_target_list(&mut self) -> Result<Expr, String> {
        self.parse_expr_list()
    }

    /// Comma-separated expressions, wrapped in `Tuple` when more than one
    /// (Python's implicit-tuple sugar: `a, b = x`, `for a, b in xs:`).
    fn parse_expr_list(&mut self) -> Result<Expr, String> {
        let first = self.parse_expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.at_op(",") {
            self.advance();
            if matches!(self.peek(), Token::Op(o) if matches!(o.as_str(), "=" | ":" | ")" | "]" | "}"))
                || matches!(self.peek(), Token::Newline | Token::Eof)
            {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    // --- expression parsing (precedence climbing) ---

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        let mut values = vec![];
        while self.at_name("or") {
            self.advance();
            values.push(self.parse_and()?);
        }
        if !values.is_empty() {
            let mut all = vec![left];
            all.extend(values);
            left = Expr::BoolOp { op: "or".to_string(), values: all };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_not()?;
        let mut values = vec![];
        while self.at_name("and") {
            self.advance();
            values.push(self.parse_not()?);
        }
        if !values.is_empty() {
            let mut all = vec![left];
            all.extend(values);
            left = Expr::BoolOp { op: "and".to_string(), values: all };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.at_name("not") {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp { op: "not".to_string(), operand: Box::new(operand) });
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, String> {
        let left = self.parse_bitor()?;
        const CMP: &[&str] = &["==", "!=", "<=", ">=", "<", ">"];
        for op in CMP {
            if self.at_op(op) {
                self.advance();
                let right = self.parse_bitor()?;
                return Ok(Expr::Compare { left: Box::new(left), op: op.to_string(), right: Box::new(right) });
            }
        }
        if self.at_name("in") {
            self.advance();
            let right = self.parse_bitor()?;
            return Ok(Expr::Compare { left: Box::new(left), op: "in".to_string(), right: Box::new(right) });
        }
        if self.at_name("not") && matches!(self.peek_at(1), Token::Name(n) if n == "in") {
            self.advance();
            self.advance();
            let right = self.parse_bitor()?;
            return Ok(Expr::Compare { left: Box::new(left), op: "not in".to_string(), right: Box::new(right) });
        }
        if self.at_name("is") {
            self.advance();
            let op = if self.at_name("not") {
                self.advance();
                "is not"
            } else {
                "is"
            };
            let right = self.parse_bitor()?;
            return Ok(Expr::Compare { left: Box::new(left), op: op.to_string(), right: Box::new(right) });
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<Expr, String> {
        self.parse_binop_level(&["|"], Self::parse_bitxor)
    }
    fn parse_bitxor(&mut self) -> Result<Expr, String> {
        self.parse_binop_level(&["^"], Self::parse_bitand)
    }
    fn parse_bitand(&mut self) -> Result<Expr, String> {
        self.parse_binop_level(&["&"], Self::parse_shift)
    }
    fn parse_shift(&mut self) -> Result<Expr, String> {
        self.parse_binop_level(&["<<", ">>"], Self::parse_additive)
    }
    fn parse_additive(&mut self) -> Result<Expr, String> {
        self.parse_binop_level(&["+", "-"], Self::parse_term)
    }
    fn parse_term(&mut self) -> Result<Expr, String> {
        self.parse_binop_level(&["*", "/", "//", "%", "@"], Self::parse_unary)
    }

    fn parse_binop_level(
        &mut self,
        ops: &[&str],
        mut next: impl FnMut(&mut Self) -> Result<Expr, String>,
    ) -> Result<Expr, String> {
        let mut left = next(self)?;
        loop {
            let matched = ops.iter().find(|op| self.at_op(op));
            let Some(op) = matched else { break };
            let op = op.to_string();
            self.advance();
            let right = next(self)?;
            left = Expr::BinOp { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        for op in ["+", "-", "~"] {
            if self.at_op(op) {
                self.advance();
                let operand = self.parse_unary()?;
                return Ok(Expr::UnaryOp { op: op.to_string(), operand: Box::new(operand) });
            }
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_postfix()?;
        if self.at_op("**") {
            self.advance();
            let exp = self.parse_unary()?;
            return Ok(Expr::BinOp { left: Box::new(base), op: "**".to_string(), right: Box::new(exp) });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.at_op(".") {
                self.advance();
                let attr = self.expect_ident()?;
                expr = Expr::Attribute { value: Box::new(expr), attr };
            } else if self.at_op("(") {
                self.advance();
                let (args, keywords) = self.parse_call_args()?;
                self.eat_op(")")?;
                expr = Expr::Call { func: Box::new(expr), args, keywords };
            } else if self.at_op("[") {
                self.advance();
                let index = self.parse_subscript_index()?;
                self.eat_op("]")?;
                expr = Expr::Subscript { value: Box::new(expr), index: Box::new(index) };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), String> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if self.at_op(")") {
            return Ok((args, keywords));
        }
        loop {
            if let Token::Name(n) = self.peek().clone() {
                if matches!(self.peek_at(1), Token::Op(o) if o == "=") {
                    self.advance();
                    self.advance();
                    let v = self.parse_expr()?;
                    keywords.push((n, v));
                    if self.at_op(",") {
                        self.advance();
                        continue;
                    }
                    break;
                }
            }
            if self.at_op("*") || self.at_op("**") {
                // *args / **kwargs forwarding: keep as a raw positional marker
                let star = if self.at_op("**") { "**" } else { "*" };
                self.advance();
                let inner = self.parse_expr()?;
                args.push(Expr::Raw(format!("{star}{}", crate::printer::print_expr(&inner))));
            } else {
                args.push(self.parse_expr()?);
            }
            if self.at_op(",") {
                self.advance();
                continue;
            }
            break;
        }
        Ok((args, keywords))
    }

    fn parse_subscript_index(&mut self) -> Result<Expr, String> {
        // slices (a:b:c) are not modeled precisely; carried as Raw text so
        // printing still round-trips.
        let save = self.pos;
        if let Ok(e) = self.parse_expr_list() {
            if !self.at_op(":") {
                return Ok(e);
            }
        }
        self.pos = save;
        let raw = self.collect_raw_until_matching_peek("]");
        Ok(Expr::Raw(raw))
    }

    /// Like `collect_raw_until_matching` but does not consume the final
    /// close token, used where the caller already expects to consume it.
    fn collect_raw_until_matching_peek(&mut self, close: &str) -> String {
        let mut depth = 0;
        let mut parts = Vec::new();
        loop {
            match self.peek().clone() {
                Token::Op(o) if o == close && depth == 0 => break,
                Token::Op(o) if matches!(o.as_str(), "(" | "[" | "{") => {
                    depth += 1;
                    parts.push(o);
                    self.advance();
                }
                Token::Op(o) if matches!(o.as_str(), ")" | "]" | "}") => {
                    depth -= 1;
                    parts.push(o);
                    self.advance();
                }
                Token::Eof => break,
                t => {
                    parts.push(token_text(&t));
                    self.advance();
                }
            }
        }
        join_tokens(&parts)
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.peek().clone() {
            Token::Name(n) => {
                self.advance();
                match n.as_str() {
                    "True" => Ok(Expr::Bool(true)),
                    "False" => Ok(Expr::Bool(false)),
                    "None" => Ok(Expr::None),
                    "lambda" => {
                        let raw = self.collect_raw_until_any(&[",", ")", "]", "}"]);
                        Ok(Expr::Raw(format!("lambda {raw}")))
                    }
                    _ => Ok(Expr::Name(n)),
                }
            }
            Token::Int(v) => {
                self.advance();
                Ok(Expr::Int(v))
            }
            Token::Float(v) => {
                self.advance();
                Ok(Expr::Float(v))
            }
            Token::Str(mut v) => {
                self.advance();
                // adjacent string-literal concatenation: "a" "b"
                while let Token::Str(more) = self.peek().clone() {
                    self.advance();
                    v.push_str(&more);
                }
                Ok(Expr::Str(v))
            }
            Token::FString(v) => {
                self.advance();
                Ok(Expr::FString(v))
            }
            Token::Op(o) if o == "(" => {
                self.advance();
                if self.at_op(")") {
                    self.advance();
                    return Ok(Expr::Tuple(vec![]));
                }
                let e = self.parse_expr_list()?;
                self.eat_op(")")?;
                Ok(e)
            }
            Token::Op(o) if o == "[" => {
                self.advance();
                if self.at_op("]") {
                    self.advance();
                    return Ok(Expr::List(vec![]));
                }
                let mut items = vec![self.parse_expr()?];
                while self.at_op(",") {
                    self.advance();
                    if self.at_op("]") {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                self.eat_op("]")?;
                Ok(Expr::List(items))
            }
            Token::Op(o) if o == "{" => {
                self.advance();
                if self.at_op("}") {
                    self.advance();
                    return Ok(Expr::Dict(vec![]));
                }
                let mut items = Vec::new();
                loop {
                    let k = self.parse_expr()?;
                    self.eat_op(":")?;
                    let v = self.parse_expr()?;
                    items.push((k, v));
                    if self.at_op(",") {
                        self.advance();
                        if self.at_op("}") {
                            break;
                        }
                        continue;
                    }
                    break;
                }
                self.eat_op("}")?;
                Ok(Expr::Dict(items))
            }
            other => Err(format!("unexpected token in expression: {other:?}")),
        }
    }
}

fn token_text(t: &Token) -> String {
    match t {
        Token::Name(n) => n.clone(),
        Token::Int(v) | Token::Float(v) => v.clone(),
        Token::Str(v) => format!("'{v}'"),
        Token::FString(v) => format!("f\"{v}\""),
        Token::Op(o) => o.clone(),
        Token::Newline => "\n".to_string(),
        Token::Indent | Token::Dedent | Token::Eof => String::new(),
    }
}

/// Join raw tokens with Python-ish spacing: no space before `,` `)` `]`
/// `}` `.` `(` `[`, a space elsewhere.
fn join_tokens(parts: &[String]) -> String {
    let mut out = String::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            let prev = &parts[i - 1];
            let tight_after = matches!(prev.as_str(), "(" | "[" | ".");
            let tight_before = matches!(p.as_str(), "," | ")" | "]" | "}" | "." | "(" | "[" | ":");
            if !tight_after && !tight_before {
                out.push(' ');
            }
        }
        out.push_str(p);
    }
    out
}
