//! A small AST for the subset of Python that shows up in `python_script`
//! node bodies. Not a general-purpose Python grammar: no walrus operator,
//! no match statements, no decorators, no async/await, no type parameters.
//! Wide enough to parse ordinary data-munging scripts that call a handful
//! of `flowfile.*` functions and otherwise use plain Python and Polars.

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Import { names: Vec<String> },
    ImportFrom { module: Option<String>, names: Vec<String> },
    Assign { targets: Vec<Expr>, value: Expr },
    AugAssign { target: Expr, op: String, value: Expr },
    ExprStmt { value: Expr },
    Return { value: Option<Expr> },
    Delete { targets: Vec<Expr> },
    Pass,
    Break,
    Continue,
    If { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    For { target: Expr, iter: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    While { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    With { items: Vec<(Expr, Option<Expr>)>, body: Vec<Stmt> },
    /// `params_raw`/`return_raw` keep the signature's original text; call
    /// sites inside the body are still walked and rewritten normally.
    FunctionDef {
        name: String,
        params_raw: String,
        return_raw: Option<String>,
        body: Vec<Stmt>,
    },
    ClassDef { name: String, bases_raw: Option<String>, body: Vec<Stmt> },
    Try {
        body: Vec<Stmt>,
        /// One entry per `except` clause: its raw header text (e.g.
        /// `"except ValueError as e"`) and the clause body.
        handlers: Vec<(String, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Raise { exc: Option<Expr> },
    /// A line the parser could not classify; carried through verbatim so a
    /// construct outside this grammar's subset doesn't abort the whole
    /// rewrite, it just can't be rewritten.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Int(String),
    Float(String),
    Str(String),
    FString(String),
    Bool(bool),
    None,
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, index: Box<Expr> },
    Call { func: Box<Expr>, args: Vec<Expr>, keywords: Vec<(String, Expr)> },
    BinOp { left: Box<Expr>, op: String, right: Box<Expr> },
    UnaryOp { op: String, operand: Box<Expr> },
    BoolOp { op: String, values: Vec<Expr> },
    Compare { left: Box<Expr>, op: String, right: Box<Expr> },
    /// A fragment the parser couldn't classify further; printed verbatim.
    Raw(String),
}

impl Expr {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str_literal(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }
}
