//! Owned statement model for one Python module.
//!
//! Only the parts the rewriter touches are structured (function signatures
//! and `for` iterables). Everything else is kept as the exact source text, so
//! untouched code survives emission byte for byte.

use serde::{Deserialize, Serialize};

/// A parsed source file: its top-level statements in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.body.iter().flat_map(|s| s.functions())
    }

    pub fn loops(&self) -> impl Iterator<Item = &ForLoop> {
        self.body.iter().flat_map(|s| s.loops())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Import(String),
    ImportFrom(String),
    FunctionDef(FunctionDef),
    For(ForLoop),
    /// Class, `if`, `while`, `with`, `try` or `match` statement whose nested
    /// statements are modelled individually.
    Compound(Compound),
    Other(String),
}

impl Stmt {
    /// Function declarations reachable from this statement without entering
    /// a function or loop body.
    pub fn functions(&self) -> Vec<&FunctionDef> {
        match self {
            Stmt::FunctionDef(f) => vec![f],
            Stmt::Compound(c) => c.statements().flat_map(|s| s.functions()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn loops(&self) -> Vec<&ForLoop> {
        match self {
            Stmt::For(l) => vec![l],
            Stmt::Compound(c) => c.statements().flat_map(|s| s.loops()).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compound {
    pub fragments: Vec<Fragment>,
}

impl Compound {
    pub fn statements(&self) -> impl Iterator<Item = &Stmt> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Stmt(s) => Some(s),
            Fragment::Text(_) => None,
        })
    }

    pub fn statements_mut(&mut self) -> impl Iterator<Item = &mut Stmt> {
        self.fragments.iter_mut().filter_map(|f| match f {
            Fragment::Stmt(s) => Some(s),
            Fragment::Text(_) => None,
        })
    }
}

/// Piece of a compound statement: verbatim source or a nested statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Stmt(Stmt),
}

/// Declaration keyword chosen for a rewritten function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionMode {
    /// Marked with the strict-call decorator: `cdef`
    Strict,
    /// Everything else: `cpdef`
    Relaxed,
}

impl FunctionMode {
    pub fn keyword(&self) -> &'static str {
        match self {
            FunctionMode::Strict => "cdef",
            FunctionMode::Relaxed => "cpdef",
        }
    }
}

impl std::fmt::Display for FunctionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub is_async: bool,
    /// Decorator expressions without the leading `@`
    pub decorators: Vec<String>,
    /// PEP 695 type parameter list, brackets included
    pub type_params: Option<String>,
    pub params: Vec<Param>,
    pub returns: Option<Annotation>,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Positional or positional-only parameter
    Positional {
        name: String,
        annotation: Option<Annotation>,
        default: Option<String>,
    },
    /// The `/` separator
    PositionalOnlyMarker,
    /// `*args`, bare `*`, keyword-only parameters and `**kwargs`, as written
    Verbatim(String),
}

impl Param {
    pub fn positional(name: &str) -> Self {
        Param::Positional {
            name: name.to_string(),
            annotation: None,
            default: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Param::Positional { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// A bare identifier such as `int` or `MyType`
    Name(String),
    /// Any other annotation expression, as written
    Expr(String),
}

impl Annotation {
    pub fn simple_name(&self) -> Option<&str> {
        match self {
            Annotation::Name(name) => Some(name),
            Annotation::Expr(_) => None,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Annotation::Name(text) | Annotation::Expr(text) => text,
        }
    }
}

/// Function body: opaque statements plus the layout needed to put a new
/// statement in front of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    /// Body written on the header line (`def f(): return x`)
    pub inline: bool,
    /// Leading whitespace of the line the function statement starts on
    pub outer_indent: String,
    /// Text between the header colon and the first statement (block bodies)
    pub leading: String,
    /// Indentation of the first statement (block bodies)
    pub indent: String,
    /// Statements, from the first one to the end of the function
    pub text: String,
    /// Synthetic statements placed before `text`
    pub injected: Vec<String>,
}

impl Body {
    pub fn insert_first(&mut self, statement: String) {
        self.injected.insert(0, statement);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForLoop {
    /// `for target in ` (with `async` if present)
    pub head: String,
    pub iter: Iterable,
    /// Everything after the iterable: colon, body, `else` clause
    pub tail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iterable {
    /// Call on a plain name, e.g. `range(0, n, step=2)`
    Call { callee: String, arguments: String },
    Other(String),
}
