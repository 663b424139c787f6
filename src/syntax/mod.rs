//! Python syntax layer: tree-sitter parsing into an owned statement model.

mod ast;
mod parser;

pub use ast::{
    Annotation, Body, Compound, ForLoop, Fragment, FunctionDef, FunctionMode, Iterable, Module,
    Param, Stmt,
};
pub use parser::{parse_module, PythonParser};
