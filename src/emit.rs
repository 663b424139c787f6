//! Code emitter: serializes a rewritten module as a `.pyx` source.

use crate::config::CompilerConfig;
use crate::syntax::{Body, ForLoop, Fragment, FunctionDef, Iterable, Module, Param, Stmt};

/// Indentation unit used when an inline body is expanded into a block.
const INDENT_UNIT: &str = "    ";

/// Serializes modules behind the directive and import preamble.
#[derive(Debug, Clone)]
pub struct CodeEmitter {
    preamble: String,
}

impl Default for CodeEmitter {
    fn default() -> Self {
        Self::new(&CompilerConfig::default())
    }
}

impl CodeEmitter {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            preamble: preamble(config),
        }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn emit(&self, module: &Module) -> String {
        let mut out = self.preamble.clone();
        for stmt in &module.body {
            out.push_str(&render_stmt(stmt));
            match stmt {
                Stmt::FunctionDef(function) if !function.is_async => out.push_str("\n\n"),
                _ => out.push('\n'),
            }
        }
        out
    }
}

fn preamble(config: &CompilerConfig) -> String {
    let mut out = String::new();
    out.push_str("# distutils: language=c++\n");
    out.push_str(&format!("# cython: language_level={}\n", config.language_level));
    out.push_str(&format!(
        "# cython: boundscheck={}, wraparound={}, nonecheck={}\n",
        py_bool(config.boundscheck),
        py_bool(config.wraparound),
        py_bool(config.nonecheck)
    ));
    out.push_str("cimport cython\n");
    out.push_str("import numpy as np\n");
    out.push_str("cimport numpy as np\n\n");
    out.push_str("np.import_array()\n\n");
    out
}

pub(crate) fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

pub fn render_stmt(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Import(text) | Stmt::ImportFrom(text) | Stmt::Other(text) => text.clone(),
        Stmt::FunctionDef(function) => render_function(function),
        Stmt::For(for_loop) => render_loop(for_loop),
        Stmt::Compound(compound) => compound
            .fragments
            .iter()
            .map(|fragment| match fragment {
                Fragment::Text(text) => text.clone(),
                Fragment::Stmt(nested) => render_stmt(nested),
            })
            .collect(),
    }
}

pub fn render_function(function: &FunctionDef) -> String {
    let mut out = String::new();

    for decorator in &function.decorators {
        out.push('@');
        out.push_str(decorator);
        out.push('\n');
        out.push_str(&function.body.outer_indent);
    }

    if function.is_async {
        out.push_str("async ");
    }
    out.push_str("def ");
    out.push_str(&function.name);
    if let Some(type_params) = &function.type_params {
        out.push_str(type_params);
    }
    out.push('(');
    out.push_str(&render_params(&function.params));
    out.push(')');
    if let Some(returns) = &function.returns {
        out.push_str(" -> ");
        out.push_str(returns.text());
    }
    out.push(':');
    out.push_str(&render_body(&function.body));
    out
}

fn render_body(body: &Body) -> String {
    let mut out = String::new();

    if body.inline {
        if body.injected.is_empty() {
            out.push(' ');
            out.push_str(&body.text);
            return out;
        }
        let inner = format!("{}{}", body.outer_indent, INDENT_UNIT);
        for statement in &body.injected {
            out.push('\n');
            out.push_str(&inner);
            out.push_str(statement);
        }
        out.push('\n');
        out.push_str(&inner);
        out.push_str(&body.text);
        return out;
    }

    out.push_str(&body.leading);
    for statement in &body.injected {
        out.push_str(statement);
        out.push('\n');
        out.push_str(&body.indent);
    }
    out.push_str(&body.text);
    out
}

pub fn render_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|param| match param {
            Param::Positional {
                name,
                annotation,
                default,
            } => {
                let mut out = name.clone();
                if let Some(annotation) = annotation {
                    out.push_str(": ");
                    out.push_str(annotation.text());
                }
                if let Some(default) = default {
                    out.push_str(if annotation.is_some() { " = " } else { "=" });
                    out.push_str(default);
                }
                out
            }
            Param::PositionalOnlyMarker => "/".to_string(),
            Param::Verbatim(text) => text.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_loop(for_loop: &ForLoop) -> String {
    let iter = match &for_loop.iter {
        Iterable::Call { callee, arguments } => format!("{}{}", callee, arguments),
        Iterable::Other(text) => text.clone(),
    };
    format!("{}{}{}", for_loop.head, iter, for_loop.tail)
}
