//! Signature rewriter: folds annotations into Cython declarations.
//!
//! Two rules, applied in one pass over the module:
//!
//! - Function declarations become `cdef`/`cpdef` functions. A positional
//!   parameter annotated with a bare name `T` is renamed to `T` followed by
//!   its original name (`x: int` becomes `intx`). This is a textual
//!   convention for the downstream reader, not a type system. The chosen
//!   keyword and return type are recorded as a string statement at the top
//!   of the body (`"cpdef int"`), and decorators plus the return annotation
//!   are dropped.
//! - `for` loops over a direct `range(...)` call iterate over
//!   `cython.parallel.prange(...)` instead, with the arguments untouched.
//!   Nothing checks that the loop body is free of cross-iteration
//!   dependencies; the substitution is purely syntactic.
//!
//! `async def` declarations are left exactly as written.
//!
//! The pass visits top-level statements and the blocks of classes and other
//! compound statements. It does not enter the bodies of functions or loops.

use serde::{Deserialize, Serialize};

use crate::config::RewriteConfig;
use crate::syntax::{Annotation, ForLoop, FunctionDef, FunctionMode, Iterable, Module, Param, Stmt};

/// Return type recorded when a function has no bare-name return annotation.
pub const DEFAULT_RETURN_TYPE: &str = "object";

const BOUNDED_RANGE: &str = "range";

/// Counts of what a rewrite pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteStats {
    pub functions: usize,
    pub strict_functions: usize,
    pub renamed_params: usize,
    pub parallel_loops: usize,
}

pub struct SignatureRewriter {
    strict_marker: String,
    parallel_range: String,
}

impl Default for SignatureRewriter {
    fn default() -> Self {
        Self::new(&RewriteConfig::default())
    }
}

impl SignatureRewriter {
    pub fn new(config: &RewriteConfig) -> Self {
        Self {
            strict_marker: config.strict_marker.clone(),
            parallel_range: config.parallel_range.clone(),
        }
    }

    /// Rewrite every reachable function and loop of `module` in place.
    pub fn rewrite(&self, module: &mut Module) -> RewriteStats {
        let mut stats = RewriteStats::default();
        for stmt in &mut module.body {
            self.visit(stmt, &mut stats);
        }
        stats
    }

    fn visit(&self, stmt: &mut Stmt, stats: &mut RewriteStats) {
        match stmt {
            // Coroutines cannot become `cdef`/`cpdef` functions
            Stmt::FunctionDef(function) if function.is_async => {}
            Stmt::FunctionDef(function) => {
                let before = renamable(function);
                let mode = self.rewrite_function(function);
                stats.functions += 1;
                stats.renamed_params += before;
                if mode == FunctionMode::Strict {
                    stats.strict_functions += 1;
                }
            }
            Stmt::For(for_loop) => {
                if self.rewrite_loop(for_loop) {
                    stats.parallel_loops += 1;
                }
            }
            Stmt::Compound(compound) => {
                for nested in compound.statements_mut() {
                    self.visit(nested, stats);
                }
            }
            Stmt::Import(_) | Stmt::ImportFrom(_) | Stmt::Other(_) => {}
        }
    }

    /// Mode selected by the decorator list.
    pub fn mode_of(&self, function: &FunctionDef) -> FunctionMode {
        let strict = function
            .decorators
            .iter()
            .any(|d| strip_whitespace(d) == self.strict_marker);
        if strict {
            FunctionMode::Strict
        } else {
            FunctionMode::Relaxed
        }
    }

    pub fn rewrite_function(&self, function: &mut FunctionDef) -> FunctionMode {
        let mode = self.mode_of(function);
        let return_type = function
            .returns
            .as_ref()
            .and_then(Annotation::simple_name)
            .unwrap_or(DEFAULT_RETURN_TYPE)
            .to_string();

        for param in &mut function.params {
            if let Param::Positional {
                name, annotation, ..
            } = param
            {
                if let Some(type_name) = annotation.as_ref().and_then(Annotation::simple_name) {
                    *name = type_prefixed_name(type_name, name);
                    *annotation = None;
                }
            }
        }

        function
            .body
            .insert_first(directive_statement(mode, &return_type));
        function.decorators.clear();
        function.returns = None;

        mode
    }

    /// Returns whether the loop was rewritten.
    pub fn rewrite_loop(&self, for_loop: &mut ForLoop) -> bool {
        match &mut for_loop.iter {
            Iterable::Call { callee, .. } if callee == BOUNDED_RANGE => {
                *callee = self.parallel_range.clone();
                true
            }
            _ => false,
        }
    }
}

/// `int` + `x` gives `intx`.
pub fn type_prefixed_name(type_name: &str, name: &str) -> String {
    format!("{}{}", type_name, name)
}

/// The synthetic first statement of a rewritten function.
pub fn directive_statement(mode: FunctionMode, return_type: &str) -> String {
    format!("\"{} {}\"", mode.keyword(), return_type)
}

fn renamable(function: &FunctionDef) -> usize {
    function
        .params
        .iter()
        .filter(|p| match p {
            Param::Positional { annotation, .. } => {
                annotation.as_ref().and_then(Annotation::simple_name).is_some()
            }
            _ => false,
        })
        .count()
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
