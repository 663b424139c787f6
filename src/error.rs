//! Error types for the optimizer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while optimizing and packaging a project.
///
/// `Parse`, `Rewrite`, `Compile` and `CompilerUnavailable` are per-file and
/// never abort a run. `MissingAuxiliary` aborts the run when auxiliary files
/// are required.
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("Syntax error in {path} at line {line}, column {column}")]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
    },

    #[error("Failed to rewrite {path}: {message}")]
    Rewrite { path: PathBuf, message: String },

    #[error("Cython compilation of {path} failed: {message}")]
    Compile { path: PathBuf, message: String },

    #[error("Compiler '{0}' not found in PATH")]
    CompilerUnavailable(String),

    #[error("Auxiliary file not found: {0}")]
    MissingAuxiliary(PathBuf),

    #[error("Invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OptimizeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OptimizeError>;
