// Library exports for the cyopt Python-to-Cython optimizer
pub mod compiler;
pub mod config;
pub mod emit;
pub mod error;
pub mod package;
pub mod pipeline;
pub mod report;
pub mod reporter;
pub mod rewrite;
pub mod syntax;
pub mod walker;

// Re-export key types for convenience
pub use compiler::{CythonCompiler, ExtensionCompiler};
pub use config::CyoptConfig;
pub use emit::CodeEmitter;
pub use error::OptimizeError;
pub use package::{PackageSummary, Packager};
pub use pipeline::{
    FileOutcome, OptimizationPipeline, OptimizationStage, PackagingStage, PipelineStage,
    ValidationStrategy,
};
pub use report::OptimizationReport;
pub use reporter::{MemoryReporter, Reporter, TracingReporter};
pub use rewrite::SignatureRewriter;
pub use syntax::{parse_module, Module, PythonParser};
pub use walker::SourceWalker;
