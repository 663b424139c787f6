//! Two-stage optimization pipeline.
//!
//! 1. Optimization - walks the project, rewrites each module and compiles it
//! 2. Packaging - mirrors compiled modules (or emitted sources) into the
//!    output directory together with the auxiliary files

mod execution;
mod stages;
mod types;

pub use types::{
    FileOutcome, PipelineContext, PipelineOutput, PipelineStage, ValidationResult,
    ValidationStrategy,
};

pub use execution::OptimizationPipeline;

pub use stages::{OptimizationStage, PackagingStage};
