//! Pipeline stage implementations.

mod optimization;
mod packaging;

pub use optimization::OptimizationStage;
pub use packaging::PackagingStage;
