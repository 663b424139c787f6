//! Pipeline execution engine.

use anyhow::{Context as AnyhowContext, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::types::{PipelineContext, PipelineOutput, PipelineStage, ValidationStrategy};
use crate::reporter::Reporter;

/// Runs stages in order over one project, reporting progress through the
/// reporter it was built with.
pub struct OptimizationPipeline {
    pub(crate) stages: Vec<Box<dyn PipelineStage>>,
    pub(crate) validation: ValidationStrategy,
    reporter: Arc<dyn Reporter>,
}

impl OptimizationPipeline {
    pub fn new(validation: ValidationStrategy, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            stages: Vec::new(),
            validation,
            reporter,
        }
    }

    /// Add a stage to the pipeline
    pub fn add_stage(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Run the complete pipeline
    pub async fn run(&self, input: &Path, output: &Path) -> Result<PipelineOutput> {
        let total = self.stages.len();
        self.reporter.info(&format!(
            "Starting pipeline with {} stages for {}",
            total,
            input.display()
        ));

        let mut ctx = PipelineContext::new(input.to_path_buf(), output.to_path_buf());

        for (idx, stage) in self.stages.iter().enumerate() {
            let name = stage.name();
            self.reporter
                .info(&format!("Running stage {}/{}: {}", idx + 1, total, name));

            let started = Instant::now();
            ctx = stage
                .execute(ctx)
                .await
                .with_context(|| format!("Stage '{}' failed", name))?;
            self.reporter.debug(&format!(
                "Stage '{}' finished in {} ms",
                name,
                started.elapsed().as_millis()
            ));

            if self.validation == ValidationStrategy::None {
                continue;
            }

            let validation_result = stage.validate(&ctx)?;
            ctx.validation_results.push(validation_result.clone());

            if validation_result.passed {
                self.reporter.debug(&format!(
                    "Validation passed for stage '{}': {}",
                    name, validation_result.message
                ));
                continue;
            }

            let failure = anyhow::anyhow!("{}", validation_result.message);
            self.reporter
                .error(&format!("Validation failed for stage '{}'", name), &*failure);
            if self.validation == ValidationStrategy::StopOnError {
                return Err(failure)
                    .with_context(|| format!("Validation failed for stage '{}'", name));
            }
        }

        let output = ctx.output();
        self.reporter.info(&format!(
            "Pipeline completed: {} of {} files optimized",
            output.outcomes.iter().filter(|o| o.is_optimized()).count(),
            output.outcomes.len()
        ));
        Ok(output)
    }
}
