//! Packaging stage - writes the output directory.

use anyhow::{Context as AnyhowContext, Result};
use std::sync::Arc;

use crate::config::PackagingConfig;
use crate::package::{ArtifactKind, Packager};
use crate::pipeline::types::{PipelineContext, PipelineStage, ValidationResult};
use crate::reporter::Reporter;

/// Mirrors optimized records into the output directory.
pub struct PackagingStage {
    pub(crate) config: PackagingConfig,
    pub(crate) reporter: Arc<dyn Reporter>,
}

impl PackagingStage {
    pub fn new(config: PackagingConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self { config, reporter }
    }
}

#[async_trait::async_trait]
impl PipelineStage for PackagingStage {
    fn name(&self) -> &str {
        "Packaging"
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        let records = ctx.records();
        let packager = Packager::new(&ctx.input_path, &ctx.output_path, &self.config);
        let summary = packager
            .package(&records, self.reporter.as_ref())
            .with_context(|| {
                format!(
                    "Failed to package optimized modules into {}",
                    ctx.output_path.display()
                )
            })?;

        ctx.metadata.insert(
            "compiled_artifacts".to_string(),
            serde_json::json!(summary.count(ArtifactKind::Compiled)),
        );
        ctx.metadata.insert(
            "source_fallbacks".to_string(),
            serde_json::json!(
                summary.count(ArtifactKind::Emitted) + summary.count(ArtifactKind::CopyFallback)
            ),
        );
        ctx.package = Some(summary);

        Ok(ctx)
    }

    fn validate(&self, ctx: &PipelineContext) -> Result<ValidationResult> {
        let expected = ctx.records().len();
        let written = ctx
            .package
            .as_ref()
            .map(|summary| summary.files.iter().filter(|f| f.output.exists()).count())
            .unwrap_or(0);
        let passed = ctx.output_path.is_dir() && written == expected;

        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed,
            message: if passed {
                format!("{} modules packaged", written)
            } else {
                format!("Only {} of {} modules found in output", written, expected)
            },
            details: None,
        })
    }
}
