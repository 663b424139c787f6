//! Optimization stage - walks the project and turns each module into Cython.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::compiler::{CythonCompiler, ExtensionCompiler};
use crate::config::CyoptConfig;
use crate::emit::CodeEmitter;
use crate::error::OptimizeError;
use crate::pipeline::types::{FileOutcome, PipelineContext, PipelineStage, ValidationResult};
use crate::reporter::Reporter;
use crate::rewrite::{RewriteStats, SignatureRewriter};
use crate::syntax::PythonParser;
use crate::walker::SourceWalker;

/// Parse, rewrite, emit and compile every Python file of the project.
pub struct OptimizationStage {
    pub(crate) config: CyoptConfig,
    pub(crate) compiler: Option<Box<dyn ExtensionCompiler>>,
    pub(crate) reporter: Arc<dyn Reporter>,
}

impl OptimizationStage {
    /// The Cython compiler is located when the stage runs.
    pub fn new(config: CyoptConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config,
            compiler: None,
            reporter,
        }
    }

    pub fn with_compiler(mut self, compiler: Box<dyn ExtensionCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    fn walker(&self, ctx: &PipelineContext) -> SourceWalker {
        SourceWalker::new(&ctx.input_path)
            .exclude_names(self.config.source.exclude.iter().cloned())
            .exclude_dir(&ctx.output_path)
    }

    /// Read, parse, rewrite and emit one file.
    fn transform(
        &self,
        source: &Path,
        parser: &mut PythonParser,
        rewriter: &SignatureRewriter,
        emitter: &CodeEmitter,
    ) -> std::result::Result<(String, RewriteStats), OptimizeError> {
        let text = std::fs::read_to_string(source).map_err(|e| OptimizeError::io(source, e))?;
        let mut module = parser.parse(source, &text)?;
        let stats = rewriter.rewrite(&mut module);
        Ok((emitter.emit(&module), stats))
    }

    fn optimize_file(
        &self,
        source: &Path,
        parser: &mut PythonParser,
        rewriter: &SignatureRewriter,
        emitter: &CodeEmitter,
        compiler: &dyn ExtensionCompiler,
    ) -> FileOutcome {
        let reporter = self.reporter.as_ref();
        reporter.info(&format!("Processing file: {}", source.display()));

        let (emitted, stats) = match self.transform(source, parser, rewriter, emitter) {
            Ok(result) => result,
            Err(e) => {
                reporter.error(&format!("Error processing file {}", source.display()), &e);
                return FileOutcome::Skipped {
                    source: source.to_path_buf(),
                    reason: e.to_string(),
                };
            }
        };

        reporter.debug(&format!(
            "Generated Cython code for {}:\n{}",
            source.display(),
            emitted
        ));

        let compiled = match compiler.compile(source, &emitted, reporter) {
            Ok(pyx) => {
                reporter.info(&format!("Successfully compiled {}", pyx.display()));
                true
            }
            Err(e) => {
                reporter.error(&format!("Compilation failed for {}", source.display()), &e);
                false
            }
        };

        FileOutcome::Optimized {
            source: source.to_path_buf(),
            emitted,
            compiled,
            stats,
        }
    }
}

#[async_trait::async_trait]
impl PipelineStage for OptimizationStage {
    fn name(&self) -> &str {
        "Optimization"
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<PipelineContext> {
        let reporter = self.reporter.as_ref();
        reporter.info(&format!(
            "Optimizing Python sources in {}",
            ctx.input_path.display()
        ));

        let detected;
        let compiler: &dyn ExtensionCompiler = match &self.compiler {
            Some(compiler) => compiler.as_ref(),
            None => {
                detected = CythonCompiler::detect(&self.config.compiler, reporter);
                &detected
            }
        };

        let mut parser = PythonParser::new()?;
        let rewriter = SignatureRewriter::new(&self.config.rewrite);
        let emitter = CodeEmitter::new(&self.config.compiler);

        let mut walk_errors = 0usize;
        for entry in self.walker(&ctx).files() {
            let source = match entry {
                Ok(source) => source,
                Err(e) => {
                    reporter.error("Skipping unreadable directory entry", &*e);
                    walk_errors += 1;
                    continue;
                }
            };
            let outcome = self.optimize_file(&source, &mut parser, &rewriter, &emitter, compiler);
            ctx.record(outcome);
        }

        let optimized = ctx.outcomes.iter().filter(|o| o.is_optimized()).count();
        let compiled = ctx.outcomes.iter().filter(|o| o.is_compiled()).count();
        reporter.info(&format!(
            "Optimized {} of {} files ({} compiled with {})",
            optimized,
            ctx.outcomes.len(),
            compiled,
            compiler.name()
        ));

        ctx.metadata
            .insert("files_walked".to_string(), serde_json::json!(ctx.outcomes.len()));
        ctx.metadata
            .insert("walk_errors".to_string(), serde_json::json!(walk_errors));
        ctx.metadata
            .insert("compiler".to_string(), serde_json::json!(compiler.name()));
        ctx.metadata.insert(
            "rewrite_stats".to_string(),
            serde_json::to_value(ctx.rewrite_stats)?,
        );

        Ok(ctx)
    }

    fn validate(&self, ctx: &PipelineContext) -> Result<ValidationResult> {
        let skipped: Vec<_> = ctx
            .outcomes
            .iter()
            .filter_map(|o| match o {
                FileOutcome::Skipped { source, reason } => Some(serde_json::json!({
                    "source": source,
                    "reason": reason,
                })),
                FileOutcome::Optimized { .. } => None,
            })
            .collect();
        let total = ctx.outcomes.len();
        let passed = skipped.is_empty();

        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed,
            message: format!("{} of {} files optimized", total - skipped.len(), total),
            details: if passed {
                None
            } else {
                Some(serde_json::json!({ "skipped": skipped }))
            },
        })
    }
}
