//! Pipeline types and trait definitions.

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::package::PackageSummary;
use crate::rewrite::RewriteStats;

/// Result of running one source file through parse, rewrite, emit and compile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FileOutcome {
    /// Emitted successfully; `compiled` tells whether the build driver succeeded.
    Optimized {
        source: PathBuf,
        emitted: String,
        compiled: bool,
        stats: RewriteStats,
    },
    /// Dropped from the output.
    Skipped { source: PathBuf, reason: String },
}

impl FileOutcome {
    pub fn source(&self) -> &Path {
        match self {
            Self::Optimized { source, .. } | Self::Skipped { source, .. } => source,
        }
    }

    pub fn is_optimized(&self) -> bool {
        matches!(self, Self::Optimized { .. })
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, Self::Optimized { compiled: true, .. })
    }
}

/// Context passed between pipeline stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext {
    /// Project root
    pub input_path: PathBuf,

    /// Output directory
    pub output_path: PathBuf,

    /// One entry per walked file, in walk order
    pub outcomes: Vec<FileOutcome>,

    /// Rewrite counts summed over all optimized files
    pub rewrite_stats: RewriteStats,

    /// Filled in by the packaging stage
    pub package: Option<PackageSummary>,

    /// Validation results
    pub validation_results: Vec<ValidationResult>,

    /// Metadata accumulated during pipeline
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

impl PipelineContext {
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            input_path,
            output_path,
            outcomes: Vec::new(),
            rewrite_stats: RewriteStats::default(),
            package: None,
            validation_results: Vec::new(),
            metadata: std::collections::HashMap::new(),
        }
    }

    /// Record a file outcome, folding its rewrite counts into the totals.
    pub fn record(&mut self, outcome: FileOutcome) {
        if let FileOutcome::Optimized { stats, .. } = &outcome {
            self.rewrite_stats.functions += stats.functions;
            self.rewrite_stats.strict_functions += stats.strict_functions;
            self.rewrite_stats.renamed_params += stats.renamed_params;
            self.rewrite_stats.parallel_loops += stats.parallel_loops;
        }
        self.outcomes.push(outcome);
    }

    /// Optimized file records: source path to emitted text, in walk order.
    pub fn records(&self) -> IndexMap<PathBuf, String> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                FileOutcome::Optimized {
                    source, emitted, ..
                } => Some((source.clone(), emitted.clone())),
                FileOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    /// Get final output artifacts
    pub fn output(&self) -> PipelineOutput {
        PipelineOutput {
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            outcomes: self.outcomes.clone(),
            rewrite_stats: self.rewrite_stats,
            package: self.package.clone(),
            validation_results: self.validation_results.clone(),
            validation_passed: self.validation_results.iter().all(|v| v.passed),
        }
    }
}

/// Validation result from a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub stage: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

/// Final output from the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub outcomes: Vec<FileOutcome>,
    pub rewrite_stats: RewriteStats,
    pub package: Option<PackageSummary>,
    pub validation_results: Vec<ValidationResult>,
    pub validation_passed: bool,
}

/// Validation strategy for pipeline stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStrategy {
    /// Stop on the first failed validation
    StopOnError,
    /// Continue on errors but collect them
    #[default]
    ContinueOnError,
    /// Skip validation
    None,
}

/// Trait for pipeline stages
#[async_trait::async_trait]
pub trait PipelineStage: Send + Sync {
    /// Name of this stage
    fn name(&self) -> &str;

    /// Execute this stage
    async fn execute(&self, ctx: PipelineContext) -> Result<PipelineContext>;

    /// Validate the output of this stage
    fn validate(&self, _ctx: &PipelineContext) -> Result<ValidationResult> {
        // Default: always pass
        Ok(ValidationResult {
            stage: self.name().to_string(),
            passed: true,
            message: "No validation configured".to_string(),
            details: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimized(source: &str, compiled: bool) -> FileOutcome {
        FileOutcome::Optimized {
            source: PathBuf::from(source),
            emitted: format!("# {}\n", source),
            compiled,
            stats: RewriteStats {
                functions: 2,
                strict_functions: 1,
                renamed_params: 3,
                parallel_loops: 1,
            },
        }
    }

    fn skipped(source: &str) -> FileOutcome {
        FileOutcome::Skipped {
            source: PathBuf::from(source),
            reason: "Syntax error".to_string(),
        }
    }

    #[test]
    fn test_pipeline_context_new() {
        let ctx = PipelineContext::new(PathBuf::from("/input"), PathBuf::from("/output"));
        assert_eq!(ctx.input_path, PathBuf::from("/input"));
        assert_eq!(ctx.output_path, PathBuf::from("/output"));
        assert!(ctx.outcomes.is_empty());
        assert!(ctx.package.is_none());
        assert!(ctx.validation_results.is_empty());
        assert!(ctx.metadata.is_empty());
    }

    #[test]
    fn test_record_sums_stats() {
        let mut ctx = PipelineContext::new(PathBuf::from("/in"), PathBuf::from("/out"));
        ctx.record(optimized("/in/a.py", true));
        ctx.record(skipped("/in/b.py"));
        ctx.record(optimized("/in/c.py", false));

        assert_eq!(ctx.outcomes.len(), 3);
        assert_eq!(ctx.rewrite_stats.functions, 4);
        assert_eq!(ctx.rewrite_stats.renamed_params, 6);
        assert_eq!(ctx.rewrite_stats.parallel_loops, 2);
    }

    #[test]
    fn test_records_exclude_skipped_and_keep_order() {
        let mut ctx = PipelineContext::new(PathBuf::from("/in"), PathBuf::from("/out"));
        ctx.record(optimized("/in/z.py", false));
        ctx.record(skipped("/in/broken.py"));
        ctx.record(optimized("/in/a.py", true));

        let records = ctx.records();
        let keys: Vec<_> = records.keys().cloned().collect();
        assert_eq!(keys, vec![PathBuf::from("/in/z.py"), PathBuf::from("/in/a.py")]);
        assert_eq!(records[&PathBuf::from("/in/z.py")], "# /in/z.py\n");
    }

    #[test]
    fn test_file_outcome_accessors() {
        assert!(optimized("a.py", true).is_compiled());
        assert!(!optimized("a.py", false).is_compiled());
        assert!(optimized("a.py", false).is_optimized());
        assert!(!skipped("b.py").is_optimized());
        assert_eq!(skipped("b.py").source(), Path::new("b.py"));
    }

    #[test]
    fn test_pipeline_context_output_with_failed_validation() {
        let mut ctx = PipelineContext::new(PathBuf::from("/input"), PathBuf::from("/output"));
        ctx.validation_results.push(ValidationResult {
            stage: "stage1".to_string(),
            passed: true,
            message: "OK".to_string(),
            details: None,
        });
        ctx.validation_results.push(ValidationResult {
            stage: "stage2".to_string(),
            passed: false,
            message: "Failed".to_string(),
            details: None,
        });
        let output = ctx.output();
        assert!(!output.validation_passed);
        assert_eq!(output.validation_results.len(), 2);
    }

    #[test]
    fn test_pipeline_context_serialization() {
        let mut ctx = PipelineContext::new(PathBuf::from("/input"), PathBuf::from("/output"));
        ctx.record(optimized("/input/a.py", false));
        let json = serde_json::to_string(&ctx).unwrap();
        let deserialized: PipelineContext = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.input_path, PathBuf::from("/input"));
        assert_eq!(deserialized.outcomes, ctx.outcomes);
    }
}
