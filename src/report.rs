/// Run summary for an optimization pass
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::package::ArtifactKind;
use crate::pipeline::{FileOutcome, PipelineOutput, ValidationResult};
use crate::rewrite::RewriteStats;

/// What happened to one walked file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// Compiled extension shipped
    Compiled,
    /// Emitted Cython source shipped as the fallback
    Source,
    /// Not shipped
    Skipped,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Compiled => write!(f, "compiled"),
            FileStatus::Source => write!(f, "source"),
            FileStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub status: FileStatus,
    pub detail: Option<String>,
}

/// Optimization report data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub project_name: String,
    pub output_path: PathBuf,
    pub files_walked: usize,
    pub files_optimized: usize,
    pub files_compiled: usize,
    pub files_skipped: usize,
    pub rewrite_stats: RewriteStats,
    pub files: Vec<FileEntry>,
    pub validation: Vec<ValidationResult>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl OptimizationReport {
    pub fn from_output(output: &PipelineOutput) -> Self {
        let project_name = output
            .input_path
            .canonicalize()
            .unwrap_or_else(|_| output.input_path.clone())
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string());

        let shipped_compiled = |source: &Path| {
            output.package.as_ref().is_some_and(|summary| {
                summary
                    .files
                    .iter()
                    .any(|f| f.source == source && f.kind == ArtifactKind::Compiled)
            })
        };

        let files: Vec<FileEntry> = output
            .outcomes
            .iter()
            .map(|outcome| {
                let path = outcome
                    .source()
                    .strip_prefix(&output.input_path)
                    .unwrap_or(outcome.source())
                    .to_path_buf();
                match outcome {
                    FileOutcome::Optimized { source, .. } if shipped_compiled(source) => {
                        FileEntry {
                            path,
                            status: FileStatus::Compiled,
                            detail: None,
                        }
                    }
                    FileOutcome::Optimized { compiled, .. } => FileEntry {
                        path,
                        status: FileStatus::Source,
                        detail: (!compiled).then(|| "compilation failed".to_string()),
                    },
                    FileOutcome::Skipped { reason, .. } => FileEntry {
                        path,
                        status: FileStatus::Skipped,
                        detail: Some(reason.clone()),
                    },
                }
            })
            .collect();

        let count = |status: FileStatus| files.iter().filter(|f| f.status == status).count();
        let files_compiled = count(FileStatus::Compiled);
        let files_skipped = count(FileStatus::Skipped);

        Self {
            project_name,
            output_path: output.output_path.clone(),
            files_walked: files.len(),
            files_optimized: files.len() - files_skipped,
            files_compiled,
            files_skipped,
            rewrite_stats: output.rewrite_stats,
            files,
            validation: output.validation_results.clone(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();

        text.push_str(&format!("OPTIMIZATION REPORT: {}\n", self.project_name));
        text.push_str(&format!(
            "Generated: {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        text.push_str(&"=".repeat(60));
        text.push_str("\n\n");

        text.push_str("SUMMARY\n");
        text.push_str(&"-".repeat(60));
        text.push('\n');
        text.push_str(&format!("Files walked:    {}\n", self.files_walked));
        text.push_str(&format!("Files optimized: {}\n", self.files_optimized));
        text.push_str(&format!("Files compiled:  {}\n", self.files_compiled));
        text.push_str(&format!("Files skipped:   {}\n", self.files_skipped));
        text.push_str(&format!(
            "Functions rewritten: {} ({} cdef)\n",
            self.rewrite_stats.functions, self.rewrite_stats.strict_functions
        ));
        text.push_str(&format!(
            "Parameters renamed:  {}\n",
            self.rewrite_stats.renamed_params
        ));
        text.push_str(&format!(
            "Parallel loops:      {}\n",
            self.rewrite_stats.parallel_loops
        ));
        text.push_str(&format!("Output: {}\n\n", self.output_path.display()));

        if !self.files.is_empty() {
            text.push_str("FILES\n");
            text.push_str(&"-".repeat(60));
            text.push('\n');
            for file in &self.files {
                text.push_str(&format!(
                    "{:9} {}",
                    file.status.to_string(),
                    file.path.display()
                ));
                if let Some(detail) = &file.detail {
                    text.push_str(&format!("  ({})", detail));
                }
                text.push('\n');
            }
            text.push('\n');
        }

        if !self.validation.is_empty() {
            text.push_str("VALIDATION\n");
            text.push_str(&"-".repeat(60));
            text.push('\n');
            for result in &self.validation {
                text.push_str(&format!(
                    "{:13} {:4}  {}\n",
                    result.stage,
                    if result.passed { "ok" } else { "FAIL" },
                    result.message
                ));
            }
        }

        text
    }
}
