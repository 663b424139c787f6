use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::OptimizeError;
use crate::pipeline::ValidationStrategy;

/// Name of the optional configuration file looked up in the project root.
pub const CONFIG_FILENAME: &str = "cyopt.toml";

/// cyopt project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CyoptConfig {
    /// Configuration file version
    pub version: String,

    /// Source tree settings
    pub source: SourceConfig,

    /// Rewrite pass settings
    pub rewrite: RewriteConfig,

    /// External compiler settings
    pub compiler: CompilerConfig,

    /// Output packaging settings
    pub packaging: PackagingConfig,

    /// Stage execution settings
    pub pipeline: PipelineConfig,
}

impl Default for CyoptConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            source: SourceConfig::default(),
            rewrite: RewriteConfig::default(),
            compiler: CompilerConfig::default(),
            packaging: PackagingConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory names never descended into
    pub exclude: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            exclude: vec![
                ".git".to_string(),
                "__pycache__".to_string(),
                ".venv".to_string(),
                "venv".to_string(),
                ".tox".to_string(),
                "build".to_string(),
                "dist".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Decorator that selects `cdef` over `cpdef`
    pub strict_marker: String,

    /// Callee substituted for `range` in `for` loops
    pub parallel_range: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            strict_marker: "cython.ccall".to_string(),
            parallel_range: "cython.parallel.prange".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Compiler executable
    pub program: String,

    /// Python language level passed as a directive
    pub language_level: u8,

    pub boundscheck: bool,
    pub wraparound: bool,
    pub nonecheck: bool,

    /// Emit the HTML annotation report next to each module
    pub annotate: bool,

    /// Interpreter used to locate the numpy headers
    pub python: String,

    /// Explicit numpy include directory (skips interpreter discovery)
    pub numpy_include: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "cythonize".to_string(),
            language_level: 3,
            boundscheck: false,
            wraparound: false,
            nonecheck: false,
            annotate: true,
            python: "python3".to_string(),
            numpy_include: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Files copied from the project root into the output root
    pub auxiliary_files: Vec<PathBuf>,

    /// Abort the run when an auxiliary file is missing
    pub require_auxiliary_files: bool,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            auxiliary_files: vec![PathBuf::from("setup.py"), PathBuf::from("README.md")],
            require_auxiliary_files: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// What a failed stage validation does to the run
    pub validation: ValidationStrategy,
}

impl CyoptConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, OptimizeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| OptimizeError::io(path, e))?;
        toml::from_str(&content).map_err(|e| OptimizeError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `cyopt.toml` from `project_root`.
    /// Returns the defaults if the file does not exist, `Err` if malformed.
    pub fn load_optional(project_root: &Path) -> Result<Self, OptimizeError> {
        let path = project_root.join(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CyoptConfig::default();

        assert_eq!(config.version, "1.0");
        assert_eq!(config.rewrite.strict_marker, "cython.ccall");
        assert_eq!(config.rewrite.parallel_range, "cython.parallel.prange");
        assert_eq!(config.compiler.program, "cythonize");
        assert_eq!(config.compiler.language_level, 3);
        assert!(!config.compiler.boundscheck);
        assert!(!config.compiler.wraparound);
        assert!(!config.compiler.nonecheck);
        assert!(config.compiler.annotate);
        assert!(config.compiler.numpy_include.is_none());
        assert!(config.packaging.require_auxiliary_files);
        assert_eq!(config.pipeline.validation, ValidationStrategy::ContinueOnError);
        assert_eq!(
            config.packaging.auxiliary_files,
            vec![PathBuf::from("setup.py"), PathBuf::from("README.md")]
        );
    }

    #[test]
    fn test_default_excludes_cover_virtualenvs() {
        let config = SourceConfig::default();
        assert!(config.exclude.contains(&"__pycache__".to_string()));
        assert!(config.exclude.contains(&".venv".to_string()));
        assert!(config.exclude.contains(&"venv".to_string()));
    }

    #[test]
    fn test_load_optional_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = CyoptConfig::load_optional(temp.path()).unwrap();
        assert_eq!(config.compiler.program, "cythonize");
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILENAME),
            "[packaging]\nrequire_auxiliary_files = false\n\n[compiler]\nannotate = false\n",
        )
        .unwrap();

        let config = CyoptConfig::load_optional(temp.path()).unwrap();

        assert!(!config.packaging.require_auxiliary_files);
        assert!(!config.compiler.annotate);
        assert_eq!(config.compiler.program, "cythonize");
        assert_eq!(config.packaging.auxiliary_files.len(), 2);
        assert_eq!(config.rewrite.strict_marker, "cython.ccall");
    }

    #[test]
    fn test_load_validation_strategy() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILENAME),
            "[pipeline]\nvalidation = \"stop_on_error\"\n",
        )
        .unwrap();

        let config = CyoptConfig::load_optional(temp.path()).unwrap();
        assert_eq!(config.pipeline.validation, ValidationStrategy::StopOnError);

        std::fs::write(
            temp.path().join(CONFIG_FILENAME),
            "[pipeline]\nvalidation = \"none\"\n",
        )
        .unwrap();
        let config = CyoptConfig::load_optional(temp.path()).unwrap();
        assert_eq!(config.pipeline.validation, ValidationStrategy::None);
    }

    #[test]
    fn test_unknown_validation_strategy_is_config_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILENAME),
            "[pipeline]\nvalidation = \"sometimes\"\n",
        )
        .unwrap();

        let err = CyoptConfig::load_optional(temp.path()).unwrap_err();
        assert!(matches!(err, OptimizeError::Config { .. }));
    }

    #[test]
    fn test_load_malformed_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILENAME), "[compiler\nprogram = ").unwrap();

        let err = CyoptConfig::load_optional(temp.path()).unwrap_err();
        assert!(matches!(err, OptimizeError::Config { .. }));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);

        let mut config = CyoptConfig::default();
        config.compiler.numpy_include = Some(PathBuf::from("/opt/numpy/include"));
        config.rewrite.strict_marker = "ccall".to_string();
        config.save(&path).unwrap();

        let loaded = CyoptConfig::load(&path).unwrap();
        assert_eq!(
            loaded.compiler.numpy_include,
            Some(PathBuf::from("/opt/numpy/include"))
        );
        assert_eq!(loaded.rewrite.strict_marker, "ccall");
    }
}
