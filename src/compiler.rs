//! Build driver: writes the `.pyx` file and runs the Cython compiler on it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::CompilerConfig;
use crate::emit::py_bool;
use crate::error::OptimizeError;
use crate::reporter::Reporter;

/// Extension of the intermediate file written next to each source.
pub const INTERMEDIATE_EXTENSION: &str = "pyx";

/// Detected tool information
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: String,
}

/// Detect a single tool on `PATH`
pub fn detect_tool(name: &str) -> Option<ToolInfo> {
    let path = match which::which(name) {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => return None,
    };

    Some(ToolInfo {
        name: name.to_string(),
        version: get_tool_version(name),
        path,
    })
}

/// Get tool version by running --version
fn get_tool_version(name: &str) -> Option<String> {
    let output = Command::new(name).arg("--version").output().ok()?;

    if !output.status.success() {
        return None;
    }

    // "cythonize 3.0.11", "Cython version 3.0.11" or just "3.0.11"
    let stdout = String::from_utf8_lossy(&output.stdout);
    let version_line = stdout.lines().next()?;
    let version = version_line.split_whitespace().last()?.to_string();

    Some(version)
}

/// Run a tool command and capture output
pub fn run_tool(
    tool_name: &str,
    args: &[String],
    envs: &[(String, String)],
) -> Result<String> {
    let mut cmd = Command::new(tool_name);
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = cmd
        .output()
        .with_context(|| format!("Failed to run tool: {}", tool_name))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "Tool '{}' failed with exit code {:?}: {}",
            tool_name,
            output.status.code(),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Ask the interpreter where numpy keeps its C headers.
pub fn discover_numpy_include(python: &str) -> Result<PathBuf> {
    let args = vec![
        "-c".to_string(),
        "import numpy; print(numpy.get_include())".to_string(),
    ];
    let stdout = run_tool(python, &args, &[])?;
    let include = stdout.trim();
    if include.is_empty() {
        anyhow::bail!("'{}' printed no numpy include directory", python);
    }
    Ok(PathBuf::from(include))
}

/// `pkg/mod.py` -> `pkg/mod.pyx`
pub fn intermediate_path(source: &Path) -> PathBuf {
    source.with_extension(INTERMEDIATE_EXTENSION)
}

/// Compiles emitted text into a native extension beside the source.
pub trait ExtensionCompiler: Send + Sync {
    fn name(&self) -> &str;

    /// Write the intermediate file for `source` and compile it.
    /// Returns the intermediate path on success.
    fn compile(
        &self,
        source: &Path,
        emitted: &str,
        reporter: &dyn Reporter,
    ) -> std::result::Result<PathBuf, OptimizeError>;
}

/// `cythonize` driven with fixed directives; always rebuilds.
#[derive(Debug, Clone)]
pub struct CythonCompiler {
    config: CompilerConfig,
    tool: Option<ToolInfo>,
    numpy_include: Option<PathBuf>,
}

impl CythonCompiler {
    /// Locate the compiler and the numpy headers once for the whole run.
    pub fn detect(config: &CompilerConfig, reporter: &dyn Reporter) -> Self {
        let tool = detect_tool(&config.program);
        match &tool {
            Some(info) => reporter.info(&format!(
                "Using {} at {} (version: {})",
                info.name,
                info.path,
                info.version.as_deref().unwrap_or("unknown")
            )),
            None => reporter.info(&format!(
                "{} not found in PATH; modules will be packaged as source",
                config.program
            )),
        }

        let numpy_include = match &config.numpy_include {
            Some(dir) => Some(dir.clone()),
            None if tool.is_some() => match discover_numpy_include(&config.python) {
                Ok(dir) => {
                    reporter.debug(&format!("numpy headers: {}", dir.display()));
                    Some(dir)
                }
                Err(e) => {
                    reporter.error(
                        "Could not locate numpy headers, compiling without them",
                        &*e,
                    );
                    None
                }
            },
            None => None,
        };

        Self::with_tool(config.clone(), tool, numpy_include)
    }

    pub fn with_tool(
        config: CompilerConfig,
        tool: Option<ToolInfo>,
        numpy_include: Option<PathBuf>,
    ) -> Self {
        Self {
            config,
            tool,
            numpy_include,
        }
    }

    /// Command-line arguments for compiling `pyx` in place.
    pub fn arguments(&self, pyx: &Path) -> Vec<String> {
        let mut args = vec!["-i".to_string(), "-f".to_string()];
        if self.config.annotate {
            args.push("-a".to_string());
        }
        let directives = [
            format!("language_level={}", self.config.language_level),
            format!("boundscheck={}", py_bool(self.config.boundscheck)),
            format!("wraparound={}", py_bool(self.config.wraparound)),
            format!("nonecheck={}", py_bool(self.config.nonecheck)),
        ];
        for directive in directives {
            args.push("-X".to_string());
            args.push(directive);
        }
        args.push(pyx.to_string_lossy().to_string());
        args
    }

    /// Extra environment pointing the C compiler at the numpy headers.
    pub fn environment(&self) -> Vec<(String, String)> {
        let Some(include) = &self.numpy_include else {
            return Vec::new();
        };
        let flag = format!("-I{}", include.display());
        let cflags = match std::env::var("CFLAGS") {
            Ok(existing) if !existing.trim().is_empty() => format!("{} {}", existing, flag),
            _ => flag,
        };
        vec![("CFLAGS".to_string(), cflags)]
    }
}

impl ExtensionCompiler for CythonCompiler {
    fn name(&self) -> &str {
        &self.config.program
    }

    fn compile(
        &self,
        source: &Path,
        emitted: &str,
        reporter: &dyn Reporter,
    ) -> std::result::Result<PathBuf, OptimizeError> {
        let pyx = intermediate_path(source);
        std::fs::write(&pyx, emitted).map_err(|e| OptimizeError::io(&pyx, e))?;

        let Some(tool) = &self.tool else {
            return Err(OptimizeError::CompilerUnavailable(self.config.program.clone()));
        };

        let args = self.arguments(&pyx);
        reporter.debug(&format!("Running {} {}", tool.path, args.join(" ")));

        run_tool(&tool.path, &args, &self.environment()).map_err(|e| OptimizeError::Compile {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(pyx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::MemoryReporter;
    use tempfile::TempDir;

    fn compiler(tool: Option<ToolInfo>) -> CythonCompiler {
        CythonCompiler::with_tool(CompilerConfig::default(), tool, None)
    }

    #[test]
    fn test_intermediate_path() {
        assert_eq!(
            intermediate_path(Path::new("pkg/mod.py")),
            PathBuf::from("pkg/mod.pyx")
        );
    }

    #[test]
    fn test_arguments_pin_directives_and_force() {
        let args = compiler(None).arguments(Path::new("/src/a.pyx"));

        assert_eq!(
            args,
            vec![
                "-i",
                "-f",
                "-a",
                "-X",
                "language_level=3",
                "-X",
                "boundscheck=False",
                "-X",
                "wraparound=False",
                "-X",
                "nonecheck=False",
                "/src/a.pyx",
            ]
        );
    }

    #[test]
    fn test_arguments_without_annotation() {
        let config = CompilerConfig {
            annotate: false,
            ..CompilerConfig::default()
        };
        let args = CythonCompiler::with_tool(config, None, None).arguments(Path::new("a.pyx"));
        assert!(!args.contains(&"-a".to_string()));
    }

    #[test]
    fn test_environment_adds_numpy_include() {
        let with_include = CythonCompiler::with_tool(
            CompilerConfig::default(),
            None,
            Some(PathBuf::from("/opt/numpy/include")),
        );
        let env = with_include.environment();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].0, "CFLAGS");
        assert!(env[0].1.ends_with("-I/opt/numpy/include"));

        assert!(compiler(None).environment().is_empty());
    }

    #[test]
    fn test_unavailable_compiler_still_writes_intermediate() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.py");
        std::fs::write(&source, "x = 1\n").unwrap();

        let reporter = MemoryReporter::new();
        let err = compiler(None)
            .compile(&source, "emitted text\n", &reporter)
            .unwrap_err();

        assert!(matches!(err, OptimizeError::CompilerUnavailable(ref p) if p == "cythonize"));
        assert_eq!(
            std::fs::read_to_string(temp.path().join("a.pyx")).unwrap(),
            "emitted text\n"
        );
    }

    #[test]
    fn test_detect_missing_tool() {
        assert!(detect_tool("cyopt-definitely-not-installed-tool").is_none());
    }

    #[test]
    fn test_run_tool_missing_binary_fails() {
        let result = run_tool("cyopt-definitely-not-installed-tool", &[], &[]);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_compile_success_and_failure_follow_exit_status() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.py");
        std::fs::write(&source, "x = 1\n").unwrap();
        let reporter = MemoryReporter::new();

        let ok = compiler(detect_tool("true"));
        let pyx = ok.compile(&source, "x = 1\n", &reporter).unwrap();
        assert_eq!(pyx, temp.path().join("a.pyx"));

        let failing = compiler(detect_tool("false"));
        let err = failing.compile(&source, "x = 1\n", &reporter).unwrap_err();
        assert!(matches!(err, OptimizeError::Compile { .. }));
    }

    #[test]
    fn test_detect_reports_missing_compiler() {
        let config = CompilerConfig {
            program: "cyopt-definitely-not-installed-tool".to_string(),
            ..CompilerConfig::default()
        };
        let reporter = MemoryReporter::new();
        let detected = CythonCompiler::detect(&config, &reporter);

        let temp = TempDir::new().unwrap();
        let err = detected
            .compile(&temp.path().join("a.py"), "x = 1\n", &reporter)
            .unwrap_err();
        assert!(matches!(err, OptimizeError::CompilerUnavailable(_)));
        assert!(reporter
            .messages(crate::reporter::Level::Info)
            .iter()
            .any(|m| m.contains("not found in PATH")));
    }
}
