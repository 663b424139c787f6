//! Packager: assembles the deployable output directory.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PackagingConfig;
use crate::error::OptimizeError;
use crate::reporter::Reporter;

/// Extension of compiled extension modules on this platform.
pub fn compiled_extension() -> &'static str {
    if cfg!(windows) {
        "pyd"
    } else {
        "so"
    }
}

/// Find the extension module built next to `source`, e.g.
/// `mod.cpython-312-x86_64-linux-gnu.so` or `mod.so` for `mod.py`.
pub fn find_compiled_artifact(source: &Path) -> Option<PathBuf> {
    let stem = source.file_stem()?.to_str()?;
    let dir = match source.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let pattern = format!(
        "{}/{}.*",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(stem)
    );

    let ext = compiled_extension();
    let mut matches: Vec<PathBuf> = glob::glob(&pattern)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext))
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// How one record ended up in the output directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Compiled extension copied
    Compiled,
    /// No compiled extension found; emitted text written
    Emitted,
    /// Copying the compiled extension failed; emitted text written
    CopyFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagedFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageSummary {
    pub files: Vec<PackagedFile>,
    pub auxiliary_copied: Vec<PathBuf>,
    pub auxiliary_missing: Vec<PathBuf>,
}

impl PackageSummary {
    pub fn count(&self, kind: ArtifactKind) -> usize {
        self.files.iter().filter(|f| f.kind == kind).count()
    }
}

pub struct Packager {
    project_root: PathBuf,
    output_root: PathBuf,
    auxiliary_files: Vec<PathBuf>,
    require_auxiliary_files: bool,
}

impl Packager {
    pub fn new(project_root: &Path, output_root: &Path, config: &PackagingConfig) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            auxiliary_files: config.auxiliary_files.clone(),
            require_auxiliary_files: config.require_auxiliary_files,
        }
    }

    /// `source` relative to the project root, placed under the output root.
    pub fn mirrored_path(&self, source: &Path) -> PathBuf {
        let relative = source
            .strip_prefix(&self.project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                source
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| source.to_path_buf())
            });
        self.output_root.join(relative)
    }

    /// Write every record, then the auxiliary files. Existing files in the
    /// output directory are overwritten.
    pub fn package(
        &self,
        records: &IndexMap<PathBuf, String>,
        reporter: &dyn Reporter,
    ) -> Result<PackageSummary, OptimizeError> {
        fs::create_dir_all(&self.output_root)
            .map_err(|e| OptimizeError::io(&self.output_root, e))?;

        let mut summary = PackageSummary::default();
        for (source, emitted) in records {
            summary
                .files
                .push(self.package_file(source, emitted, reporter)?);
        }

        self.copy_auxiliary(&mut summary, reporter)?;

        reporter.info(&format!(
            "Optimized package created at: {}",
            self.output_root.display()
        ));
        reporter.info(
            "You can now include this directory in your CI/CD pipeline for further processing or deployment.",
        );
        Ok(summary)
    }

    fn package_file(
        &self,
        source: &Path,
        emitted: &str,
        reporter: &dyn Reporter,
    ) -> Result<PackagedFile, OptimizeError> {
        let output = self.mirrored_path(source);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| OptimizeError::io(parent, e))?;
        }

        if let Some(artifact) = find_compiled_artifact(source) {
            let compiled_output = output.with_extension(compiled_extension());
            match fs::copy(&artifact, &compiled_output) {
                Ok(_) => {
                    reporter.info(&format!(
                        "Copied optimized module: {}",
                        compiled_output.display()
                    ));
                    return Ok(PackagedFile {
                        source: source.to_path_buf(),
                        output: compiled_output,
                        kind: ArtifactKind::Compiled,
                    });
                }
                Err(e) => {
                    reporter.error(
                        &format!("Failed to copy compiled file {}", artifact.display()),
                        &e,
                    );
                    write_text(&output, emitted)?;
                    reporter.info(&format!(
                        "Fell back to emitted source: {}",
                        output.display()
                    ));
                    return Ok(PackagedFile {
                        source: source.to_path_buf(),
                        output,
                        kind: ArtifactKind::CopyFallback,
                    });
                }
            }
        }

        write_text(&output, emitted)?;
        reporter.info(&format!(
            "No compiled file found, using emitted source: {}",
            output.display()
        ));
        Ok(PackagedFile {
            source: source.to_path_buf(),
            output,
            kind: ArtifactKind::Emitted,
        })
    }

    fn copy_auxiliary(
        &self,
        summary: &mut PackageSummary,
        reporter: &dyn Reporter,
    ) -> Result<(), OptimizeError> {
        for file in &self.auxiliary_files {
            let source = self.project_root.join(file);
            let Some(name) = file.file_name() else {
                continue;
            };
            let destination = self.output_root.join(name);

            let result = if source.is_file() {
                fs::copy(&source, &destination)
                    .map(|_| ())
                    .map_err(|e| OptimizeError::io(&source, e))
            } else {
                Err(OptimizeError::MissingAuxiliary(source.clone()))
            };

            match result {
                Ok(()) => summary.auxiliary_copied.push(destination),
                Err(e) if self.require_auxiliary_files => return Err(e),
                Err(e) => {
                    reporter.error("Skipping auxiliary file", &e);
                    summary.auxiliary_missing.push(source);
                }
            }
        }
        Ok(())
    }
}

fn write_text(path: &Path, content: &str) -> Result<(), OptimizeError> {
    fs::write(path, content).map_err(|e| OptimizeError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{Level, MemoryReporter};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        project: PathBuf,
        output: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        let output = temp.path().join("out");
        fs::create_dir_all(project.join("pkg")).unwrap();
        fs::write(project.join("setup.py"), "from setuptools import setup\n").unwrap();
        fs::write(project.join("README.md"), "# demo\n").unwrap();
        Fixture {
            _temp: temp,
            project,
            output,
        }
    }

    fn records(entries: &[(&Path, &str)]) -> IndexMap<PathBuf, String> {
        entries
            .iter()
            .map(|(p, c)| (p.to_path_buf(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_mirrored_path() {
        let packager = Packager::new(
            Path::new("/proj"),
            Path::new("/out"),
            &PackagingConfig::default(),
        );
        assert_eq!(
            packager.mirrored_path(Path::new("/proj/pkg/mod.py")),
            PathBuf::from("/out/pkg/mod.py")
        );
        assert_eq!(
            packager.mirrored_path(Path::new("/elsewhere/mod.py")),
            PathBuf::from("/out/mod.py")
        );
    }

    #[test]
    fn test_fallback_writes_emitted_text_verbatim() {
        let fx = fixture();
        let source = fx.project.join("pkg/mod.py");
        fs::write(&source, "def f(x: int): return x\n").unwrap();
        let emitted = "# cython: language_level=3\ndef f(intx):\n    \"cpdef object\"\n    return x\n\n";

        let reporter = MemoryReporter::new();
        let packager = Packager::new(&fx.project, &fx.output, &PackagingConfig::default());
        let summary = packager
            .package(&records(&[(&source, emitted)]), &reporter)
            .unwrap();

        assert_eq!(summary.count(ArtifactKind::Emitted), 1);
        assert_eq!(
            fs::read_to_string(fx.output.join("pkg/mod.py")).unwrap(),
            emitted
        );
        assert!(fx.output.join("setup.py").exists());
        assert!(fx.output.join("README.md").exists());
    }

    #[test]
    fn test_compiled_artifact_preferred() {
        let fx = fixture();
        let source = fx.project.join("pkg/fast.py");
        fs::write(&source, "x = 1\n").unwrap();
        let ext = compiled_extension();
        let artifact = fx
            .project
            .join(format!("pkg/fast.cpython-312-x86_64-linux-gnu.{}", ext));
        fs::write(&artifact, b"\x7fELF").unwrap();

        let reporter = MemoryReporter::new();
        let packager = Packager::new(&fx.project, &fx.output, &PackagingConfig::default());
        let summary = packager
            .package(&records(&[(&source, "emitted")]), &reporter)
            .unwrap();

        let expected = fx.output.join(format!("pkg/fast.{}", ext));
        assert_eq!(summary.files[0].kind, ArtifactKind::Compiled);
        assert_eq!(summary.files[0].output, expected);
        assert_eq!(fs::read(&expected).unwrap(), b"\x7fELF");
        assert!(!fx.output.join("pkg/fast.py").exists());
    }

    #[test]
    fn test_failed_artifact_copy_falls_back_to_emitted_text() {
        let fx = fixture();
        let source = fx.project.join("pkg/fast.py");
        fs::write(&source, "x = 1\n").unwrap();
        let ext = compiled_extension();
        fs::write(fx.project.join(format!("pkg/fast.{}", ext)), b"\x7fELF").unwrap();
        // A directory where the extension should go makes the copy fail.
        fs::create_dir_all(fx.output.join(format!("pkg/fast.{}", ext))).unwrap();
        let emitted = "# cython: language_level=3\nx = 1\n";

        let reporter = MemoryReporter::new();
        let packager = Packager::new(&fx.project, &fx.output, &PackagingConfig::default());
        let summary = packager
            .package(&records(&[(&source, emitted)]), &reporter)
            .unwrap();

        assert_eq!(summary.files[0].kind, ArtifactKind::CopyFallback);
        assert_eq!(summary.files[0].output, fx.output.join("pkg/fast.py"));
        assert_eq!(
            fs::read_to_string(fx.output.join("pkg/fast.py")).unwrap(),
            emitted
        );
        assert!(reporter
            .messages(Level::Error)
            .iter()
            .any(|m| m.starts_with("Failed to copy compiled file")));
    }

    #[test]
    fn test_find_compiled_artifact_ignores_other_modules() {
        let fx = fixture();
        let ext = compiled_extension();
        fs::write(fx.project.join("pkg/a.py"), "").unwrap();
        fs::write(fx.project.join("pkg/a.pyx"), "").unwrap();
        fs::write(fx.project.join(format!("pkg/ab.{}", ext)), "").unwrap();

        assert!(find_compiled_artifact(&fx.project.join("pkg/a.py")).is_none());

        fs::write(fx.project.join(format!("pkg/a.{}", ext)), "").unwrap();
        assert_eq!(
            find_compiled_artifact(&fx.project.join("pkg/a.py")),
            Some(fx.project.join(format!("pkg/a.{}", ext)))
        );
    }

    #[test]
    fn test_existing_output_is_overwritten() {
        let fx = fixture();
        let source = fx.project.join("a.py");
        fs::write(&source, "").unwrap();
        fs::create_dir_all(&fx.output).unwrap();
        fs::write(fx.output.join("a.py"), "stale").unwrap();

        let packager = Packager::new(&fx.project, &fx.output, &PackagingConfig::default());
        packager
            .package(&records(&[(&source, "fresh")]), &MemoryReporter::new())
            .unwrap();

        assert_eq!(fs::read_to_string(fx.output.join("a.py")).unwrap(), "fresh");
    }

    #[test]
    fn test_missing_auxiliary_aborts_when_required() {
        let fx = fixture();
        fs::remove_file(fx.project.join("setup.py")).unwrap();
        let source = fx.project.join("a.py");
        fs::write(&source, "").unwrap();

        let packager = Packager::new(&fx.project, &fx.output, &PackagingConfig::default());
        let err = packager
            .package(&records(&[(&source, "emitted")]), &MemoryReporter::new())
            .unwrap_err();

        assert!(matches!(err, OptimizeError::MissingAuxiliary(ref p) if p.ends_with("setup.py")));
        // Records are written before the auxiliary files are copied.
        assert!(fx.output.join("a.py").exists());
    }

    #[test]
    fn test_missing_auxiliary_skipped_when_optional() {
        let fx = fixture();
        fs::remove_file(fx.project.join("README.md")).unwrap();
        let config = PackagingConfig {
            require_auxiliary_files: false,
            ..PackagingConfig::default()
        };

        let reporter = MemoryReporter::new();
        let packager = Packager::new(&fx.project, &fx.output, &config);
        let summary = packager.package(&IndexMap::new(), &reporter).unwrap();

        assert_eq!(summary.auxiliary_copied, vec![fx.output.join("setup.py")]);
        assert_eq!(summary.auxiliary_missing, vec![fx.project.join("README.md")]);
        assert_eq!(reporter.messages(Level::Error).len(), 1);
    }
}
