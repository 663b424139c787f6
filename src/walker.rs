//! Source tree walker.

use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extension of the files picked up by the walker.
pub const SOURCE_EXTENSION: &str = "py";

/// Enumerates Python sources below a root directory.
#[derive(Debug, Clone)]
pub struct SourceWalker {
    root: PathBuf,
    excluded_names: Vec<String>,
    excluded_dirs: Vec<PathBuf>,
}

impl SourceWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded_names: Vec::new(),
            excluded_dirs: Vec::new(),
        }
    }

    /// Skip every directory with one of these names.
    pub fn exclude_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Skip one specific directory (typically the output root).
    /// Directories that do not exist yet are ignored.
    pub fn exclude_dir(mut self, dir: &Path) -> Self {
        if let Ok(canonical) = dir.canonicalize() {
            self.excluded_dirs.push(canonical);
        }
        self
    }

    /// Lazily yields every `.py` file, in filesystem order.
    pub fn files(&self) -> impl Iterator<Item = Result<PathBuf>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |e| !self.is_excluded(e))
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() && is_source(entry.path()) => {
                    Some(Ok(entry.into_path()))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return false;
        }
        let by_name = entry
            .file_name()
            .to_str()
            .is_some_and(|name| self.excluded_names.iter().any(|n| n == name));
        if by_name {
            return true;
        }
        if self.excluded_dirs.is_empty() {
            return false;
        }
        entry
            .path()
            .canonicalize()
            .map(|p| self.excluded_dirs.contains(&p))
            .unwrap_or(false)
    }
}

fn is_source(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION)
}
