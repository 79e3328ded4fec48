//! Scanner module for discovering WAV files under a scan root.
//!
//! Walks the tree eagerly, pruning the archive directory so originals moved
//! there by an earlier run are never picked up again.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Source extension (matched case-insensitively)
pub const SOURCE_EXTENSION: &str = "wav";

/// Extension of converted files
pub const TARGET_EXTENSION: &str = "flac";

/// Errors that abort discovery.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan root could not be resolved.
    #[error("Cannot resolve scan root {path}: {source}")]
    Root { path: PathBuf, source: io::Error },

    /// A directory in the tree could not be read.
    #[error("Directory scan failed: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One discovered source file, by absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(PathBuf);

impl WorkItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Converted counterpart: same directory, `.flac` extension.
    pub fn output_path(&self) -> PathBuf {
        self.0.with_extension(TARGET_EXTENSION)
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Checks if a file has the source extension (case-insensitive).
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
        .unwrap_or(false)
}

/// Absolute form of `path` for comparisons; canonical when it exists.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    match path.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(e) if e.kind() == io::ErrorKind::NotFound => std::path::absolute(path),
        Err(e) => Err(e),
    }
}

/// Discovers all source files under `root`, skipping `archive_dir`.
///
/// This function:
/// - Canonicalizes the root so every yielded path is absolute
/// - Prunes the directory whose absolute path equals the archive directory
/// - Filters files by `.wav` extension (case-insensitive)
/// - Sorts entries by file name for a stable order
/// - Fails as a whole on the first unreadable directory
pub fn discover(root: &Path, archive_dir: &Path) -> Result<Vec<WorkItem>, ScanError> {
    let root = root.canonicalize().map_err(|source| ScanError::Root {
        path: root.to_path_buf(),
        source,
    })?;
    let archive = absolute(archive_dir).map_err(|source| ScanError::Root {
        path: archive_dir.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.path() == archive));

    let mut items = Vec::new();
    for entry in walker {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        if is_source_file(entry.path()) {
            items.push(WorkItem::new(entry.into_path()));
        }
    }

    Ok(items)
}
