//! Batch run sequence for wav2flac
//!
//! Resolves the scan root and archive directory, detects the accelerator hint
//! once, discovers work, and drains it through the worker pool.

use crate::concurrency::{derive_plan, PoolPlan};
use crate::config::Config;
use crate::convert::{ConversionOutcome, TaskContext};
use crate::encode::{CompressionLevel, InvalidCompressionLevel};
use crate::hardware::{self, AcceleratorHint};
use crate::pool::{IsolationMode, WorkerPool};
use crate::runlog::RunLog;
use crate::scan::{self, ScanError, WorkItem};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Fatal errors that stop a run before any file is dispatched
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to resolve input directory {path}: {source}")]
    Root { path: PathBuf, source: io::Error },

    #[error("Input path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to resolve archive directory {path}: {source}")]
    ArchiveDir { path: PathBuf, source: io::Error },

    #[error("Invalid configuration: {0}")]
    Compression(#[from] InvalidCompressionLevel),

    #[error("File discovery failed: {0}")]
    Scan(#[from] ScanError),
}

/// Per-outcome counts for a finished run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Every item with its outcome, in discovery order
    pub results: Vec<(WorkItem, ConversionOutcome)>,
}

impl BatchSummary {
    pub fn from_results(results: Vec<(WorkItem, ConversionOutcome)>) -> Self {
        let mut summary = Self::default();
        for (_, outcome) in &results {
            match outcome {
                ConversionOutcome::Succeeded { .. } => summary.succeeded += 1,
                ConversionOutcome::Skipped { .. } => summary.skipped += 1,
                ConversionOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary.results = results;
        summary
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} converted, {} skipped, {} failed",
            self.total(),
            self.succeeded,
            self.skipped,
            self.failed
        )
    }
}

/// Inputs of one batch run after configuration has been merged
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Absolute scan root
    pub root: PathBuf,
    /// Absolute archive directory
    pub archive_dir: PathBuf,
    pub compression: CompressionLevel,
    pub pool: PoolPlan,
}

impl BatchPlan {
    /// Validate `root` and resolve everything the run needs from `cfg`
    pub fn resolve(root: &Path, cfg: &Config) -> Result<Self, BatchError> {
        let root = scan::absolute(root).map_err(|source| BatchError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(BatchError::NotADirectory(root));
        }

        let archive_dir = cfg.archive.resolve(&root);
        let archive_dir =
            scan::absolute(&archive_dir).map_err(|source| BatchError::ArchiveDir {
                path: archive_dir.clone(),
                source,
            })?;

        let compression = CompressionLevel::new(cfg.encoder.compression_level)?;

        Ok(Self {
            root,
            archive_dir,
            compression,
            pool: derive_plan(cfg),
        })
    }
}

/// Run a whole batch, detecting the accelerator hint first
pub async fn run_batch(
    root: &Path,
    cfg: &Config,
    mode: IsolationMode,
    log: &RunLog,
) -> Result<BatchSummary, BatchError> {
    let plan = BatchPlan::resolve(root, cfg)?;
    let hint = tokio::task::spawn_blocking(hardware::detect)
        .await
        .unwrap_or(AcceleratorHint::Unknown);
    run_plan(plan, cfg, hint, mode, log).await
}

/// Run a resolved batch with a known hint
pub async fn run_plan(
    plan: BatchPlan,
    cfg: &Config,
    hint: AcceleratorHint,
    mode: IsolationMode,
    log: &RunLog,
) -> Result<BatchSummary, BatchError> {
    log.info(format!("Detected accelerator: {}", hint));

    let items = scan::discover(&plan.root, &plan.archive_dir)?;
    log.info(format!(
        "Found {} files to convert in {}",
        items.len(),
        plan.root.display()
    ));

    let ctx = Arc::new(TaskContext {
        compression: plan.compression,
        hint,
        encoder: cfg.encoder.program.clone(),
        archive_dir: plan.archive_dir.clone(),
    });

    log.info(format!(
        "Starting {} workers ({} mode, compression level {})",
        plan.pool.workers,
        mode.as_str(),
        plan.compression
    ));
    let pool = WorkerPool::new(plan.pool, mode);
    let results = pool.run(items, ctx, log.clone()).await;

    let summary = BatchSummary::from_results(results);
    if summary.has_failures() {
        log.warn(format!("Finished with failures: {}", summary));
    } else {
        log.info(format!("Finished: {}", summary));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::FailureKind;
    use tempfile::TempDir;

    #[test]
    fn test_summary_counts() {
        let results = vec![
            (
                WorkItem::new("/m/a.wav"),
                ConversionOutcome::Succeeded {
                    output: PathBuf::from("/m/a.flac"),
                    archived: PathBuf::from("/m/WAV_Raw/a.wav"),
                },
            ),
            (
                WorkItem::new("/m/b.wav"),
                ConversionOutcome::Skipped {
                    reason: "output already exists".to_string(),
                },
            ),
            (
                WorkItem::new("/m/c.wav"),
                ConversionOutcome::failed(FailureKind::Encoder, "bad header"),
            ),
        ];

        let summary = BatchSummary::from_results(results);
        assert_eq!((summary.succeeded, summary.skipped, summary.failed), (1, 1, 1));
        assert!(summary.has_failures());
        assert_eq!(
            summary.to_string(),
            "3 files: 1 converted, 1 skipped, 1 failed"
        );
    }

    #[test]
    fn test_resolve_rejects_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let result = BatchPlan::resolve(&missing, &Config::default());
        assert!(matches!(result, Err(BatchError::NotADirectory(_))));
    }

    #[test]
    fn test_resolve_rejects_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.wav");
        std::fs::write(&file, b"RIFF").unwrap();
        let result = BatchPlan::resolve(&file, &Config::default());
        assert!(matches!(result, Err(BatchError::NotADirectory(_))));
    }

    #[test]
    fn test_resolve_anchors_archive_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let plan = BatchPlan::resolve(temp_dir.path(), &Config::default()).unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        assert_eq!(plan.root, root);
        assert_eq!(plan.archive_dir, root.join("WAV_Raw"));
        assert_eq!(plan.compression.get(), 6);
        assert!(plan.pool.workers >= 1);
    }

    #[test]
    fn test_resolve_rejects_bad_compression() {
        let temp_dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.encoder.compression_level = 13;
        let result = BatchPlan::resolve(temp_dir.path(), &cfg);
        assert!(matches!(result, Err(BatchError::Compression(_))));
    }
}
