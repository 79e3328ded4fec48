//! Conversion task module for wav2flac
//!
//! One task takes one [`WorkItem`] through the pipeline: idempotence guard,
//! encode, output verification, archive. Every path ends in a
//! [`ConversionOutcome`]; nothing is propagated to the caller.

use crate::archive::{archive_original, ArchiveError};
use crate::encode::{self, CompressionLevel, EncodeError};
use crate::hardware::AcceleratorHint;
use crate::runlog::RunLog;
use crate::scan::WorkItem;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Skip reason reported by the idempotence guard
pub const OUTPUT_EXISTS_REASON: &str = "output already exists";

/// Everything a conversion needs besides the item itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// FLAC compression level
    pub compression: CompressionLevel,
    /// Accelerator hint detected once for the run
    pub hint: AcceleratorHint,
    /// Encoder executable
    pub encoder: PathBuf,
    /// Destination for verified originals
    pub archive_dir: PathBuf,
}

/// Category of a failed conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Encoder exited non-zero or was killed
    Encoder,
    /// Encoder reported success but the output is missing or empty
    Verification,
    /// Anything else (I/O, spawn failure, worker crash)
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Encoder => "encoder",
            FailureKind::Verification => "verification",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

/// Result of one conversion task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Succeeded { output: PathBuf, archived: PathBuf },
    Skipped { reason: String },
    Failed { kind: FailureKind, message: String },
}

impl ConversionOutcome {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        ConversionOutcome::Failed {
            kind,
            message: message.into(),
        }
    }
}

/// Internal error type; mapped onto [`ConversionOutcome::Failed`]
#[derive(Debug, Error)]
enum TaskError {
    #[error("{0}")]
    Encode(#[from] EncodeError),

    #[error("{0}")]
    Verification(String),

    #[error("{0}")]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TaskError {
    fn kind(&self) -> FailureKind {
        match self {
            TaskError::Encode(EncodeError::Failed { .. } | EncodeError::Terminated { .. }) => {
                FailureKind::Encoder
            }
            TaskError::Verification(_) => FailureKind::Verification,
            TaskError::Encode(EncodeError::Io(_)) | TaskError::Archive(_) | TaskError::Io(_) => {
                FailureKind::Unexpected
            }
        }
    }

    fn message(&self) -> String {
        match self {
            TaskError::Encode(e @ (EncodeError::Failed { .. } | EncodeError::Terminated { .. })) => {
                match e.stderr() {
                    Some(stderr) if !stderr.is_empty() => stderr.to_string(),
                    _ => e.to_string(),
                }
            }
            TaskError::Encode(EncodeError::Io(e)) => format!("failed to start encoder: {}", e),
            other => other.to_string(),
        }
    }

    fn into_outcome(self) -> ConversionOutcome {
        ConversionOutcome::failed(self.kind(), self.message())
    }
}

/// Check that the encoder actually produced something
fn verify_output(output: &Path) -> Result<(), TaskError> {
    let metadata = match fs::metadata(output) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TaskError::Verification(format!(
                "encoder exited successfully but produced no output: {}",
                output.display()
            )));
        }
        Err(e) => return Err(TaskError::Io(e)),
    };

    if metadata.len() == 0 {
        // An empty file would trip the idempotence guard on the next run
        remove_partial_output(output);
        return Err(TaskError::Verification(format!(
            "encoder exited successfully but output is empty: {}",
            output.display()
        )));
    }

    Ok(())
}

fn remove_partial_output(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => tracing::debug!(path = %output.display(), "Removed partial output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %output.display(), error = %e, "Failed to remove partial output"),
    }
}

fn run_pipeline(item: &WorkItem, ctx: &TaskContext, log: &RunLog) -> Result<ConversionOutcome, TaskError> {
    let output = item.output_path();

    if output.try_exists()? {
        return Ok(ConversionOutcome::Skipped {
            reason: OUTPUT_EXISTS_REASON.to_string(),
        });
    }

    let invocation = encode::build_with_program(
        ctx.encoder.as_os_str(),
        item.path(),
        &output,
        ctx.compression,
        ctx.hint,
    );
    tracing::debug!(input = %item, args = %invocation.display_args(), "Running encoder");
    if let Err(e) = encode::run(&invocation) {
        // Whatever is at the output path now came from this failed attempt
        remove_partial_output(&output);
        return Err(e.into());
    }

    verify_output(&output)?;
    log.info(format!("Converted: {} -> {}", item, output.display()));

    let archived = archive_original(item.path(), &ctx.archive_dir)?;

    Ok(ConversionOutcome::Succeeded { output, archived })
}

/// Write the outcome of `item` to the run log
pub fn record_outcome(log: &RunLog, item: &WorkItem, outcome: &ConversionOutcome) {
    match outcome {
        ConversionOutcome::Succeeded { archived, .. } => {
            log.info(format!("Archived original to: {}", archived.display()));
        }
        ConversionOutcome::Skipped { reason } => {
            log.warn(format!("Skipping {} ({}): {}", item, reason, item.output_path().display()));
        }
        ConversionOutcome::Failed { kind, message } => {
            log.error(format!("Conversion failed [{}] {}: {}", kind.as_str(), item, message));
        }
    }
}

/// Convert one WAV file to FLAC and archive the original.
///
/// Steps:
/// 1. Skip when the `.flac` counterpart already exists
/// 2. Run the encoder (non-zero exit -> `Failed(Encoder)`)
/// 3. Verify the output exists and is non-empty (`Failed(Verification)` otherwise)
/// 4. Move the original into the archive directory, last
///
/// The outcome is also written to `log`.
pub fn convert(item: &WorkItem, ctx: &TaskContext, log: &RunLog) -> ConversionOutcome {
    let outcome = run_pipeline(item, ctx, log).unwrap_or_else(TaskError::into_outcome);
    record_outcome(log, item, &outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_shape() {
        let outcome = ConversionOutcome::failed(FailureKind::Verification, "empty output");
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            json,
            r#"{"status":"failed","kind":"verification","message":"empty output"}"#
        );

        let back: ConversionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_encoder_failure_message_prefers_stderr() {
        let err = TaskError::Encode(EncodeError::Failed {
            code: 1,
            stderr: "in.wav: Invalid data found when processing input".to_string(),
        });
        assert_eq!(err.kind(), FailureKind::Encoder);
        assert_eq!(err.message(), "in.wav: Invalid data found when processing input");

        let silent = TaskError::Encode(EncodeError::Failed {
            code: 3,
            stderr: String::new(),
        });
        assert!(silent.message().contains("exit code 3"));
    }

    #[test]
    fn test_spawn_failure_is_unexpected() {
        let err = TaskError::Encode(EncodeError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            "No such file or directory",
        )));
        assert_eq!(err.kind(), FailureKind::Unexpected);
        assert!(err.message().starts_with("failed to start encoder"));
    }

    #[test]
    fn test_verify_output_rejects_missing_and_empty() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.flac");
        assert!(matches!(verify_output(&missing), Err(TaskError::Verification(_))));

        let empty = temp_dir.path().join("empty.flac");
        fs::File::create(&empty).unwrap();
        assert!(matches!(verify_output(&empty), Err(TaskError::Verification(_))));
        assert!(!empty.exists(), "empty output should be removed");

        let good = temp_dir.path().join("good.flac");
        fs::write(&good, b"fLaC").unwrap();
        assert!(verify_output(&good).is_ok());
    }

    #[test]
    fn test_remove_partial_output_tolerates_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let partial = temp_dir.path().join("partial.flac");
        fs::write(&partial, b"fL").unwrap();

        remove_partial_output(&partial);
        assert!(!partial.exists());

        // Second call hits NotFound and stays quiet
        remove_partial_output(&partial);
        assert!(!partial.exists());
    }
}
