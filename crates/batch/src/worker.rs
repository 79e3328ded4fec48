//! Isolated worker process protocol
//!
//! In process mode the orchestrator re-runs a worker executable once per item.
//! The child receives the item and task context as JSON on its command line,
//! attaches to the run log by path, converts the file, and prints the outcome
//! as one JSON line on stdout. Its stderr is inherited so console diagnostics
//! stay visible.

use crate::convert::{convert, ConversionOutcome, TaskContext};
use crate::runlog::{RunLog, RunLogError};
use crate::scan::WorkItem;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;

/// Flag carrying the run log sink path
pub const SINK_FLAG: &str = "--sink";

/// Flag carrying the JSON-encoded [`WorkerRequest`]
pub const REQUEST_FLAG: &str = "--request";

/// Errors talking to a worker process
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to encode worker request: {0}")]
    Request(#[source] serde_json::Error),

    #[error("Failed to start worker process: {0}")]
    Spawn(#[from] io::Error),

    #[error("Worker process exited abnormally ({0})")]
    Exit(ExitStatus),

    #[error("Worker process sent an unreadable report: {0}")]
    Report(String),
}

/// One unit of work handed to a worker process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub item: WorkItem,
    pub context: TaskContext,
}

/// How to start a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLauncher {
    /// Worker executable
    pub program: PathBuf,
    /// Arguments placed before the sink and request flags (e.g. a subcommand)
    pub leading_args: Vec<OsString>,
}

impl WorkerLauncher {
    pub fn new(program: impl Into<PathBuf>, leading_args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Launch workers by re-executing the running binary with `subcommand`
    pub fn current_exe(subcommand: &str) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec![subcommand.into()]))
    }

    /// Build the worker command for one request
    pub fn command(&self, sink: &Path, request: &WorkerRequest) -> Result<Command, WorkerError> {
        let payload = serde_json::to_string(request).map_err(WorkerError::Request)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg(SINK_FLAG)
            .arg(sink)
            .arg(REQUEST_FLAG)
            .arg(payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        Ok(cmd)
    }

    /// Run one request in a fresh worker process and wait for its report
    pub async fn execute(
        &self,
        sink: &Path,
        request: &WorkerRequest,
    ) -> Result<ConversionOutcome, WorkerError> {
        let output = self.command(sink, request)?.output().await?;

        if !output.status.success() {
            return Err(WorkerError::Exit(output.status));
        }

        parse_report(&output.stdout)
    }
}

/// Serialize an outcome as the worker's stdout report
pub fn format_report(outcome: &ConversionOutcome) -> serde_json::Result<String> {
    serde_json::to_string(outcome)
}

/// Parse a worker's stdout; the last non-empty line is the report
pub fn parse_report(stdout: &[u8]) -> Result<ConversionOutcome, WorkerError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| WorkerError::Report("empty output".to_string()))?;

    serde_json::from_str(line.trim()).map_err(|e| WorkerError::Report(format!("{}: {:?}", e, line)))
}

/// Child-side entry point: attach to the sink and convert one item
pub fn run_worker(request: &WorkerRequest, sink: &Path) -> Result<ConversionOutcome, RunLogError> {
    let log = RunLog::attach(sink)?;
    Ok(convert(&request.item, &request.context, &log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::FailureKind;
    use crate::encode::CompressionLevel;
    use crate::hardware::AcceleratorHint;

    fn sample_request() -> WorkerRequest {
        WorkerRequest {
            item: WorkItem::new("/music/a b.wav"),
            context: TaskContext {
                compression: CompressionLevel::new(8).unwrap(),
                hint: AcceleratorHint::Intel,
                encoder: PathBuf::from("ffmpeg"),
                archive_dir: PathBuf::from("/music/WAV_Raw"),
            },
        }
    }

    #[test]
    fn test_request_survives_json() {
        let request = sample_request();
        let json = serde_json::to_string(&request).unwrap();
        let back: WorkerRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
        assert!(json.contains(r#""hint":"intel""#));
    }

    #[test]
    fn test_command_layout() {
        let launcher = WorkerLauncher::new("/usr/bin/wav2flac", vec!["worker".into()]);
        let cmd = launcher
            .command(Path::new("/logs/temp_x.txt"), &sample_request())
            .unwrap();
        let std_cmd = cmd.as_std();
        let args: Vec<String> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(std_cmd.get_program(), "/usr/bin/wav2flac");
        assert_eq!(&args[..4], &["worker", SINK_FLAG, "/logs/temp_x.txt", REQUEST_FLAG]);
        let request: WorkerRequest = serde_json::from_str(&args[4]).unwrap();
        assert_eq!(request, sample_request());
    }

    #[test]
    fn test_parse_report_uses_last_line() {
        let outcome = ConversionOutcome::Skipped {
            reason: "output already exists".to_string(),
        };
        let stdout = format!("stray banner\n{}\n\n", format_report(&outcome).unwrap());
        assert_eq!(parse_report(stdout.as_bytes()).unwrap(), outcome);
    }

    #[test]
    fn test_parse_report_rejects_garbage() {
        assert!(matches!(parse_report(b""), Err(WorkerError::Report(_))));
        assert!(matches!(parse_report(b"not json\n"), Err(WorkerError::Report(_))));
    }

    #[tokio::test]
    async fn test_missing_worker_program_is_spawn_error() {
        let launcher = WorkerLauncher::new("/nonexistent/wav2flac-worker", Vec::new());
        let result = launcher
            .execute(Path::new("/tmp/temp_missing.txt"), &sample_request())
            .await;
        assert!(matches!(result, Err(WorkerError::Spawn(_))));
    }

    #[test]
    fn test_run_worker_requires_existing_sink() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = run_worker(&sample_request(), &temp_dir.path().join("temp_absent.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_report_round_trip() {
        let outcome = ConversionOutcome::failed(FailureKind::Encoder, "boom");
        let report = format_report(&outcome).unwrap();
        assert_eq!(parse_report(report.as_bytes()).unwrap(), outcome);
    }
}
