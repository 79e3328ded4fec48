//! wav2flac
//!
//! Batch conversion of WAV files to FLAC through an external encoder. Verified
//! originals are moved into an archive directory, and every worker writes to a
//! shared run log that is merged into a dated master log at the end.

pub mod archive;
pub mod batch;
pub mod concurrency;
pub mod convert;
pub mod encode;
pub mod hardware;
pub mod pool;
pub mod runlog;
pub mod scan;
pub mod worker;

pub use wav2flac_config as config;
pub use wav2flac_config::Config;
pub use archive::{archive_original, ArchiveError};
pub use batch::{run_batch, run_plan, BatchError, BatchPlan, BatchSummary};
pub use concurrency::{derive_plan, PoolPlan};
pub use convert::{convert, ConversionOutcome, FailureKind, TaskContext};
pub use encode::{CompressionLevel, EncodeError, EncoderInvocation};
pub use hardware::AcceleratorHint;
pub use pool::{IsolationMode, WorkerPool};
pub use runlog::{Level, LogMergeError, RunLog, RunLogError, RunLogSession};
pub use scan::{discover, ScanError, WorkItem};
pub use worker::{format_report, run_worker, WorkerError, WorkerLauncher, WorkerRequest};
