//! Worker pool module for wav2flac
//!
//! Runs conversion tasks with concurrency limiting via semaphore, either on
//! the blocking thread pool or in isolated worker processes.

use crate::concurrency::PoolPlan;
use crate::convert::{convert, record_outcome, ConversionOutcome, FailureKind, TaskContext};
use crate::runlog::RunLog;
use crate::scan::WorkItem;
use crate::worker::{WorkerLauncher, WorkerRequest};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Where conversions execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolationMode {
    /// Shared-memory workers on the blocking thread pool
    Threads,
    /// One worker process per item
    Processes(WorkerLauncher),
}

impl IsolationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationMode::Threads => "threads",
            IsolationMode::Processes(_) => "processes",
        }
    }
}

/// Fixed-size pool dispatching one conversion per work item
///
/// Uses a tokio Semaphore to limit the number of conversions in flight.
/// Individual failures never stop the pool; every item yields an outcome.
pub struct WorkerPool {
    /// Semaphore for limiting concurrent conversions
    semaphore: Arc<Semaphore>,
    /// Thread or process isolation
    mode: Arc<IsolationMode>,
}

impl WorkerPool {
    pub fn new(plan: PoolPlan, mode: IsolationMode) -> Self {
        let permits = plan.workers.max(1) as usize;
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            mode: Arc::new(mode),
        }
    }

    /// Convert every item and wait until all of them have an outcome.
    ///
    /// Results come back in input order. Outcomes the pool has to synthesize
    /// itself (panicked task, crashed worker process) are written to `log`
    /// here; all others were logged by the task.
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        ctx: Arc<TaskContext>,
        log: RunLog,
    ) -> Vec<(WorkItem, ConversionOutcome)> {
        let handles: Vec<(WorkItem, JoinHandle<ConversionOutcome>)> = items
            .into_iter()
            .map(|item| {
                let handle = tokio::spawn(execute_one(
                    self.semaphore.clone(),
                    self.mode.clone(),
                    item.clone(),
                    ctx.clone(),
                    log.clone(),
                ));
                (item, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (item, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    let outcome = ConversionOutcome::failed(
                        FailureKind::Unexpected,
                        format!("worker task panicked: {}", join_err),
                    );
                    record_outcome(&log, &item, &outcome);
                    outcome
                }
            };
            results.push((item, outcome));
        }
        results
    }
}

async fn execute_one(
    semaphore: Arc<Semaphore>,
    mode: Arc<IsolationMode>,
    item: WorkItem,
    ctx: Arc<TaskContext>,
    log: RunLog,
) -> ConversionOutcome {
    // Respect the pool size
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            let outcome = ConversionOutcome::failed(FailureKind::Unexpected, e.to_string());
            record_outcome(&log, &item, &outcome);
            return outcome;
        }
    };

    tracing::debug!(input = %item, mode = mode.as_str(), "Dispatching conversion");

    match mode.as_ref() {
        IsolationMode::Threads => {
            let task_log = log.clone();
            let task_item = item.clone();
            let result =
                tokio::task::spawn_blocking(move || convert(&task_item, &ctx, &task_log)).await;
            match result {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    let outcome = ConversionOutcome::failed(
                        FailureKind::Unexpected,
                        format!("conversion thread panicked: {}", join_err),
                    );
                    record_outcome(&log, &item, &outcome);
                    outcome
                }
            }
        }
        IsolationMode::Processes(launcher) => {
            let request = WorkerRequest {
                item: item.clone(),
                context: ctx.as_ref().clone(),
            };
            match launcher.execute(log.path(), &request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let outcome = ConversionOutcome::failed(FailureKind::Unexpected, e.to_string());
                    record_outcome(&log, &item, &outcome);
                    outcome
                }
            }
        }
    }
}
