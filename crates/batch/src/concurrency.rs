//! Concurrency planning module for wav2flac
//!
//! Derives the worker pool size from the configuration and CPU core count.

use crate::config::Config;

/// Pool size chosen for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Number of conversions allowed to run at once
    pub workers: u32,
}

impl PoolPlan {
    /// Derive a pool plan
    ///
    /// `pool.workers` wins when non-zero (the `--threads` flag is merged into
    /// it beforehand), otherwise the logical core count via num_cpus.
    pub fn derive(cfg: &Config) -> Self {
        Self::derive_with_cores(cfg, num_cpus::get() as u32)
    }

    fn derive_with_cores(cfg: &Config, total_cores: u32) -> Self {
        let workers = Some(cfg.pool.workers)
            .filter(|&n| n > 0)
            .unwrap_or(total_cores)
            .max(1);

        Self {
            total_cores,
            workers,
        }
    }
}

/// Public function to derive a pool plan from configuration
pub fn derive_plan(cfg: &Config) -> PoolPlan {
    PoolPlan::derive(cfg)
}
