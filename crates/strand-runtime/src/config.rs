//! Runtime configuration
//!
//! Library defaults with environment overrides.
//!
//! Environment variables (all optional):
//! - `STRAND_WORKERS` — worker thread count
//! - `STRAND_STACK_SIZE` — usable stack bytes per fiber
//! - `STRAND_MAX_FIBERS` — live fiber limit
//! - `STRAND_REMOTE_QUEUE` — per-worker remote ready queue capacity
//! - `STRAND_POLL_BATCH` — epoll events drained per wait

use strand_core::env::env_get;
use strand_core::{SchedError, SchedResult};

mod defaults {
    pub const STACK_SIZE: usize = 256 * 1024;
    pub const MAX_FIBERS: usize = 4096;
    pub const REMOTE_QUEUE: usize = 8192;
    pub const POLL_BATCH: usize = 256;
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Usable stack bytes per fiber (rounded up to a page).
    pub stack_size: usize,
    /// Maximum live fibers.
    pub max_fibers: usize,
    /// Capacity of each worker's cross-thread ready queue.
    pub remote_queue: usize,
    /// epoll events drained per wait.
    pub poll_batch: usize,
}

impl RuntimeConfig {
    /// Library defaults, no environment lookups.
    pub fn new() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            stack_size: defaults::STACK_SIZE,
            max_fibers: defaults::MAX_FIBERS,
            remote_queue: defaults::REMOTE_QUEUE,
            poll_batch: defaults::POLL_BATCH,
        }
    }

    /// Defaults with `STRAND_*` environment overrides applied.
    pub fn from_env() -> Self {
        let base = Self::new();
        Self {
            workers: env_get("STRAND_WORKERS", base.workers),
            stack_size: env_get("STRAND_STACK_SIZE", base.stack_size),
            max_fibers: env_get("STRAND_MAX_FIBERS", base.max_fibers),
            remote_queue: env_get("STRAND_REMOTE_QUEUE", base.remote_queue),
            poll_batch: env_get("STRAND_POLL_BATCH", base.poll_batch),
        }
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn max_fibers(mut self, n: usize) -> Self {
        self.max_fibers = n;
        self
    }

    pub fn validate(&self) -> SchedResult<()> {
        if self.workers == 0 {
            return Err(SchedError::InvalidConfig("workers must be > 0"));
        }
        if self.stack_size < 16 * 1024 {
            return Err(SchedError::InvalidConfig("stack_size must be >= 16 KiB"));
        }
        if self.max_fibers == 0 {
            return Err(SchedError::InvalidConfig("max_fibers must be > 0"));
        }
        if self.remote_queue < self.max_fibers {
            return Err(SchedError::InvalidConfig(
                "remote_queue must be >= max_fibers",
            ));
        }
        if self.poll_batch == 0 {
            return Err(SchedError::InvalidConfig("poll_batch must be > 0"));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
