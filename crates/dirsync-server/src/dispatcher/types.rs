//! Data types for batch dispatch.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::DispatcherSettings;
use crate::pool::QueueMode;

/// Result of one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageOutcome {
    /// Number of items the package processed.
    Processed(u64),
    /// The package did no countable work; excluded from the total.
    Skipped,
}

/// Errors returned by a package worker. The package contributes zero.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    /// Every item of the package failed.
    #[error("package {package_index}: all {failures} item(s) failed")]
    PackageFailed { package_index: usize, failures: usize },

    #[error("package {package_index}: {message}")]
    Other {
        package_index: usize,
        message: String,
    },
}

/// Processes one package of work items.
#[async_trait]
pub trait PackageWorker<T>: Send + Sync + 'static {
    async fn process(&self, package_index: usize, items: Vec<T>)
        -> Result<PackageOutcome, WorkerError>;
}

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Name of the pool packages are submitted to
    pub pool_name: String,
    /// Queue mode used when the pool is first created
    pub queue_mode: QueueMode,
    /// Base sleep between monitor passes
    pub poll_interval: Duration,
    /// Upper bound for the scaled sleep
    pub max_poll_interval: Duration,
    /// Overall time limit for one dispatch
    pub deadline: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_name: "identity-sync".to_string(),
            queue_mode: QueueMode::Rendezvous,
            poll_interval: Duration::from_millis(100),
            max_poll_interval: Duration::from_secs(5),
            deadline: None,
        }
    }
}

impl DispatchConfig {
    pub fn from_settings(settings: &DispatcherSettings) -> Self {
        Self {
            pool_name: settings.pool_name.clone(),
            queue_mode: settings.queue_mode(),
            poll_interval: settings.poll_interval(),
            max_poll_interval: settings.max_poll_interval(),
            deadline: settings.deadline(),
        }
    }

    pub fn with_pool_name(mut self, name: impl Into<String>) -> Self {
        self.pool_name = name.into();
        self
    }

    pub fn with_queue_mode(mut self, mode: QueueMode) -> Self {
        self.queue_mode = mode;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration, max: Duration) -> Self {
        self.poll_interval = interval;
        self.max_poll_interval = max;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Summary of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sum of `Processed` counts over collected packages.
    pub completed: u64,
    /// Packages submitted.
    pub packages: usize,
    /// Packages that reported `Skipped`.
    pub skipped_packages: usize,
    /// Packages that returned an error, panicked or could not be submitted.
    pub failed_packages: usize,
    /// The cancellation token fired before all packages were collected.
    pub interrupted: bool,
    /// The deadline passed before all packages were collected.
    pub timed_out: bool,
}

impl DispatchReport {
    /// Whether every package was collected.
    pub fn is_complete(&self) -> bool {
        !self.interrupted && !self.timed_out
    }
}
