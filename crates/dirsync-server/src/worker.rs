//! Identity re-validation packages.
//!
//! [`IdentitySyncWorker`] is the [`PackageWorker`] run by the batch dispatcher
//! for identity sync. Each subject goes through the lease protocol: claim,
//! check staleness, refresh, release. The lease is released on every path,
//! including refresh errors and panics.

use std::sync::Arc;

use async_trait::async_trait;
use dirsync_domain::{DirectoryError, LeaseCoordinator};
use tracing::{debug, warn};

use crate::dispatcher::{PackageOutcome, PackageWorker, WorkerError};

/// What a refresh did to the local identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Unchanged,
    /// The identity no longer exists in the directory.
    Removed,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("directory error while refreshing '{subject}': {source}")]
    Directory {
        subject: String,
        #[source]
        source: DirectoryError,
    },

    #[error("refresh of '{subject}' rejected: {message}")]
    Rejected { subject: String, message: String },
}

/// Re-validates one identity against the directory.
#[async_trait]
pub trait IdentityRefresher: Send + Sync {
    async fn refresh(&self, subject: &str) -> Result<RefreshOutcome, RefreshError>;
}

/// Runs the lease protocol around [`IdentityRefresher::refresh`] for every
/// subject of a package.
pub struct IdentitySyncWorker {
    leases: Arc<LeaseCoordinator>,
    refresher: Arc<dyn IdentityRefresher>,
    owner: String,
}

impl IdentitySyncWorker {
    /// `owner` prefixes the lock owner recorded on each lease.
    pub fn new(
        leases: Arc<LeaseCoordinator>,
        refresher: Arc<dyn IdentityRefresher>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            leases,
            refresher,
            owner: owner.into(),
        }
    }
}

#[async_trait]
impl PackageWorker<String> for IdentitySyncWorker {
    async fn process(
        &self,
        package_index: usize,
        subjects: Vec<String>,
    ) -> Result<PackageOutcome, WorkerError> {
        let owner = format!("{}#{}", self.owner, package_index);
        let mut processed = 0u64;
        let mut failures = 0usize;

        for subject in &subjects {
            let lease = self.leases.claim_guard(subject, &owner);
            if !lease.should_process() {
                debug!(subject = %subject, "Identity not due for refresh");
                continue;
            }

            match self.refresher.refresh(subject).await {
                Ok(outcome) => {
                    debug!(subject = %subject, outcome = ?outcome, "Identity refreshed");
                    processed += 1;
                }
                Err(err) => {
                    warn!(subject = %subject, error = %err, "Identity refresh failed");
                    failures += 1;
                }
            }
            lease.release();
        }

        match (processed, failures) {
            (0, 0) => Ok(PackageOutcome::Skipped),
            (0, failures) => Err(WorkerError::PackageFailed {
                package_index,
                failures,
            }),
            (processed, _) => Ok(PackageOutcome::Processed(processed)),
        }
    }
}
