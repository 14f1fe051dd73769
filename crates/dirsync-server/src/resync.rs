//! Whole-hierarchy resync behind the single-flight gate.

use std::collections::BTreeMap;
use std::sync::Arc;

use dirsync_domain::model::DEFAULT_SCOPE;
use dirsync_domain::{DomainError, FullResyncGate, HierarchyCache};
use tracing::{info, instrument, warn};

/// Per-scope results of a completed resync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    /// Scope → number of groups in the rebuilt index.
    pub rebuilt: BTreeMap<String, usize>,
    /// Scope → error message for scopes whose rebuild failed.
    pub failed: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// Another resync holds the gate; nothing was done.
    AlreadyRunning { owner: Option<String> },
    Completed(ResyncSummary),
}

#[derive(Debug, thiserror::Error)]
pub enum ResyncError {
    #[error("full resync failed for every scope ({scopes} attempted)")]
    AllScopesFailed {
        scopes: usize,
        #[source]
        last: DomainError,
    },
}

/// Forces a rebuild of every configured scope, one resync at a time.
#[derive(Debug, Clone)]
pub struct ScopeResync {
    cache: Arc<HierarchyCache>,
    gate: Arc<FullResyncGate>,
}

impl ScopeResync {
    pub fn new(cache: Arc<HierarchyCache>, gate: Arc<FullResyncGate>) -> Self {
        Self { cache, gate }
    }

    /// Rebuilds all configured scopes, or the default scope when none are configured.
    pub async fn resync_all(&self, owner: &str) -> Result<ResyncOutcome, ResyncError> {
        let mut scopes = self.cache.configured_scopes();
        if scopes.is_empty() {
            scopes.push(DEFAULT_SCOPE.to_string());
        }
        self.resync_scopes(owner, &scopes).await
    }

    /// Rebuilds the given scopes while holding the gate.
    ///
    /// A failing scope does not stop the others. The call errors only when
    /// every scope failed.
    #[instrument(skip(self, scopes), fields(scope_count = scopes.len()))]
    pub async fn resync_scopes(
        &self,
        owner: &str,
        scopes: &[String],
    ) -> Result<ResyncOutcome, ResyncError> {
        let Some(_claim) = self.gate.try_claim_guard(owner) else {
            return Ok(ResyncOutcome::AlreadyRunning {
                owner: self.gate.owner(),
            });
        };

        let mut summary = ResyncSummary::default();
        let mut last_error = None;
        for scope in scopes {
            match self.cache.resolve_scope(scope, true).await {
                Ok(index) => {
                    summary.rebuilt.insert(index.scope().to_string(), index.len());
                }
                Err(err) => {
                    warn!(scope = %scope, error = %err, "Scope resync failed");
                    summary.failed.insert(scope.clone(), err.to_string());
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(last) if summary.rebuilt.is_empty() => Err(ResyncError::AllScopesFailed {
                scopes: scopes.len(),
                last,
            }),
            _ => {
                info!(
                    rebuilt = summary.rebuilt.len(),
                    failed = summary.failed.len(),
                    "Full resync finished"
                );
                Ok(ResyncOutcome::Completed(summary))
            }
        }
    }
}
