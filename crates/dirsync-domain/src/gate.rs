//! Process-wide single-flight gate for full hierarchy rebuilds.
//!
//! At most one holder at a time. A second claimant is rejected, not queued,
//! so callers either poll or give up. There is no fairness among rejected
//! claimants.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::telemetry::RESYNC_REJECTED_TOTAL;

#[derive(Debug, Default)]
struct GateState {
    claimed: bool,
    owner_name: String,
}

/// Mutual-exclusion flag guarding whole-scope rebuild entry points.
#[derive(Debug, Default)]
pub struct FullResyncGate {
    state: Mutex<GateState>,
}

impl FullResyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the gate for `owner_name`. Returns false if it is already held.
    pub fn try_claim(&self, owner_name: &str) -> bool {
        let mut state = self.state.lock();
        if state.claimed {
            metrics::counter!(RESYNC_REJECTED_TOTAL).increment(1);
            info!(
                owner = %state.owner_name,
                claimant = %owner_name,
                "Full resync already running"
            );
            return false;
        }

        state.claimed = true;
        state.owner_name = owner_name.to_string();
        debug!(owner = %owner_name, "Full resync gate claimed");
        true
    }

    /// Opens the gate, whoever holds it.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.claimed = false;
        state.owner_name.clear();
    }

    pub fn is_claimed(&self) -> bool {
        self.state.lock().claimed
    }

    /// Current holder, if any.
    pub fn owner(&self) -> Option<String> {
        let state = self.state.lock();
        state.claimed.then(|| state.owner_name.clone())
    }

    /// Claims the gate and returns a guard that releases it on drop.
    pub fn try_claim_guard(&self, owner_name: &str) -> Option<GateClaim<'_>> {
        self.try_claim(owner_name).then(|| GateClaim { gate: self })
    }
}

/// Holds the gate until dropped.
#[must_use = "the gate is released as soon as the claim is dropped"]
pub struct GateClaim<'a> {
    gate: &'a FullResyncGate,
}

impl Drop for GateClaim<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
