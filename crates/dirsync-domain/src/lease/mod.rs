//! Claim/release leases over identity sync-state records.
//!
//! Workers use a three-step protocol before re-validating an identity
//! against the directory:
//!
//! 1. [`claim`](LeaseCoordinator::claim) the subject's record;
//! 2. ask [`should_process`](LeaseCoordinator::should_process) whether the
//!    record is stale and was not already held;
//! 3. [`release`](LeaseCoordinator::release) the record, always, even when
//!    the protected work failed. [`LeaseGuard`] does this on drop.
//!
//! No lock is held across the expensive remote call: the record's `locked`
//! flag is the lease, and only the check-then-write on the flag runs under
//! the per-key map lock.
//!
//! # Known Limitation
//!
//! Leases do not expire. A worker that dies between claim and release leaves
//! the record locked, and every later claim for that subject reports
//! `was_already_locked` until the lease is cleared with
//! [`force_release`](LeaseCoordinator::force_release).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::telemetry::LEASE_CONTENTION_TOTAL;

/// Sync state of one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLeaseRecord {
    pub subject_key: String,
    /// Time of creation or of the last release.
    pub last_update_epoch_millis: i64,
    pub locked: bool,
    pub lock_owner: Option<String>,
}

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseClaim {
    /// Record state right after the claim.
    pub record: SyncLeaseRecord,
    /// Whether someone else held the lease before this claim.
    pub was_already_locked: bool,
    /// Whether the record was created by this claim.
    pub freshly_created: bool,
}

impl LeaseClaim {
    /// Whether this caller holds the lease.
    pub fn is_held(&self) -> bool {
        !self.was_already_locked
    }
}

/// Decides whether a claimed record is due for re-validation.
pub fn is_due(claim: &LeaseClaim, now_millis: i64, staleness_window_millis: i64) -> bool {
    !claim.was_already_locked
        && (claim.freshly_created
            || now_millis - claim.record.last_update_epoch_millis > staleness_window_millis)
}

/// Per-subject lease table.
pub struct LeaseCoordinator {
    records: DashMap<String, SyncLeaseRecord>,
    clock: Arc<dyn Clock>,
    staleness_window_millis: i64,
}

impl std::fmt::Debug for LeaseCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseCoordinator")
            .field("records", &self.records.len())
            .field("staleness_window_millis", &self.staleness_window_millis)
            .finish()
    }
}

impl LeaseCoordinator {
    pub fn new(clock: Arc<dyn Clock>, staleness_window_millis: i64) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            staleness_window_millis,
        }
    }

    pub fn staleness_window_millis(&self) -> i64 {
        self.staleness_window_millis
    }

    /// Claims the lease of `subject_key` for `owner`.
    ///
    /// An unlocked or missing record is locked unconditionally, whether or not
    /// the caller ends up doing any work. A record that is already locked is
    /// returned untouched with `was_already_locked` set.
    pub fn claim(&self, subject_key: &str, owner: &str) -> LeaseClaim {
        let now = self.clock.now_millis();

        match self.records.entry(subject_key.to_string()) {
            Entry::Vacant(entry) => {
                let record = SyncLeaseRecord {
                    subject_key: subject_key.to_string(),
                    last_update_epoch_millis: now,
                    locked: true,
                    lock_owner: Some(owner.to_string()),
                };
                entry.insert(record.clone());
                LeaseClaim {
                    record,
                    was_already_locked: false,
                    freshly_created: true,
                }
            }
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if record.locked {
                    metrics::counter!(LEASE_CONTENTION_TOTAL).increment(1);
                    debug!(
                        subject = %subject_key,
                        owner = ?record.lock_owner,
                        "Lease already held"
                    );
                    return LeaseClaim {
                        record: record.clone(),
                        was_already_locked: true,
                        freshly_created: false,
                    };
                }

                record.locked = true;
                record.lock_owner = Some(owner.to_string());
                LeaseClaim {
                    record: record.clone(),
                    was_already_locked: false,
                    freshly_created: false,
                }
            }
        }
    }

    /// Whether the claimer should run the re-validation now.
    pub fn should_process(&self, claim: &LeaseClaim) -> bool {
        is_due(claim, self.clock.now_millis(), self.staleness_window_millis)
    }

    /// Releases a lease obtained by [`claim`](Self::claim).
    ///
    /// A no-op when the claim found the record already locked. Returns whether
    /// the record was unlocked.
    pub fn release(&self, subject_key: &str, was_already_locked: bool) -> bool {
        if was_already_locked {
            return false;
        }

        self.unlock(subject_key, None)
    }

    /// Releases the lease held by `claim`, only while its owner still holds it.
    ///
    /// Unlike [`release`](Self::release), a record that was force-released and
    /// then claimed by another owner is left alone.
    pub fn release_claim(&self, claim: &LeaseClaim) -> bool {
        if claim.was_already_locked {
            return false;
        }
        match claim.record.lock_owner.as_deref() {
            Some(owner) => self.unlock(&claim.record.subject_key, Some(owner)),
            None => false,
        }
    }

    fn unlock(&self, subject_key: &str, expected_owner: Option<&str>) -> bool {
        let Some(mut record) = self.records.get_mut(subject_key) else {
            return false;
        };
        if !record.locked {
            return false;
        }
        if let Some(owner) = expected_owner {
            if record.lock_owner.as_deref() != Some(owner) {
                debug!(
                    subject = %subject_key,
                    owner = ?record.lock_owner,
                    "Lease now held by another owner, not releasing"
                );
                return false;
            }
        }

        record.locked = false;
        record.lock_owner = None;
        record.last_update_epoch_millis = self.clock.now_millis();
        true
    }

    /// Clears a lease regardless of who holds it, without touching the timestamp.
    ///
    /// Intended for operators recovering leases left behind by dead workers.
    /// The bare [`release`](Self::release) does not check the owner, so a worker
    /// that is still alive after this call must release through its
    /// [`LeaseGuard`] or [`release_claim`](Self::release_claim).
    pub fn force_release(&self, subject_key: &str) -> bool {
        let Some(mut record) = self.records.get_mut(subject_key) else {
            return false;
        };
        if !record.locked {
            return false;
        }

        warn!(
            subject = %subject_key,
            owner = ?record.lock_owner,
            "Forcibly releasing lease"
        );
        record.locked = false;
        record.lock_owner = None;
        true
    }

    /// Claims and wraps the result in a guard that releases on drop.
    pub fn claim_guard(&self, subject_key: &str, owner: &str) -> LeaseGuard<'_> {
        let claim = self.claim(subject_key, owner);
        LeaseGuard {
            coordinator: self,
            claim,
            released: false,
        }
    }

    pub fn record(&self, subject_key: &str) -> Option<SyncLeaseRecord> {
        self.records.get(subject_key).map(|r| r.value().clone())
    }

    /// Subjects whose lease is currently held.
    pub fn locked_subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.locked)
            .map(|r| r.key().clone())
            .collect();
        subjects.sort();
        subjects
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Releases its lease when dropped, including during unwinding.
pub struct LeaseGuard<'a> {
    coordinator: &'a LeaseCoordinator,
    claim: LeaseClaim,
    released: bool,
}

impl LeaseGuard<'_> {
    pub fn claim(&self) -> &LeaseClaim {
        &self.claim
    }

    pub fn should_process(&self) -> bool {
        self.coordinator.should_process(&self.claim)
    }

    /// Releases now (normal path).
    pub fn release(mut self) -> bool {
        self.released = true;
        self.coordinator.release_claim(&self.claim)
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.coordinator.release_claim(&self.claim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Barrier;

    const WINDOW: i64 = 60_000;

    fn create_coordinator() -> (Arc<ManualClock>, LeaseCoordinator) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let coordinator = LeaseCoordinator::new(clock.clone(), WINDOW);
        (clock, coordinator)
    }

    // ============================================================
    // Section 1: Claim
    // ============================================================

    #[test]
    fn test_first_claim_creates_locked_record() {
        // Arrange
        let (_clock, leases) = create_coordinator();

        // Act
        let claim = leases.claim("user1", "worker-a");

        // Assert
        assert!(!claim.was_already_locked);
        assert!(claim.freshly_created);
        assert!(claim.record.locked);
        assert_eq!(claim.record.lock_owner.as_deref(), Some("worker-a"));
        assert_eq!(claim.record.last_update_epoch_millis, 1_000_000);
        assert_eq!(leases.len(), 1);
    }

    #[test]
    fn test_claim_of_locked_record_leaves_it_untouched() {
        let (clock, leases) = create_coordinator();
        leases.claim("user1", "worker-a");
        clock.advance(5);

        let second = leases.claim("user1", "worker-b");

        assert!(second.was_already_locked);
        assert!(!second.freshly_created);
        let record = leases.record("user1").unwrap();
        assert_eq!(record.lock_owner.as_deref(), Some("worker-a"));
        assert_eq!(record.last_update_epoch_millis, 1_000_000);
    }

    #[test]
    fn test_claim_of_unlocked_record_locks_it() {
        let (_clock, leases) = create_coordinator();
        let first = leases.claim("user1", "worker-a");
        leases.release("user1", first.was_already_locked);

        let second = leases.claim("user1", "worker-b");

        assert!(!second.was_already_locked);
        assert!(!second.freshly_created);
        assert_eq!(second.record.lock_owner.as_deref(), Some("worker-b"));
    }

    #[test]
    fn test_concurrent_claims_have_single_winner() {
        // Arrange
        let (_clock, leases) = create_coordinator();
        let leases = Arc::new(leases);
        let barrier = Arc::new(Barrier::new(8));

        // Act
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let leases = Arc::clone(&leases);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    leases.claim("user1", &format!("worker-{i}"))
                })
            })
            .collect();
        let claims: Vec<LeaseClaim> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Assert
        let winners: Vec<&LeaseClaim> = claims.iter().filter(|c| !c.was_already_locked).collect();
        assert_eq!(winners.len(), 1);
        let record = leases.record("user1").unwrap();
        assert_eq!(record.lock_owner, winners[0].record.lock_owner);
    }

    // ============================================================
    // Section 2: Release
    // ============================================================

    #[test]
    fn test_release_by_non_owner_is_noop() {
        let (_clock, leases) = create_coordinator();
        leases.claim("user1", "worker-a");
        let loser = leases.claim("user1", "worker-b");

        let released = leases.release("user1", loser.was_already_locked);

        assert!(!released);
        assert!(leases.record("user1").unwrap().locked);
    }

    #[test]
    fn test_release_updates_timestamp() {
        let (clock, leases) = create_coordinator();
        let claim = leases.claim("user1", "worker-a");
        clock.advance(1_500);

        assert!(leases.release("user1", claim.was_already_locked));

        let record = leases.record("user1").unwrap();
        assert!(!record.locked);
        assert_eq!(record.lock_owner, None);
        assert_eq!(record.last_update_epoch_millis, 1_001_500);
        // Second release has nothing left to do.
        assert!(!leases.release("user1", false));
    }

    #[test]
    fn test_release_of_unknown_subject() {
        let (_clock, leases) = create_coordinator();
        assert!(!leases.release("ghost", false));
    }

    #[test]
    fn test_force_release_clears_abandoned_lease() {
        let (_clock, leases) = create_coordinator();
        leases.claim("user1", "dead-worker");
        assert_eq!(leases.locked_subjects(), vec!["user1".to_string()]);

        assert!(leases.force_release("user1"));

        assert!(leases.locked_subjects().is_empty());
        assert!(!leases.claim("user1", "worker-b").was_already_locked);
    }

    // ============================================================
    // Section 3: Staleness gate
    // ============================================================

    #[test]
    fn test_should_process_staleness_cycle() {
        // Arrange
        let (clock, leases) = create_coordinator();

        // Fresh record: always processed.
        let claim = leases.claim("user1", "worker-a");
        assert!(leases.should_process(&claim));
        leases.release("user1", claim.was_already_locked);

        // Right after a claim+release cycle: not stale yet.
        let claim = leases.claim("user1", "worker-a");
        assert!(!leases.should_process(&claim));
        leases.release("user1", claim.was_already_locked);

        // Exactly at the window boundary: still fresh.
        clock.advance(WINDOW);
        let claim = leases.claim("user1", "worker-a");
        assert!(!leases.should_process(&claim));
        leases.release("user1", claim.was_already_locked);

        // Past the window: stale again.
        clock.advance(WINDOW + 1);
        let claim = leases.claim("user1", "worker-a");
        assert!(leases.should_process(&claim));
    }

    #[test]
    fn test_should_process_false_when_already_locked() {
        let (clock, leases) = create_coordinator();
        leases.claim("user1", "worker-a");
        clock.advance(WINDOW * 10);

        let loser = leases.claim("user1", "worker-b");

        assert!(!leases.should_process(&loser));
    }

    #[test]
    fn test_is_due_pure_function() {
        let claim = LeaseClaim {
            record: SyncLeaseRecord {
                subject_key: "u".to_string(),
                last_update_epoch_millis: 0,
                locked: true,
                lock_owner: None,
            },
            was_already_locked: false,
            freshly_created: false,
        };

        assert!(!is_due(&claim, 10, 10));
        assert!(is_due(&claim, 11, 10));
        assert!(claim.is_held());
    }

    // ============================================================
    // Section 4: Guard
    // ============================================================

    #[test]
    fn test_guard_releases_on_drop() {
        let (_clock, leases) = create_coordinator();
        {
            let guard = leases.claim_guard("user1", "worker-a");
            assert!(guard.should_process());
            assert!(leases.record("user1").unwrap().locked);
        }
        assert!(!leases.record("user1").unwrap().locked);
    }

    #[test]
    fn test_guard_releases_during_panic() {
        let (_clock, leases) = create_coordinator();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = leases.claim_guard("user1", "worker-a");
            panic!("refresh blew up");
        }));

        assert!(result.is_err());
        assert!(!leases.record("user1").unwrap().locked);
    }

    #[test]
    fn test_guard_of_loser_does_not_release_owner() {
        let (_clock, leases) = create_coordinator();
        let owner = leases.claim_guard("user1", "worker-a");

        let loser = leases.claim_guard("user1", "worker-b");
        assert!(loser.claim().was_already_locked);
        assert!(!loser.release());

        assert!(leases.record("user1").unwrap().locked);
        assert!(owner.release());
    }

    #[test]
    fn test_guard_after_force_release_leaves_new_owner_alone() {
        // Arrange
        let (_clock, leases) = create_coordinator();
        let stuck = leases.claim_guard("user1", "worker-a");
        assert!(leases.force_release("user1"));
        let fresh = leases.claim("user1", "worker-b");
        assert!(!fresh.was_already_locked);

        // Act
        drop(stuck);

        // Assert
        let record = leases.record("user1").unwrap();
        assert!(record.locked);
        assert_eq!(record.lock_owner.as_deref(), Some("worker-b"));
        assert!(leases.release_claim(&fresh));
        assert!(!leases.record("user1").unwrap().locked);
    }
}
