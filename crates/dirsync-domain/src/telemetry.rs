//! Metric names emitted by the domain crate.

pub const SCOPE_REBUILDS_TOTAL: &str = "dirsync_scope_rebuilds_total";
pub const SCOPE_REBUILD_FAILURES_TOTAL: &str = "dirsync_scope_rebuild_failures_total";
pub const LEASE_CONTENTION_TOTAL: &str = "dirsync_lease_contention_total";
pub const RESYNC_REJECTED_TOTAL: &str = "dirsync_resync_rejected_total";

/// Registers metric descriptions with the installed recorder.
///
/// Optional; call once at startup for nicer exporter output.
pub fn register_domain_metrics() {
    metrics::describe_counter!(
        SCOPE_REBUILDS_TOTAL,
        "Total number of completed scope index rebuilds"
    );
    metrics::describe_counter!(
        SCOPE_REBUILD_FAILURES_TOTAL,
        "Total number of scope rebuilds abandoned because the directory fetch failed"
    );
    metrics::describe_counter!(
        LEASE_CONTENTION_TOTAL,
        "Total number of lease claims that found the record already locked"
    );
    metrics::describe_counter!(
        RESYNC_REJECTED_TOTAL,
        "Total number of full resync attempts rejected because another one was running"
    );
}
