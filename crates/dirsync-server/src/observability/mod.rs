//! Observability setup for the sync service: structured logging and metric
//! descriptions.

mod logging;

pub use logging::{create_json_layer, init_logging, LoggingConfig};

use metrics::describe_counter;

/// Metric: items counted as processed by the batch dispatcher.
pub const DISPATCH_ITEMS_TOTAL: &str = "dirsync_dispatch_items_total";

/// Metric: dispatched packages that failed or panicked.
pub const DISPATCH_PACKAGE_FAILURES_TOTAL: &str = "dirsync_dispatch_package_failures_total";

/// Registers descriptions for every metric emitted by the workspace.
///
/// Call once at startup after installing a metrics recorder.
pub fn register_metrics() {
    dirsync_domain::telemetry::register_domain_metrics();

    describe_counter!(
        DISPATCH_ITEMS_TOTAL,
        "Total number of work items processed through the batch dispatcher"
    );
    describe_counter!(
        DISPATCH_PACKAGE_FAILURES_TOTAL,
        "Total number of dispatched packages that returned an error or panicked"
    );
}
