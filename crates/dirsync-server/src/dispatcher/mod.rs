//! Bounded batch dispatch over a fixed worker pool.
//!
//! The dispatcher splits a worklist into consecutive packages, submits each
//! package to a named [`WorkerPool`](crate::pool::WorkerPool) and drains the
//! results with a polling monitor loop:
//!
//! 1. **Partition**: `package_size = max(recommended, ceil(n / max_workers))`
//! 2. **Submit**: one pool task per package; a rendezvous pool makes the
//!    submitter wait for a free worker
//! 3. **Drain**: finished tasks are collected once per pass; the loop sleeps
//!    between passes, longer for oversized packages
//!
//! # Interruption
//!
//! Cancelling the [`CancellationToken`](tokio_util::sync::CancellationToken)
//! passed to [`BatchDispatcher::dispatch`] stops submission and draining and
//! returns the partial total. Tasks already submitted keep running. The token
//! is left cancelled for the caller to observe.

mod dispatch;
mod types;

pub use dispatch::{package_size, partition, poll_interval_for, BatchDispatcher};
pub use types::{DispatchConfig, DispatchReport, PackageOutcome, PackageWorker, WorkerError};
