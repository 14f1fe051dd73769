//! Partitioning and the submit/drain loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::types::{DispatchConfig, DispatchReport, PackageOutcome, PackageWorker, WorkerError};
use crate::observability::{DISPATCH_ITEMS_TOTAL, DISPATCH_PACKAGE_FAILURES_TOTAL};
use crate::pool::PoolRegistry;

type PackageHandle = JoinHandle<Result<PackageOutcome, WorkerError>>;

/// Items per package: at least `recommended`, and large enough that
/// `max_workers` packages cover the whole worklist. Zero inputs count as one.
pub fn package_size(item_count: usize, max_workers: usize, recommended: usize) -> usize {
    let workers = max_workers.max(1);
    recommended.max(1).max(item_count.div_ceil(workers))
}

/// Splits `items` into consecutive packages of `size` (the last may be shorter).
pub fn partition<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut packages = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        packages.push(items.by_ref().take(size).collect());
    }
    packages
}

/// Monitor sleep: `base` scaled by how far packages exceed the recommended
/// size, capped at `max`.
pub fn poll_interval_for(
    base: Duration,
    max: Duration,
    package_size: usize,
    recommended: usize,
) -> Duration {
    let factor = (package_size / recommended.max(1)).max(1);
    let factor = u32::try_from(factor).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

async fn until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Runs worklists across a named worker pool.
#[derive(Debug)]
pub struct BatchDispatcher {
    pools: Arc<PoolRegistry>,
    config: DispatchConfig,
}

impl BatchDispatcher {
    pub fn new(pools: Arc<PoolRegistry>, config: DispatchConfig) -> Self {
        Self { pools, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Partitions `items`, runs every package on the pool and sums the results.
    ///
    /// The pool is created with `max_workers` workers on first use and reused
    /// afterwards. Failed and panicked packages contribute zero; skipped
    /// packages are counted separately.
    #[instrument(
        skip(self, items, worker, cancel),
        fields(pool = %self.config.pool_name, item_count = items.len())
    )]
    pub async fn dispatch<T, W>(
        &self,
        items: Vec<T>,
        max_workers: usize,
        recommended_package_size: usize,
        worker: Arc<W>,
        cancel: &CancellationToken,
    ) -> DispatchReport
    where
        T: Send + 'static,
        W: PackageWorker<T>,
    {
        let mut report = DispatchReport::default();
        if items.is_empty() {
            return report;
        }

        let size = package_size(items.len(), max_workers, recommended_package_size);
        let interval = poll_interval_for(
            self.config.poll_interval,
            self.config.max_poll_interval,
            size,
            recommended_package_size,
        );
        let deadline = self.config.deadline.map(|limit| Instant::now() + limit);
        let pool =
            self.pools
                .get_or_create(&self.config.pool_name, max_workers, self.config.queue_mode);

        let packages = partition(items, size);
        debug!(
            packages = packages.len(),
            package_size = size,
            workers = pool.size(),
            "Submitting packages"
        );

        let mut pending: Vec<Option<(usize, PackageHandle)>> = Vec::with_capacity(packages.len());
        for (index, package) in packages.into_iter().enumerate() {
            let worker = Arc::clone(&worker);
            let submission = pool.submit(async move { worker.process(index, package).await });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.interrupted = true;
                    break;
                }
                _ = until_deadline(deadline) => {
                    report.timed_out = true;
                    break;
                }
                submitted = submission => match submitted {
                    Ok(handle) => {
                        report.packages += 1;
                        pending.push(Some((index, handle)));
                    }
                    Err(err) => {
                        warn!(package = index, error = %err, "Package submission failed");
                        metrics::counter!(DISPATCH_PACKAGE_FAILURES_TOTAL).increment(1);
                        report.failed_packages += 1;
                    }
                },
            }
        }

        loop {
            collect_finished(&mut pending, &mut report).await;
            if !report.is_complete() || pending.iter().all(Option::is_none) {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => report.interrupted = true,
                _ = until_deadline(deadline) => report.timed_out = true,
                _ = sleep(interval) => {}
            }
        }

        let abandoned = pending.iter().filter(|slot| slot.is_some()).count();
        if report.interrupted {
            warn!(
                completed = report.completed,
                abandoned, "Dispatch interrupted, returning partial total"
            );
        } else if report.timed_out {
            warn!(
                completed = report.completed,
                abandoned, "Dispatch deadline passed, returning partial total"
            );
        } else {
            info!(
                completed = report.completed,
                packages = report.packages,
                skipped = report.skipped_packages,
                failed = report.failed_packages,
                "Dispatch finished"
            );
        }

        metrics::counter!(DISPATCH_ITEMS_TOTAL).increment(report.completed);
        report
    }
}

/// Takes every finished handle out of `pending` and folds its result into `report`.
async fn collect_finished(
    pending: &mut [Option<(usize, PackageHandle)>],
    report: &mut DispatchReport,
) {
    for slot in pending.iter_mut() {
        let Some((index, handle)) = slot.take_if(|(_, handle)| handle.is_finished()) else {
            continue;
        };

        match handle.await {
            Ok(Ok(PackageOutcome::Processed(count))) => report.completed += count,
            Ok(Ok(PackageOutcome::Skipped)) => report.skipped_packages += 1,
            Ok(Err(err)) => {
                warn!(package = index, error = %err, "Package failed");
                metrics::counter!(DISPATCH_PACKAGE_FAILURES_TOTAL).increment(1);
                report.failed_packages += 1;
            }
            Err(err) => {
                warn!(
                    package = index,
                    panicked = err.is_panic(),
                    "Package task did not complete"
                );
                metrics::counter!(DISPATCH_PACKAGE_FAILURES_TOTAL).increment(1);
                report.failed_packages += 1;
            }
        }
    }
}
