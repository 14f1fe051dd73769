//! Process-wide wiring of the sync components.
//!
//! A [`SyncContext`] is built once at startup from a [`SyncConfig`] and shared
//! by reference (or `Arc`) with whatever drives synchronization. It owns the
//! hierarchy cache, the lease table, the resync gate and the worker pools.

use std::sync::Arc;

use dirsync_domain::{
    Clock, DirectoryClient, FullResyncGate, HierarchyCache, LeaseCoordinator, SystemClock,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ConfigLoadError, SyncConfig};
use crate::dispatcher::{BatchDispatcher, DispatchConfig, DispatchReport};
use crate::pool::PoolRegistry;
use crate::resync::{ResyncError, ResyncOutcome, ScopeResync};
use crate::worker::{IdentityRefresher, IdentitySyncWorker};

pub struct SyncContext {
    config: SyncConfig,
    cache: Arc<HierarchyCache>,
    leases: Arc<LeaseCoordinator>,
    gate: Arc<FullResyncGate>,
    pools: Arc<PoolRegistry>,
    dispatcher: BatchDispatcher,
    resync: ScopeResync,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("cache", &self.cache)
            .field("leases", &self.leases)
            .field("pools", &self.pools.names())
            .finish()
    }
}

impl SyncContext {
    /// Builds the context from an already validated configuration.
    pub fn new(
        config: SyncConfig,
        directory: Arc<dyn DirectoryClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(HierarchyCache::new(
            directory,
            Arc::clone(&clock),
            config.hierarchy_cache_config(),
        ));
        let leases = Arc::new(LeaseCoordinator::new(
            clock,
            config.staleness_window_millis(),
        ));
        let gate = Arc::new(FullResyncGate::new());
        let pools = Arc::new(PoolRegistry::new());
        let dispatcher = BatchDispatcher::new(
            Arc::clone(&pools),
            DispatchConfig::from_settings(&config.dispatcher),
        );
        let resync = ScopeResync::new(Arc::clone(&cache), Arc::clone(&gate));

        info!(
            scopes = config.scopes.len(),
            pool = %config.dispatcher.pool_name,
            workers = config.dispatcher.max_workers,
            "Sync context initialized"
        );

        Self {
            config,
            cache,
            leases,
            gate,
            pools,
            dispatcher,
            resync,
        }
    }

    /// Validates `config` and builds the context on the system clock.
    pub fn from_config(
        config: SyncConfig,
        directory: Arc<dyn DirectoryClient>,
    ) -> Result<Self, ConfigLoadError> {
        config.validate()?;
        Ok(Self::new(config, directory, Arc::new(SystemClock)))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<HierarchyCache> {
        &self.cache
    }

    pub fn leases(&self) -> &Arc<LeaseCoordinator> {
        &self.leases
    }

    pub fn gate(&self) -> &Arc<FullResyncGate> {
        &self.gate
    }

    pub fn pools(&self) -> &Arc<PoolRegistry> {
        &self.pools
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    /// Re-validates `subjects` across the configured pool.
    ///
    /// `owner` identifies this run in lease records.
    pub async fn sync_identities(
        &self,
        subjects: Vec<String>,
        refresher: Arc<dyn IdentityRefresher>,
        owner: &str,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let worker = Arc::new(IdentitySyncWorker::new(
            Arc::clone(&self.leases),
            refresher,
            owner,
        ));
        self.dispatcher
            .dispatch(
                subjects,
                self.config.dispatcher.max_workers,
                self.config.dispatcher.recommended_package_size,
                worker,
                cancel,
            )
            .await
    }

    /// Forces a rebuild of every configured scope unless one is already running.
    pub async fn resync_all(&self, owner: &str) -> Result<ResyncOutcome, ResyncError> {
        self.resync.resync_all(owner).await
    }

    /// Shuts down every worker pool and waits for in-flight packages.
    pub async fn shutdown(&self) {
        self.pools.shutdown_all().await;
        info!("Sync context shut down");
    }
}
