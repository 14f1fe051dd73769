//! Per-scope hierarchy cache with rebuild on demand.
//!
//! The cache owns one published [`ScopedEntryIndex`] per scope. A scope is
//! rebuilt from the directory when it has never been loaded, when its index is
//! empty, or when the caller forces it.
//!
//! # Consistency
//!
//! Every `resolve_scope` call for a scope runs under that scope's async mutex,
//! so the check-and-maybe-rebuild sequence is atomic per scope. A rebuild
//! builds a fresh index off to the side and publishes it with a single
//! pointer swap: concurrent readers see either the previous index or the
//! complete new one.
//!
//! # Failure Handling
//!
//! A failed directory fetch removes the scope's index and timestamp and
//! propagates the error. The next call fetches again instead of reusing data
//! of unknown quality.
//!
//! # Lifetime
//!
//! Entries live for the life of the cache. There is no TTL; staleness is
//! handled by forced rebuilds driven from [`last_sync`](HierarchyCache::last_sync).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::directory::{DirectoryClient, IdentityQuery};
use crate::error::{DomainError, DomainResult};
use crate::index::ScopedEntryIndex;
use crate::telemetry::{SCOPE_REBUILDS_TOTAL, SCOPE_REBUILD_FAILURES_TOTAL};
use crate::model::{is_absent, normalize_key, GroupEntry, ScopeSettings, DEFAULT_SCOPE};
use crate::resolver::resolve_entry;

/// Configuration for the hierarchy cache.
#[derive(Debug, Clone)]
pub struct HierarchyCacheConfig {
    /// Maximum number of main-parent hops followed during traversal.
    pub max_hierarchy_depth: u32,
    /// Settings for scopes without an explicit entry.
    pub default_settings: ScopeSettings,
    /// Per-scope settings, keyed by scope name.
    pub scopes: HashMap<String, ScopeSettings>,
}

impl Default for HierarchyCacheConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: 25,
            default_settings: ScopeSettings::default(),
            scopes: HashMap::new(),
        }
    }
}

impl HierarchyCacheConfig {
    /// Adds settings for one scope.
    pub fn with_scope(mut self, scope: &str, settings: ScopeSettings) -> Self {
        self.scopes.insert(normalize_key(scope), settings);
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_hierarchy_depth = max_depth;
        self
    }
}

/// Canonical scope key; blank names map to [`DEFAULT_SCOPE`].
pub fn canonical_scope(scope: &str) -> String {
    if scope.trim().is_empty() {
        DEFAULT_SCOPE.to_string()
    } else {
        normalize_key(scope)
    }
}

#[derive(Default)]
struct CacheState {
    indices: HashMap<String, Arc<ScopedEntryIndex>>,
    last_sync: HashMap<String, i64>,
    rebuild_locks: HashMap<String, Arc<Mutex<()>>>,
    /// Bumped by `clear`; a rebuild started under an older generation is not published.
    generation: u64,
}

/// Process-lifetime cache of resolved group hierarchies, one index per scope.
pub struct HierarchyCache {
    directory: Arc<dyn DirectoryClient>,
    clock: Arc<dyn Clock>,
    config: HierarchyCacheConfig,
    state: RwLock<CacheState>,
}

impl std::fmt::Debug for HierarchyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("HierarchyCache")
            .field("config", &self.config)
            .field("scopes", &state.indices.len())
            .finish()
    }
}

impl HierarchyCache {
    pub fn new(
        directory: Arc<dyn DirectoryClient>,
        clock: Arc<dyn Clock>,
        config: HierarchyCacheConfig,
    ) -> Self {
        let scopes = config
            .scopes
            .into_iter()
            .map(|(scope, settings)| (canonical_scope(&scope), settings))
            .collect();
        let config = HierarchyCacheConfig { scopes, ..config };

        Self {
            directory,
            clock,
            config,
            state: RwLock::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &HierarchyCacheConfig {
        &self.config
    }

    /// Scopes with explicit settings, in canonical form.
    pub fn configured_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.config.scopes.keys().cloned().collect();
        scopes.sort();
        scopes
    }

    fn settings_for(&self, scope: &str) -> &ScopeSettings {
        self.config
            .scopes
            .get(scope)
            .unwrap_or(&self.config.default_settings)
    }

    fn rebuild_lock(&self, scope: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.state.read().rebuild_locks.get(scope) {
            return Arc::clone(lock);
        }
        let mut state = self.state.write();
        Arc::clone(state.rebuild_locks.entry(scope.to_string()).or_default())
    }

    /// Returns the resolved group table of a scope, rebuilding it if needed.
    ///
    /// A populated index is returned as-is unless `force_rebuild` is set.
    #[instrument(skip(self))]
    pub async fn resolve_scope(
        &self,
        scope: &str,
        force_rebuild: bool,
    ) -> DomainResult<Arc<ScopedEntryIndex>> {
        let scope = canonical_scope(scope);
        let lock = self.rebuild_lock(&scope);
        let _rebuild = lock.lock().await;

        if !force_rebuild {
            if let Some(index) = self.cached_scope(&scope) {
                if !index.is_empty() {
                    return Ok(index);
                }
            }
        }

        self.rebuild(&scope).await
    }

    async fn rebuild(&self, scope: &str) -> DomainResult<Arc<ScopedEntryIndex>> {
        let generation = self.state.read().generation;
        let raw_entries = match self.directory.fetch_scope_entries(scope).await {
            Ok(entries) => entries,
            Err(source) => {
                self.invalidate_scope(scope);
                metrics::counter!(SCOPE_REBUILD_FAILURES_TOTAL).increment(1);
                warn!(scope = %scope, error = %source, "Directory fetch failed, scope index cleared");
                return Err(DomainError::DirectoryFetch {
                    scope: scope.to_string(),
                    source,
                });
            }
        };

        let settings = self.settings_for(scope);
        let mut by_name: HashMap<String, Arc<GroupEntry>> =
            HashMap::with_capacity(raw_entries.len());

        for raw in &raw_entries {
            if is_absent(&raw.name) {
                warn!(scope = %scope, dn = %raw.dn, "Skipping directory entry without a name");
                continue;
            }
            let entry = resolve_entry(raw, scope, settings);
            if let Some(previous) = by_name.insert(normalize_key(&entry.name), Arc::new(entry)) {
                debug!(
                    scope = %scope,
                    group = %previous.name,
                    "Duplicate group name in directory result, keeping the later entry"
                );
            }
        }

        let index = Arc::new(ScopedEntryIndex::build(scope, by_name));
        let now = self.clock.now_millis();
        {
            let mut state = self.state.write();
            if state.generation != generation {
                debug!(scope = %scope, "Cache cleared during rebuild, result not published");
                return Ok(index);
            }
            state.indices.insert(scope.to_string(), Arc::clone(&index));
            state.last_sync.insert(scope.to_string(), now);
        }

        metrics::counter!(SCOPE_REBUILDS_TOTAL).increment(1);
        info!(scope = %scope, groups = index.len(), "Scope index rebuilt");
        Ok(index)
    }

    /// Returns the published index of a scope without touching the directory.
    pub fn cached_scope(&self, scope: &str) -> Option<Arc<ScopedEntryIndex>> {
        self.state
            .read()
            .indices
            .get(&canonical_scope(scope))
            .cloned()
    }

    /// Epoch millis of the last successful rebuild of a scope.
    pub fn last_sync(&self, scope: &str) -> Option<i64> {
        self.state
            .read()
            .last_sync
            .get(&canonical_scope(scope))
            .copied()
    }

    /// Drops the index and timestamp of one scope.
    pub fn invalidate_scope(&self, scope: &str) {
        let scope = canonical_scope(scope);
        let mut state = self.state.write();
        state.indices.remove(&scope);
        state.last_sync.remove(&scope);
    }

    /// Resets every scope.
    ///
    /// Rebuild locks are kept so a rebuild in flight still serializes later
    /// callers; its result is discarded instead of published.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.indices.clear();
        state.last_sync.clear();
        state.generation += 1;
    }

    /// Resolves the groups an identity directly belongs to.
    ///
    /// Directory results are matched against the resolved scope index by DN,
    /// then by name. Groups unknown to the index are skipped.
    #[instrument(skip(self, query), fields(identity = %query.identity, scope = %query.scope))]
    pub async fn resolve_user_groups(
        &self,
        query: &IdentityQuery,
    ) -> DomainResult<Vec<Arc<GroupEntry>>> {
        let index = self.resolve_scope(&query.scope, false).await?;
        let raw_groups = self
            .directory
            .fetch_user_groups(query)
            .await
            .map_err(|source| DomainError::UserGroupsFetch {
                identity: query.identity.clone(),
                source,
            })?;

        let mut seen = HashSet::new();
        let mut groups = Vec::with_capacity(raw_groups.len());
        for raw in &raw_groups {
            let resolved = Some(raw.dn.as_str())
                .filter(|dn| !is_absent(dn))
                .and_then(|dn| index.get_by_dn(dn))
                .or_else(|| index.get_by_name(&raw.name));

            match resolved {
                Some(group) => {
                    if seen.insert(normalize_key(&group.name)) {
                        groups.push(group);
                    }
                }
                None => debug!(
                    identity = %query.identity,
                    group = %raw.name,
                    "Group of identity not present in scope index"
                ),
            }
        }
        Ok(groups)
    }

    /// Returns the ancestors of a group along main-parent links, nearest first.
    ///
    /// Traversal stops at a group without a main parent or whose main parent is
    /// not part of the scope.
    pub async fn main_parent_chain(
        &self,
        scope: &str,
        group: &str,
    ) -> DomainResult<Vec<Arc<GroupEntry>>> {
        let index = self.resolve_scope(scope, false).await?;
        let start = index
            .lookup(group)
            .ok_or_else(|| DomainError::GroupNotFound {
                scope: index.scope().to_string(),
                group: group.to_string(),
            })?;

        let max_depth = self.config.max_hierarchy_depth;
        let mut visited = vec![start.name.clone()];
        let mut chain = Vec::new();
        let mut current = start;

        while let Some(parent_ref) = current.main_parent.clone() {
            let Some(parent) = index.lookup(&parent_ref) else {
                debug!(
                    group = %current.name,
                    parent = %parent_ref,
                    "Main parent outside of scope index, stopping traversal"
                );
                break;
            };

            if visited
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&parent.name))
            {
                visited.push(parent.name.clone());
                return Err(DomainError::HierarchyCycle {
                    path: visited.join(" -> "),
                });
            }
            if chain.len() as u32 >= max_depth {
                return Err(DomainError::DepthLimitExceeded { max_depth });
            }

            visited.push(parent.name.clone());
            chain.push(Arc::clone(&parent));
            current = parent;
        }

        Ok(chain)
    }
}
