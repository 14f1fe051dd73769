//! Case-insensitive, dual-keyed group tables for one scope.
//!
//! A [`ScopedEntryIndex`] holds two [`EntryTable`]s, one keyed by group name
//! and one keyed by DN. Both are built in the same rebuild pass from the same
//! entry set, so they always describe the same generation of the scope.
//!
//! # Thread Safety
//!
//! Each table serializes access with its own `RwLock`. `put_all` inserts the
//! whole batch under one write lock so readers never observe half a batch.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{normalize_key, GroupEntry};

/// Concurrent table keyed by upper-cased strings.
#[derive(Debug, Default)]
pub struct EntryTable {
    entries: RwLock<HashMap<String, Arc<GroupEntry>>>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<GroupEntry>> {
        self.entries.read().get(&normalize_key(key)).cloned()
    }

    /// Inserts an entry, returning the one it replaced.
    pub fn put(&self, key: &str, entry: Arc<GroupEntry>) -> Option<Arc<GroupEntry>> {
        self.entries.write().insert(normalize_key(key), entry)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(&normalize_key(key))
    }

    /// Inserts every entry of `batch` atomically with respect to readers.
    pub fn put_all<I, K>(&self, batch: I)
    where
        I: IntoIterator<Item = (K, Arc<GroupEntry>)>,
        K: AsRef<str>,
    {
        // Normalize outside the lock to keep the write section short.
        let normalized: Vec<_> = batch
            .into_iter()
            .map(|(key, entry)| (normalize_key(key.as_ref()), entry))
            .collect();

        let mut entries = self.entries.write();
        entries.extend(normalized);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Normalized keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Resolved group tables of one scope, indexed by name and by DN.
#[derive(Debug)]
pub struct ScopedEntryIndex {
    scope: String,
    by_name: EntryTable,
    by_dn: EntryTable,
}

impl ScopedEntryIndex {
    /// Creates an empty index for `scope`.
    pub fn empty(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            by_name: EntryTable::new(),
            by_dn: EntryTable::new(),
        }
    }

    /// Builds both tables from a by-name map.
    ///
    /// The by-DN table is derived by a single pass over `by_name`, skipping
    /// entries without a DN.
    pub fn build(scope: impl Into<String>, by_name: HashMap<String, Arc<GroupEntry>>) -> Self {
        let by_dn: Vec<(String, Arc<GroupEntry>)> = by_name
            .values()
            .filter(|entry| !entry.dn.trim().is_empty())
            .map(|entry| (entry.dn.clone(), Arc::clone(entry)))
            .collect();

        let index = Self::empty(scope);
        index.by_name.put_all(by_name);
        index.by_dn.put_all(by_dn);
        index
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn by_name(&self) -> &EntryTable {
        &self.by_name
    }

    pub fn by_dn(&self) -> &EntryTable {
        &self.by_dn
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<GroupEntry>> {
        self.by_name.get(name)
    }

    pub fn get_by_dn(&self, dn: &str) -> Option<Arc<GroupEntry>> {
        self.by_dn.get(dn)
    }

    /// Looks a reference up by name first, then by DN.
    pub fn lookup(&self, reference: &str) -> Option<Arc<GroupEntry>> {
        self.get_by_name(reference)
            .or_else(|| self.get_by_dn(reference))
    }

    /// Number of groups (by-name entries).
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
