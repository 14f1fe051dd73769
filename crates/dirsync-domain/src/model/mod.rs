//! Resolved group entries and per-scope settings.

mod types;

pub use types::{
    is_absent, normalize_key, GroupEntry, ParentStrategy, ScopeSettings, DEFAULT_SCOPE,
    NULL_MARKER,
};
