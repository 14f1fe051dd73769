//! Domain error types for hierarchy resolution.

use thiserror::Error;

/// Errors reported by the directory collaborator.
///
/// The core treats these as opaque: they are propagated to callers and never
/// inspected beyond logging.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// The directory could not be reached.
    #[error("directory connection error: {message}")]
    Connection { message: String },

    /// The directory rejected or failed a query.
    #[error("directory query error: {message}")]
    Query { message: String },

    /// The requested object does not exist in the directory.
    #[error("directory object not found: {name}")]
    NotFound { name: String },
}

/// Domain-specific errors for hierarchy cache operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Fetching the raw entry set of a scope failed; the scope index was invalidated.
    #[error("failed to fetch entries for scope '{scope}': {source}")]
    DirectoryFetch {
        scope: String,
        #[source]
        source: DirectoryError,
    },

    /// Fetching the groups of an identity failed.
    #[error("failed to fetch groups for identity '{identity}': {source}")]
    UserGroupsFetch {
        identity: String,
        #[source]
        source: DirectoryError,
    },

    /// Group not present in the resolved scope index.
    #[error("group '{group}' not found in scope '{scope}'")]
    GroupNotFound { scope: String, group: String },

    /// Main-parent links loop back onto an already visited group.
    #[error("cycle detected in group hierarchy: {path}")]
    HierarchyCycle { path: String },

    /// Main-parent chain is deeper than the configured limit.
    #[error("hierarchy depth limit exceeded (max: {max_depth})")]
    DepthLimitExceeded { max_depth: u32 },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
