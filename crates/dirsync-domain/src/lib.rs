//! dirsync-domain: Directory hierarchy cache and sync coordination
//!
//! This crate contains the core of the directory synchronization layer:
//! - Case-insensitive dual-keyed group indices per scope
//! - Main-parent resolution for groups with several parents
//! - The per-scope hierarchy cache with rebuild on demand
//! - Claim/release leases over identity sync state
//! - The single-flight gate for full rebuilds
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               dirsync-domain                │
//! ├─────────────────────────────────────────────┤
//! │  index/     - ScopedEntryIndex, EntryTable  │
//! │  resolver/  - Main-parent resolution        │
//! │  cache/     - HierarchyCache                │
//! │  lease/     - LeaseCoordinator              │
//! │  gate.rs    - FullResyncGate                │
//! │  directory  - Directory collaborator trait  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod clock;
pub mod directory;
pub mod error;
pub mod gate;
pub mod index;
pub mod lease;
pub mod model;
pub mod resolver;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use cache::{HierarchyCache, HierarchyCacheConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::{DirectoryClient, IdentityQuery, RawEntry};
pub use error::{DirectoryError, DomainError, DomainResult};
pub use gate::{FullResyncGate, GateClaim};
pub use index::{EntryTable, ScopedEntryIndex};
pub use lease::{LeaseClaim, LeaseCoordinator, LeaseGuard, SyncLeaseRecord};
pub use model::{GroupEntry, ParentStrategy, ScopeSettings};
