//! dirsync-server: Runtime wiring for directory synchronization
//!
//! This crate runs the domain components:
//! - Configuration loading (YAML + environment)
//! - Structured logging and metric descriptions
//! - Named fixed-size worker pools
//! - The batch dispatcher and the identity sync worker
//! - Gate-guarded whole-scope resync
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                dirsync-server                │
//! ├──────────────────────────────────────────────┤
//! │  context     - SyncContext (wires it all)    │
//! │  dispatcher/ - BatchDispatcher               │
//! │  worker      - IdentitySyncWorker            │
//! │  resync      - ScopeResync                   │
//! │  pool        - WorkerPool, PoolRegistry      │
//! │  config      - SyncConfig                    │
//! │  observability/ - logging, metrics           │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//!                 dirsync-domain
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod observability;
pub mod pool;
pub mod resync;
pub mod worker;

pub use config::{ConfigLoadError, SyncConfig};
pub use context::SyncContext;
pub use dispatcher::{BatchDispatcher, DispatchConfig, DispatchReport, PackageOutcome, PackageWorker};
pub use pool::{PoolRegistry, QueueMode, WorkerPool};
pub use resync::{ResyncError, ResyncOutcome, ScopeResync};
pub use worker::{IdentityRefresher, IdentitySyncWorker, RefreshError, RefreshOutcome};
