//! # twinsync - Bidirectional Directory Mirroring
//!
//! Keeps pairs of directory trees identical while either side is being
//! edited. Changes are observed through filesystem notifications,
//! coalesced per target path and applied to the other tree after a quiet
//! interval. Failed applies are reconciled by recency.

// Module declarations
pub mod commands;
pub mod config;
pub mod engine;
pub mod executor;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod types;
pub mod watch;

// Re-export commonly used types
pub use config::Config;
pub use engine::{Engine, EngineSummary};
pub use executor::Mirror;
pub use registry::PathRegistry;
pub use scheduler::{ApplyHandler, DebounceScheduler};
pub use types::{EventKind, RawEvent, RootPair, SyncError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
