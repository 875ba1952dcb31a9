//! Core type definitions for twinsync

mod error;
mod event;
mod pair;

pub use error::SyncError;
pub use event::{EventKind, RawEvent};
pub use pair::RootPair;
