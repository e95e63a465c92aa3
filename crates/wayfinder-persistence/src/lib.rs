//! Wayfinder Persistence
//!
//! Serializes [`WorkflowState`](wayfinder_core::WorkflowState) to client-durable
//! key/value storage and rehydrates it on load.
//!
//! # Core Concepts
//!
//! - [`StorageBackend`]: key/value store abstraction ([`MemoryStorage`], [`FileStorage`])
//! - [`PersistedWorkflow`]: versioned JSON blob layout
//! - [`PersistenceBridge`]: best-effort persist/rehydrate plus the fingerprint-keyed [`StrategyCache`]
//! - [`BackgroundPersister`]: fire-and-forget writer running on a tokio task
//!
//! Storage failures never escape: a failed write is logged, a failed or
//! corrupted read rehydrates as "no persisted state".

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod bridge;
mod snapshot;
mod storage;
mod worker;

pub use bridge::{PersistenceBridge, Persister};
pub use snapshot::{PersistedWorkflow, StrategyCache, SNAPSHOT_VERSION};
pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageKey, StorageScope};
pub use worker::BackgroundPersister;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
