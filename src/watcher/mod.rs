//! Reconciliation watchers.
//!
//! # Data Flow
//! ```text
//! BackgroundLoop tick (runner.rs)
//!     → DataSourceManager::active_or_default   (re-read every tick)
//!     → FetcherFactory::build → fetch (bounded by fetch timeout)
//!     → resource.rs: upsert sightings, disable the rest
//!     → service.rs:  normalize ids, create or update on change
//!     → Store
//! ```
//!
//! # Design Decisions
//! - A failed fetch aborts the tick before any write; the next tick retries
//! - Disable, never delete: only an operator removes rows
//! - Store errors abort the remainder of the tick but never the process

pub mod resource;
pub mod runner;
pub mod service;

use thiserror::Error;

use crate::fetcher::FetchError;
use crate::store::StoreError;

pub use resource::{ResourceSyncReport, ResourceWatcher};
pub use runner::{BackgroundLoop, PeriodicTask};
pub use service::{configs_equivalent, ServiceSyncReport, ServiceWatcher};

/// Why a watcher tick failed.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}
