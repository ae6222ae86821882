//! Data-source management.
//!
//! # Data Flow
//! ```text
//! datasources.json
//!     → manager.rs load (seed defaults if missing)
//!     → ArcSwap snapshot
//!     → watchers pick a fetcher, generator picks suffix rules
//!       (re-read at the start of every tick)
//!
//! Operator change (CLI / API):
//!     → manager.rs set_active / update
//!     → whole-file rewrite under the write lock
//!     → health.rs connectivity check
//!
//! Change written by another process:
//!     → watcher.rs notify event on the file
//!     → manager.rs reload → snapshot swapped
//! ```
//!
//! # Design Decisions
//! - No global state; the manager is passed to every loop by `Arc`
//! - An unresolvable active name degrades to the gateway default

pub mod health;
pub mod manager;
pub mod types;
pub mod watcher;

pub use manager::DataSourceManager;
pub use watcher::{DataSourceWatch, DataSourceWatcher};
pub use types::{BasicAuth, DataSourceConfig, DataSourceError, DataSourceFile, DataSourceType};
