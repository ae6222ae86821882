//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Settings → Store → DataSourceManager → FetcherFactory → start loops + file watch
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop loops → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: store first, then data sources, then loops
//! - Stopping a loop does not cancel an in-flight tick's network calls;
//!   those are bounded by the fetch timeout

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownReason};
pub use startup::{Engine, StartupError};
