//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Watchers, generator, fetchers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (human or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (ids, counts, outcomes)
//! - Metrics calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
