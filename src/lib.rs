//! Reverse-proxy routing configuration engine.
//!
//! Reconciles locally stored resources and services against an upstream
//! data source and publishes a dynamic configuration document for the
//! proxy's file provider.

pub mod config;
pub mod datasource;
pub mod fetcher;
pub mod generator;
pub mod lifecycle;
pub mod naming;
pub mod observability;
pub mod store;
pub mod watcher;

pub use config::Settings;
pub use datasource::{DataSourceConfig, DataSourceManager, DataSourceType};
pub use generator::{ConfigGenerator, DynamicConfig};
pub use lifecycle::{Engine, Shutdown};
pub use store::Store;
