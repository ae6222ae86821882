//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! routeforge.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Settings (validated, immutable)
//!     → lifecycle::startup builds every subsystem from it
//! ```
//!
//! # Design Decisions
//! - Settings are read once at startup; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - The data-source file is separate because it is rewritten at runtime

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    DataSourcesConfig, DatabaseConfig, GeneratorConfig, LoggingConfig, MetricsConfig, Settings,
    WatcherConfig,
};
pub use validation::ValidationError;
