//! Dynamic configuration generation.
//!
//! # Data Flow
//! ```text
//! BackgroundLoop tick
//!     → DataSourceManager::refresh + active_or_default   (suffix and auth decisions)
//!     → Snapshot::load (store, read-only)
//!     → synthesize (synth.rs, pure)
//!     → DynamicConfig::to_yaml (document.rs)
//!     → Publisher::publish (writer.rs): compare, temp file, rename
//! ```
//!
//! # Design Decisions
//! - Payloads decode into closed types (middleware.rs, service.rs) so field
//!   types survive serialization without name-based fix-ups
//! - Derived names come from the resource id only
//! - A failed tick leaves the last published file untouched

pub mod document;
pub mod middleware;
pub mod service;
pub mod synth;
pub mod values;
pub mod writer;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::datasource::DataSourceManager;
use crate::observability::metrics;
use crate::store::{Store, StoreError};
use crate::watcher::PeriodicTask;

pub use document::DynamicConfig;
pub use middleware::{MiddlewareEntry, MiddlewareSpec};
pub use service::{Protocol, ServiceSpec};
pub use synth::{synthesize, Snapshot, SynthesisSettings};
pub use writer::{PublishOutcome, Publisher};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to replace published file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Generator settings taken from the application config.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub output_path: PathBuf,
    pub cert_resolver: String,
    pub gateway_auth_middleware: String,
}

pub struct ConfigGenerator {
    store: Store,
    datasources: Arc<DataSourceManager>,
    cert_resolver: String,
    gateway_auth_middleware: String,
    publisher: Publisher,
}

impl ConfigGenerator {
    pub fn new(store: Store, datasources: Arc<DataSourceManager>, options: GeneratorOptions) -> Self {
        Self {
            store,
            datasources,
            cert_resolver: options.cert_resolver,
            gateway_auth_middleware: options.gateway_auth_middleware,
            publisher: Publisher::new(options.output_path),
        }
    }

    /// Build the document from the current store contents.
    pub async fn render(&self) -> Result<DynamicConfig, GenerateError> {
        self.datasources.refresh().await;
        let settings = SynthesisSettings {
            active_source: self.datasources.active_or_default().kind,
            cert_resolver: self.cert_resolver.clone(),
            gateway_auth_middleware: self.gateway_auth_middleware.clone(),
        };
        let snapshot = Snapshot::load(&self.store).await?;
        Ok(synthesize(&snapshot, &settings))
    }

    /// Render and publish. Writes only when the output changed.
    pub async fn generate(&mut self) -> Result<PublishOutcome, GenerateError> {
        let doc = self.render().await?;
        let yaml = doc.to_yaml()?;
        let outcome = self.publisher.publish(&yaml)?;

        match outcome {
            PublishOutcome::Written => tracing::info!(
                path = %self.publisher.path().display(),
                counts = ?synth::summary(&doc),
                "Published dynamic configuration"
            ),
            PublishOutcome::Unchanged => tracing::debug!("Dynamic configuration unchanged"),
        }
        Ok(outcome)
    }
}

#[async_trait]
impl PeriodicTask for ConfigGenerator {
    type Error = GenerateError;

    fn name(&self) -> &'static str {
        "config-generator"
    }

    async fn run_once(&mut self) -> Result<(), GenerateError> {
        match self.generate().await {
            Ok(PublishOutcome::Written) => {
                metrics::record_generation("written");
                Ok(())
            }
            Ok(PublishOutcome::Unchanged) => {
                metrics::record_generation("unchanged");
                Ok(())
            }
            Err(e) => {
                metrics::record_generation("failed");
                Err(e)
            }
        }
    }
}
