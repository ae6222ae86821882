//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the store and bootstrap its schema
//! - Load the data-source file
//! - Build the shared HTTP client for fetchers
//! - Start the three background loops and the data-source file watch
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::config::Settings;
use crate::datasource::{DataSourceError, DataSourceManager, DataSourceWatch, DataSourceWatcher};
use crate::fetcher::{FetchError, FetcherFactory};
use crate::generator::{ConfigGenerator, GeneratorOptions};
use crate::store::{Store, StoreError};
use crate::watcher::{BackgroundLoop, ResourceWatcher, ServiceWatcher};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to load data sources: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] FetchError),
}

/// The running engine: shared components plus one loop per task.
pub struct Engine {
    settings: Settings,
    store: Store,
    datasources: Arc<DataSourceManager>,
    fetchers: FetcherFactory,
    resource_loop: BackgroundLoop,
    service_loop: BackgroundLoop,
    generator_loop: BackgroundLoop,
    datasource_watch: Mutex<Option<DataSourceWatch>>,
}

impl Engine {
    /// Open the configured store and data-source file.
    pub async fn build(settings: Settings) -> Result<Self, StartupError> {
        let store = Store::connect(&settings.database.url, settings.database.max_connections).await?;
        tracing::info!(url = %settings.database.url, "Store ready");
        Self::with_store(settings, store)
    }

    /// Build around an existing store.
    pub fn with_store(settings: Settings, store: Store) -> Result<Self, StartupError> {
        let datasources = Arc::new(DataSourceManager::load(&settings.datasources.file)?);
        tracing::info!(
            file = %settings.datasources.file.display(),
            active = %datasources.active_name(),
            "Data sources loaded"
        );

        let fetchers = FetcherFactory::new(settings.watchers.request_timeout())?
            .with_fallback_urls(settings.watchers.fallback_urls.clone());

        Ok(Self {
            resource_loop: BackgroundLoop::new("resource-watcher", settings.watchers.resource_interval()),
            service_loop: BackgroundLoop::new("service-watcher", settings.watchers.service_interval()),
            generator_loop: BackgroundLoop::new("config-generator", settings.generator.interval()),
            datasource_watch: Mutex::new(None),
            settings,
            store,
            datasources,
            fetchers,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn datasources(&self) -> &Arc<DataSourceManager> {
        &self.datasources
    }

    pub fn resource_watcher(&self) -> ResourceWatcher {
        ResourceWatcher::new(
            self.store.clone(),
            self.datasources.clone(),
            self.fetchers.clone(),
            self.settings.watchers.fetch_timeout(),
        )
    }

    pub fn service_watcher(&self) -> ServiceWatcher {
        ServiceWatcher::new(
            self.store.clone(),
            self.datasources.clone(),
            self.fetchers.clone(),
            self.settings.watchers.fetch_timeout(),
        )
    }

    pub fn generator(&self) -> ConfigGenerator {
        ConfigGenerator::new(
            self.store.clone(),
            self.datasources.clone(),
            GeneratorOptions {
                output_path: self.settings.generator.output_path.clone(),
                cert_resolver: self.settings.generator.cert_resolver.clone(),
                gateway_auth_middleware: self.settings.generator.gateway_auth_middleware.clone(),
            },
        )
    }

    /// Start every enabled loop.
    pub fn start(&self) {
        self.watch_datasources();

        if self.settings.watchers.enabled {
            self.resource_loop.start(self.resource_watcher());
            self.service_loop.start(self.service_watcher());
        } else {
            tracing::info!("Watchers disabled");
        }

        if self.settings.generator.enabled {
            self.generator_loop.start(self.generator());
        } else {
            tracing::info!("Generator disabled");
        }
    }

    /// Signal every loop to exit.
    pub fn stop(&self) {
        self.resource_loop.stop();
        self.service_loop.stop();
        self.generator_loop.stop();
        if self.watch_slot().take().is_some() {
            tracing::info!("Data source watcher stopped");
        }
    }

    /// Without a file watch, changes still land at the next tick.
    fn watch_datasources(&self) {
        let mut slot = self.watch_slot();
        if slot.is_some() {
            return;
        }
        match DataSourceWatcher::new(self.datasources.clone()).run() {
            Ok(watch) => *slot = Some(watch),
            Err(e) => tracing::warn!(error = %e, "Data source watcher unavailable, relying on per-tick reload"),
        }
    }

    fn watch_slot(&self) -> std::sync::MutexGuard<'_, Option<DataSourceWatch>> {
        match self.datasource_watch.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_watching_datasources(&self) -> bool {
        self.watch_slot().as_ref().is_some_and(DataSourceWatch::is_running)
    }

    pub fn running_loops(&self) -> usize {
        [&self.resource_loop, &self.service_loop, &self.generator_loop]
            .into_iter()
            .filter(|l| l.is_running())
            .count()
    }
}
