//! Resource reconciliation.
//!
//! # State Transitions
//! ```text
//! unknown  → active    first sighting (insert with defaults)
//! active   → disabled  absent from the latest fetch
//! disabled → active    reported again
//! ```
//! Rows are never deleted here. Operator-owned fields (entrypoints, TLS,
//! headers, assignments) are never written.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::datasource::DataSourceManager;
use crate::fetcher::{FetchError, FetcherFactory};
use crate::observability::metrics;
use crate::store::{ResourceSighting, RouterProtocol, Store, UpsertOutcome};
use crate::watcher::runner::PeriodicTask;
use crate::watcher::WatchError;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub reactivated: usize,
    pub unchanged: usize,
    pub disabled: Vec<String>,
    /// Active rows in the store once the pass completes.
    pub active: usize,
}

pub struct ResourceWatcher {
    store: Store,
    datasources: Arc<DataSourceManager>,
    fetchers: FetcherFactory,
    fetch_timeout: Duration,
}

impl ResourceWatcher {
    pub fn new(
        store: Store,
        datasources: Arc<DataSourceManager>,
        fetchers: FetcherFactory,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            datasources,
            fetchers,
            fetch_timeout,
        }
    }

    /// Fetch the upstream resource set and reconcile the store against it.
    ///
    /// A failed fetch returns before anything is written.
    pub async fn sync(&self) -> Result<ResourceSyncReport, WatchError> {
        self.datasources.refresh().await;
        let source = self.datasources.active_or_default();
        let fetcher = self.fetchers.build(&source);

        let fetched = match tokio::time::timeout(self.fetch_timeout, fetcher.fetch_resources()).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => {
                metrics::record_fetch_failure(source.kind.as_str());
                return Err(e.into());
            }
            Err(_) => {
                metrics::record_fetch_failure(source.kind.as_str());
                return Err(FetchError::Timeout(self.fetch_timeout).into());
            }
        };

        if fetched.is_empty() {
            tracing::warn!(
                source = %source.kind,
                "Upstream reports no routable resources, disabling all active resources"
            );
        }

        let mut report = ResourceSyncReport::default();
        let mut seen = HashSet::with_capacity(fetched.len());
        for found in &fetched {
            if !seen.insert(found.id.clone()) {
                tracing::debug!(resource_id = %found.id, "Duplicate resource in fetch, keeping first");
                continue;
            }

            let sighting = match found.protocol {
                RouterProtocol::Http => {
                    ResourceSighting::http(&found.id, &found.host, &found.service_id, source.kind.as_str())
                }
                RouterProtocol::Tcp => ResourceSighting::tcp(
                    &found.id,
                    &found.host,
                    &found.service_id,
                    source.kind.as_str(),
                    &found.rule,
                ),
            };
            let outcome = self.store.upsert_discovered_resource(&sighting).await?;

            match outcome {
                UpsertOutcome::Inserted => {
                    report.inserted += 1;
                    tracing::info!(
                        resource_id = %found.id,
                        host = %found.host,
                        protocol = %found.protocol,
                        "Resource discovered"
                    );
                }
                UpsertOutcome::Reactivated => {
                    report.reactivated += 1;
                    tracing::info!(resource_id = %found.id, host = %found.host, "Resource reactivated");
                }
                UpsertOutcome::Updated => {
                    report.updated += 1;
                    tracing::info!(
                        resource_id = %found.id,
                        host = %found.host,
                        service_id = %found.service_id,
                        "Resource updated"
                    );
                }
                UpsertOutcome::Unchanged => report.unchanged += 1,
            }
        }

        report.disabled = self.store.disable_resources_except(&seen).await?;
        for id in &report.disabled {
            tracing::info!(resource_id = %id, "Resource no longer reported upstream, disabled");
        }

        report.active = usize::try_from(self.store.count_active_resources().await?).unwrap_or_default();

        metrics::record_resources_disabled(report.disabled.len());
        metrics::set_active_resources(report.active);
        tracing::debug!(
            inserted = report.inserted,
            updated = report.updated,
            reactivated = report.reactivated,
            unchanged = report.unchanged,
            disabled = report.disabled.len(),
            active = report.active,
            "Resource sync complete"
        );
        Ok(report)
    }
}

#[async_trait]
impl PeriodicTask for ResourceWatcher {
    type Error = WatchError;

    fn name(&self) -> &'static str {
        "resource-watcher"
    }

    async fn run_once(&mut self) -> Result<(), WatchError> {
        match self.sync().await {
            Ok(_) => {
                metrics::record_watcher_tick(self.name(), "ok");
                Ok(())
            }
            Err(e) => {
                metrics::record_watcher_tick(self.name(), "failed");
                Err(e)
            }
        }
    }
}
