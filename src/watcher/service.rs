//! Service reconciliation with cross-source id de-duplication.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::datasource::DataSourceManager;
use crate::fetcher::{FetchError, FetcherFactory};
use crate::naming::{display_name, normalize, with_suffix};
use crate::observability::metrics;
use crate::store::{NewService, Service, ServiceType, Store};
use crate::watcher::runner::PeriodicTask;
use crate::watcher::WatchError;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Rows from the active source no longer reported upstream. Kept as is.
    pub missing: Vec<String>,
}

pub struct ServiceWatcher {
    store: Store,
    datasources: Arc<DataSourceManager>,
    fetchers: FetcherFactory,
    fetch_timeout: Duration,
}

impl ServiceWatcher {
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

    /// Fetch upstream services and create or update the matching rows.
    ///
    /// Services that disappear upstream are reported, never deleted.
    pub async fn sync(&self) -> Result<ServiceSyncReport, WatchError> {
        self.datasources.refresh().await;
        let source = self.datasources.active_or_default();
        let fetcher = self.fetchers.build(&source);

        let fetched = match tokio::time::timeout(self.fetch_timeout, fetcher.fetch_services()).await {
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

        let default_suffix = source.kind.default_service_suffix();
        let mut report = ServiceSyncReport::default();
        let mut seen = HashSet::with_capacity(fetched.len());

        for found in fetched {
            let key = normalize(&found.id);
            if key.is_empty() {
                tracing::warn!(service_id = %found.id, "Skipping service with empty id");
                continue;
            }
            if !seen.insert(key.clone()) {
                tracing::debug!(service_id = %found.id, key = %key, "Service already seen under another suffix");
                continue;
            }

            match self.store.find_service(&key, default_suffix).await? {
                Some(existing) => {
                    if same_definition(&existing, found.kind, &found.config) {
                        report.unchanged += 1;
                        continue;
                    }
                    self.store
                        .update_service_definition(&existing.id, found.kind, &found.config)
                        .await?;
                    report.updated += 1;
                    tracing::info!(service_id = %existing.id, kind = %found.kind, "Service updated");
                }
                None => {
                    let id = with_suffix(&key, default_suffix);
                    let name = found
                        .name
                        .filter(|name| !name.trim().is_empty())
                        .unwrap_or_else(|| display_name(&id));
                    self.store
                        .insert_service(&NewService {
                            id: id.clone(),
                            name,
                            kind: found.kind,
                            config: found.config,
                            source_type: source.kind.as_str().to_string(),
                        })
                        .await?;
                    report.created += 1;
                    tracing::info!(service_id = %id, kind = %found.kind, "Service discovered");
                }
            }
        }

        report.missing = self
            .store
            .services()
            .await?
            .into_iter()
            .filter(|row| row.source_type == source.kind.as_str() && !seen.contains(&normalize(&row.id)))
            .map(|row| row.id)
            .collect();
        if !report.missing.is_empty() {
            tracing::info!(
                count = report.missing.len(),
                ids = ?report.missing,
                "Services no longer reported upstream, keeping them"
            );
        }

        metrics::record_services_created(report.created);
        tracing::debug!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            "Service sync complete"
        );
        Ok(report)
    }
}

#[async_trait]
impl PeriodicTask for ServiceWatcher {
    type Error = WatchError;

    fn name(&self) -> &'static str {
        "service-watcher"
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

/// True when the stored row already describes `kind` with `config`.
fn same_definition(existing: &Service, kind: ServiceType, config: &Value) -> bool {
    let Ok(existing_kind) = existing.service_type() else {
        return false;
    };
    if existing_kind != kind {
        return false;
    }
    match existing.config_value() {
        Ok(stored) => configs_equivalent(&stored, config),
        Err(e) => {
            tracing::warn!(service_id = %existing.id, error = %e, "Stored service config is not valid JSON");
            false
        }
    }
}

/// Semantic equality of two service configs.
///
/// `servers` lists compare element-wise on `url`/`address` only, so upstream
/// status fields or key order do not register as a change. All other keys
/// compare as JSON values.
pub fn configs_equivalent(a: &Value, b: &Value) -> bool {
    let (Some(a), Some(b)) = (a.as_object(), b.as_object()) else {
        return a == b;
    };

    if !servers_equivalent(a.get("servers"), b.get("servers")) {
        return false;
    }

    let rest = |map: &serde_json::Map<String, Value>| {
        map.iter()
            .filter(|(key, _)| key.as_str() != "servers")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect::<serde_json::Map<String, Value>>()
    };
    rest(a) == rest(b)
}

fn servers_equivalent(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a.and_then(Value::as_array), b.and_then(Value::as_array)) {
        (Some(a), Some(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| server_target(x) == server_target(y))
        }
        (None, None) => a == b,
        _ => false,
    }
}

fn server_target(server: &Value) -> Option<&str> {
    server
        .get("url")
        .or_else(|| server.get("address"))
        .and_then(Value::as_str)
}
