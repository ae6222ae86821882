//! Best-effort connectivity check for a data source.

use std::time::Duration;

use crate::datasource::types::DataSourceConfig;

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// GET the type-specific health endpoint and log the outcome.
///
/// Returns true when the upstream answered with a success status.
pub async fn check(client: &reqwest::Client, name: &str, config: &DataSourceConfig) -> bool {
    let url = config.endpoint(config.kind.health_path());

    let mut request = client.get(&url).timeout(HEALTH_TIMEOUT);
    if let Some((user, password)) = config.credentials() {
        request = request.basic_auth(user, Some(password));
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            tracing::info!(name, url = %url, "Data source reachable");
            true
        }
        Ok(response) => {
            tracing::warn!(
                name,
                url = %url,
                status = %response.status(),
                "Data source health check failed: non-success status"
            );
            false
        }
        Err(e) if e.is_timeout() => {
            tracing::warn!(name, url = %url, "Data source health check failed: timeout");
            false
        }
        Err(e) => {
            tracing::warn!(name, url = %url, error = %e, "Data source health check failed: connection error");
            false
        }
    }
}
