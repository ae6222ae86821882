//! Configuration schema definitions.
//!
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetcher::DEFAULT_FALLBACK_URLS;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Relational store connection.
    pub database: DatabaseConfig,

    /// Data-source persistence.
    pub datasources: DataSourcesConfig,

    /// Dynamic configuration generator.
    pub generator: GeneratorConfig,

    /// Resource and service reconciliation.
    pub watchers: WatcherConfig,

    pub logging: LoggingConfig,

    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,

    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/routeforge.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataSourcesConfig {
    /// JSON file holding the configured sources and the active name.
    pub file: PathBuf,
}

impl Default for DataSourcesConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("config/datasources.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub enabled: bool,

    /// Published document, watched by the proxy's file provider.
    pub output_path: PathBuf,

    pub interval_secs: u64,

    /// Certificate resolver named in every router's TLS block.
    pub cert_resolver: String,

    /// Appended to HTTP chains while the gateway source is active.
    pub gateway_auth_middleware: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_path: PathBuf::from("conf/resource-overrides.yml"),
            interval_secs: 30,
            cert_resolver: "letsencrypt".to_string(),
            gateway_auth_middleware: "badger@http".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,

    pub resource_interval_secs: u64,

    pub service_interval_secs: u64,

    /// Upper bound for one fetch, fallbacks included.
    pub fetch_timeout_secs: u64,

    /// Per-request timeout on the upstream HTTP client.
    pub request_timeout_secs: u64,

    /// Base URLs tried when the proxy API is unreachable at its configured URL.
    pub fallback_urls: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resource_interval_secs: 30,
            service_interval_secs: 30,
            fetch_timeout_secs: 30,
            request_timeout_secs: 10,
            fallback_urls: DEFAULT_FALLBACK_URLS.iter().map(|url| url.to_string()).collect(),
        }
    }
}

impl WatcherConfig {
    pub fn resource_interval(&self) -> Duration {
        Duration::from_secs(self.resource_interval_secs)
    }

    pub fn service_interval(&self) -> Duration {
        Duration::from_secs(self.service_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "routeforge=info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Prometheus scrape endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9464".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.generator.output_path, PathBuf::from("conf/resource-overrides.yml"));
        assert_eq!(settings.watchers.fallback_urls.len(), DEFAULT_FALLBACK_URLS.len());
        assert!(!settings.metrics.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let settings: Settings = toml::from_str(
            r#"
            [generator]
            interval_secs = 5

            [watchers]
            fallback_urls = []
            "#,
        )
        .unwrap();
        assert_eq!(settings.generator.interval(), Duration::from_secs(5));
        assert_eq!(settings.generator.cert_resolver, "letsencrypt");
        assert!(settings.watchers.fallback_urls.is_empty());
        assert_eq!(settings.watchers.resource_interval_secs, 30);
    }
}
