//! Data-source definitions and error types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::ProviderSuffix;

/// Upstream truth a data source points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSourceType {
    /// Gateway-management API serving an embedded proxy configuration.
    Gateway,
    /// The proxy's own runtime introspection API.
    ProxyApi,
}

impl DataSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceType::Gateway => "gateway",
            DataSourceType::ProxyApi => "proxy-api",
        }
    }

    /// Suffix under which the proxy sees services this source discovered.
    pub fn runtime_suffix(&self) -> ProviderSuffix {
        match self {
            DataSourceType::Gateway => ProviderSuffix::Http,
            DataSourceType::ProxyApi => ProviderSuffix::Docker,
        }
    }

    /// Suffix given to services the service watcher creates while this
    /// source is active.
    pub fn default_service_suffix(&self) -> ProviderSuffix {
        match self {
            DataSourceType::Gateway => ProviderSuffix::Http,
            DataSourceType::ProxyApi => ProviderSuffix::File,
        }
    }

    /// Health endpoint checked after the source is updated.
    pub fn health_path(&self) -> &'static str {
        match self {
            DataSourceType::Gateway => "/traefik-config",
            DataSourceType::ProxyApi => "/api/version",
        }
    }
}

impl fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSourceType {
    type Err = DataSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gateway" => Ok(DataSourceType::Gateway),
            "proxy-api" => Ok(DataSourceType::ProxyApi),
            other => Err(DataSourceError::UnknownType(other.to_string())),
        }
    }
}

/// Credentials sent with every upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// One configured upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    #[serde(rename = "type")]
    pub kind: DataSourceType,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
}

impl DataSourceConfig {
    pub fn new(kind: DataSourceType, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            basic_auth: None,
        }
    }

    /// Default used when the stored active name does not resolve.
    pub fn gateway_default() -> Self {
        Self::new(DataSourceType::Gateway, DEFAULT_GATEWAY_URL)
    }

    /// `url` joined with an absolute path, without doubling the slash.
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.url, path)
    }

    /// Credentials if a non-empty username is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.basic_auth
            .as_ref()
            .filter(|auth| !auth.username.is_empty())
            .map(|auth| (auth.username.as_str(), auth.password.as_str()))
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub const DEFAULT_GATEWAY_NAME: &str = "gateway";
pub const DEFAULT_GATEWAY_URL: &str = "http://gateway:3001/api/v1";
pub const DEFAULT_PROXY_NAME: &str = "proxy";
pub const DEFAULT_PROXY_URL: &str = "http://proxy:8080";

/// On-disk shape of the data-source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceFile {
    pub active_data_source: String,

    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSourceConfig>,
}

impl Default for DataSourceFile {
    fn default() -> Self {
        let mut data_sources = BTreeMap::new();
        data_sources.insert(
            DEFAULT_GATEWAY_NAME.to_string(),
            DataSourceConfig::new(DataSourceType::Gateway, DEFAULT_GATEWAY_URL),
        );
        data_sources.insert(
            DEFAULT_PROXY_NAME.to_string(),
            DataSourceConfig::new(DataSourceType::ProxyApi, DEFAULT_PROXY_URL),
        );
        Self {
            active_data_source: DEFAULT_GATEWAY_NAME.to_string(),
            data_sources,
        }
    }
}

/// Errors raised by the data-source manager.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("data source '{0}' not found")]
    NotFound(String),

    #[error("unknown data source type '{0}'")]
    UnknownType(String),

    #[error("data source file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("data source file is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to replace data source file: {0}")]
    Persist(#[from] tempfile::PersistError),
}
