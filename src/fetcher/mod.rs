//! Upstream fetchers.
//!
//! # Data Flow
//! ```text
//! active DataSourceConfig
//!     → FetcherFactory::build (strategy picked by type)
//!         ├── gateway.rs    GET <url>/traefik-config  (one document)
//!         └── proxy_api.rs  GET <url>/api/{http,tcp,udp}/{routers,services}
//!                           (array-or-map bodies, fallback base URLs)
//!     → ResourceSet / ServiceSet (canonical shape)
//!     → watchers
//! ```
//!
//! # Design Decisions
//! - One trait, two implementations; watchers never branch on source type
//! - A fetch either returns the full set or an error, never a partial set
//! - Malformed individual entries are skipped and logged

pub mod gateway;
pub mod proxy_api;
pub mod rules;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::datasource::{DataSourceConfig, DataSourceType};

pub use gateway::GatewayFetcher;
pub use proxy_api::{ProxyApiFetcher, DEFAULT_FALLBACK_URLS};
pub use types::{DiscoveredResource, DiscoveredService, FetchError, ResourceSet, ServiceSet};

/// Reads resources and services from one upstream truth.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn source_type(&self) -> DataSourceType;

    async fn fetch_resources(&self) -> Result<ResourceSet, FetchError>;

    async fn fetch_services(&self) -> Result<ServiceSet, FetchError>;
}

/// Builds the fetcher matching a data source.
#[derive(Clone, Debug)]
pub struct FetcherFactory {
    client: reqwest::Client,
    fallback_urls: Vec<String>,
}

impl FetcherFactory {
    /// `request_timeout` bounds every single upstream request.
    pub fn new(request_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            fallback_urls: DEFAULT_FALLBACK_URLS.iter().map(|url| url.to_string()).collect(),
        })
    }

    /// Replace the base URLs the proxy-API fetcher falls back to.
    pub fn with_fallback_urls(mut self, urls: Vec<String>) -> Self {
        self.fallback_urls = urls;
        self
    }

    pub fn build(&self, config: &DataSourceConfig) -> Box<dyn Fetcher> {
        match config.kind {
            DataSourceType::Gateway => Box::new(GatewayFetcher::new(self.client.clone(), config.clone())),
            DataSourceType::ProxyApi => Box::new(
                ProxyApiFetcher::new(self.client.clone(), config.clone())
                    .with_fallbacks(self.fallback_urls.clone()),
            ),
        }
    }
}

/// GET `url` and decode the body as JSON.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    config: &DataSourceConfig,
    url: &str,
) -> Result<Value, FetchError> {
    let mut request = client.get(url).header(reqwest::header::ACCEPT, "application/json");
    if let Some((user, password)) = config.credentials() {
        request = request.basic_auth(user, Some(password));
    }

    let response = request.send().await.map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;

    serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })
}
