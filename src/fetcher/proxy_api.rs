//! Fetcher for the proxy's runtime introspection API.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::datasource::types::join_url;
use crate::datasource::{DataSourceConfig, DataSourceType};
use crate::fetcher::rules::{extract_host, extract_sni_host, infer_service_type, is_internal};
use crate::fetcher::types::{DiscoveredResource, DiscoveredService, FetchError, ResourceSet, ServiceSet};
use crate::fetcher::{get_json, Fetcher};
use crate::naming::{has_suffix, normalize};
use crate::store::RouterProtocol;

/// Base URLs tried in order when the configured one cannot be reached.
pub const DEFAULT_FALLBACK_URLS: [&str; 3] = [
    "http://localhost:8080",
    "http://host.docker.internal:8080",
    "http://traefik:8080",
];

const HTTP_ROUTERS: &str = "/api/http/routers";
const TCP_ROUTERS: &str = "/api/tcp/routers";
const HTTP_SERVICES: &str = "/api/http/services";
const TCP_SERVICES: &str = "/api/tcp/services";
const UDP_SERVICES: &str = "/api/udp/services";

#[derive(Debug, Deserialize)]
struct ApiRouter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    rule: String,
    #[serde(default)]
    service: String,
    #[serde(default)]
    provider: String,
}

pub struct ProxyApiFetcher {
    client: reqwest::Client,
    config: DataSourceConfig,
    fallbacks: Vec<String>,
}

impl ProxyApiFetcher {
    pub fn new(client: reqwest::Client, config: DataSourceConfig) -> Self {
        Self {
            client,
            config,
            fallbacks: DEFAULT_FALLBACK_URLS.iter().map(|url| url.to_string()).collect(),
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<String>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// GET `path` from the configured base, then from each fallback in turn
    /// while the failure is a transport error. Returns the base that
    /// answered along with the body.
    async fn locate(&self, path: &str) -> Result<(String, Value), FetchError> {
        let configured = self.config.url.trim_end_matches('/').to_string();
        let mut candidates = vec![configured.clone()];
        for fallback in &self.fallbacks {
            let fallback = fallback.trim_end_matches('/').to_string();
            if !candidates.contains(&fallback) {
                candidates.push(fallback);
            }
        }

        let mut tried = Vec::with_capacity(candidates.len());
        let mut last_error = None;
        for base in candidates {
            let url = join_url(&base, path);
            match get_json(&self.client, &self.config, &url).await {
                Ok(body) => {
                    if base != configured {
                        tracing::warn!(
                            configured = %configured,
                            working = %base,
                            "Proxy API only reachable through a fallback URL; update the data source URL to the working one"
                        );
                    }
                    return Ok((base, body));
                }
                Err(e) if e.is_transport() => {
                    tracing::debug!(url = %url, error = %e, "Proxy API unreachable, trying next base URL");
                    tried.push(base);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(FetchError::AllUrlsFailed {
            tried,
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// GET `path` from an already located base. Failures are logged and
    /// yield nothing.
    async fn optional(&self, base: &str, path: &str) -> Vec<(Option<String>, Value)> {
        let url = join_url(base, path);
        let body = match get_json(&self.client, &self.config, &url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Optional proxy API endpoint failed");
                return Vec::new();
            }
        };
        match entries(body) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Optional proxy API endpoint returned unexpected JSON");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Fetcher for ProxyApiFetcher {
    fn source_type(&self) -> DataSourceType {
        DataSourceType::ProxyApi
    }

    async fn fetch_resources(&self) -> Result<ResourceSet, FetchError> {
        let (base, body) = self.locate(HTTP_ROUTERS).await?;
        let http = entries(body).map_err(|source| FetchError::Decode {
            url: join_url(&base, HTTP_ROUTERS),
            source,
        })?;

        let mut resources = ResourceSet::new();
        let mut seen = HashSet::new();
        for router in parse_routers(http) {
            let Some(host) = extract_host(&router.rule) else {
                continue;
            };
            push_resource(&mut resources, &mut seen, router, host, RouterProtocol::Http);
        }

        // An HTTP router with the same id wins.
        for router in parse_routers(self.optional(&base, TCP_ROUTERS).await) {
            let Some(host) = extract_sni_host(&router.rule) else {
                continue;
            };
            push_resource(&mut resources, &mut seen, router, host, RouterProtocol::Tcp);
        }

        Ok(resources)
    }

    async fn fetch_services(&self) -> Result<ServiceSet, FetchError> {
        let (base, body) = self.locate(HTTP_SERVICES).await?;
        let http = entries(body).map_err(|source| FetchError::Decode {
            url: join_url(&base, HTTP_SERVICES),
            source,
        })?;

        let mut services = parse_services(http);
        services.extend(parse_services(self.optional(&base, TCP_SERVICES).await));
        services.extend(parse_services(self.optional(&base, UDP_SERVICES).await));
        Ok(services)
    }
}

/// Items of a response that is either a JSON array or an object keyed by
/// name. The key, when there is one, is returned alongside each item.
fn entries(body: Value) -> Result<Vec<(Option<String>, Value)>, serde_json::Error> {
    match serde_json::from_value::<Vec<Value>>(body.clone()) {
        Ok(items) => Ok(items.into_iter().map(|item| (None, item)).collect()),
        Err(_) => {
            let map: BTreeMap<String, Value> = serde_json::from_value(body)?;
            Ok(map.into_iter().map(|(key, item)| (Some(key), item)).collect())
        }
    }
}

fn parse_routers(items: Vec<(Option<String>, Value)>) -> Vec<ApiRouter> {
    let mut routers = Vec::with_capacity(items.len());
    for (key, raw) in items {
        let mut router: ApiRouter = match serde_json::from_value(raw) {
            Ok(router) => router,
            Err(e) => {
                tracing::warn!(key = ?key, error = %e, "Skipping malformed router");
                continue;
            }
        };
        if router.name.is_empty() {
            router.name = key.unwrap_or_default();
        }
        if router.name.is_empty() || is_internal(&router.name, &router.provider) {
            continue;
        }
        routers.push(router);
    }
    routers
}

fn push_resource(
    resources: &mut ResourceSet,
    seen: &mut HashSet<String>,
    router: ApiRouter,
    host: String,
    protocol: RouterProtocol,
) {
    let id = normalize(&router.name);
    if id.is_empty() || router.service.is_empty() || !seen.insert(id.clone()) {
        return;
    }
    let service_id = qualify(&router.service, &router.provider);
    resources.push(DiscoveredResource {
        id,
        host,
        service_id,
        protocol,
        rule: router.rule,
    });
}

fn parse_services(items: Vec<(Option<String>, Value)>) -> ServiceSet {
    let mut services = ServiceSet::new();
    for (key, raw) in items {
        let Some(entry) = raw.as_object() else {
            tracing::warn!(key = ?key, "Skipping service that is not an object");
            continue;
        };
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(key)
            .unwrap_or_default();
        let provider = entry.get("provider").and_then(Value::as_str).unwrap_or_default();

        if name.is_empty() || is_internal(&name, provider) {
            continue;
        }
        match infer_service_type(entry) {
            Some((kind, config)) => services.push(DiscoveredService {
                id: qualify(&name, provider),
                name: None,
                kind,
                config,
            }),
            None => tracing::warn!(service = %name, "Skipping service of unknown type"),
        }
    }
    services
}

/// Attach the reporting provider to a bare name.
fn qualify(name: &str, provider: &str) -> String {
    if has_suffix(name) || provider.is_empty() {
        name.to_string()
    } else {
        format!("{}@{}", name, provider)
    }
}
