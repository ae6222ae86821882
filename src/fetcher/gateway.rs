//! Fetcher for the gateway-management API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::datasource::{DataSourceConfig, DataSourceType};
use crate::fetcher::rules::{extract_host, extract_sni_host, infer_service_type, is_system_name};
use crate::fetcher::types::{DiscoveredResource, DiscoveredService, FetchError, ResourceSet, ServiceSet};
use crate::fetcher::{get_json, Fetcher};
use crate::naming::normalize;
use crate::store::RouterProtocol;

/// Endpoint serving the gateway's embedded proxy configuration.
pub const CONFIG_PATH: &str = "/traefik-config";

/// Proxy-style document served by the gateway.
#[derive(Debug, Default, Deserialize)]
struct GatewayDocument {
    #[serde(default)]
    http: Option<Section>,
    #[serde(default)]
    tcp: Option<Section>,
}

#[derive(Debug, Default, Deserialize)]
struct Section {
    #[serde(default)]
    routers: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    services: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RouterEntry {
    #[serde(default)]
    rule: String,
    #[serde(default)]
    service: String,
}

pub struct GatewayFetcher {
    client: reqwest::Client,
    config: DataSourceConfig,
}

impl GatewayFetcher {
    pub fn new(client: reqwest::Client, config: DataSourceConfig) -> Self {
        Self { client, config }
    }

    async fn document(&self) -> Result<GatewayDocument, FetchError> {
        let url = self.config.endpoint(CONFIG_PATH);
        let body = get_json(&self.client, &self.config, &url).await?;
        serde_json::from_value(body).map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl Fetcher for GatewayFetcher {
    fn source_type(&self) -> DataSourceType {
        DataSourceType::Gateway
    }

    async fn fetch_resources(&self) -> Result<ResourceSet, FetchError> {
        let document = self.document().await?;
        let mut resources = ResourceSet::new();
        for (section, protocol) in [
            (document.http, RouterProtocol::Http),
            (document.tcp, RouterProtocol::Tcp),
        ] {
            let routers = section.and_then(|section| section.routers).unwrap_or_default();
            for found in resources_from_routers(routers, protocol) {
                if !resources.iter().any(|r| r.id == found.id) {
                    resources.push(found);
                }
            }
        }
        Ok(resources)
    }

    async fn fetch_services(&self) -> Result<ServiceSet, FetchError> {
        let document = self.document().await?;
        let mut services = ServiceSet::new();
        for section in [document.http, document.tcp].into_iter().flatten() {
            services.extend(services_from_entries(section.services.unwrap_or_default()));
        }
        Ok(services)
    }
}

fn resources_from_routers(routers: BTreeMap<String, Value>, protocol: RouterProtocol) -> ResourceSet {
    let mut resources = ResourceSet::new();
    for (name, raw) in routers {
        if is_system_name(&name) {
            tracing::trace!(router = %name, "Skipping system router");
            continue;
        }
        let entry: RouterEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(router = %name, error = %e, "Skipping malformed router");
                continue;
            }
        };
        let host = match protocol {
            RouterProtocol::Http => extract_host(&entry.rule),
            RouterProtocol::Tcp => extract_sni_host(&entry.rule),
        };
        let Some(host) = host else {
            tracing::debug!(router = %name, rule = %entry.rule, "Router has no host matcher");
            continue;
        };
        let id = normalize(&name);
        if id.is_empty() || entry.service.is_empty() {
            tracing::warn!(router = %name, "Skipping router without id or service");
            continue;
        }
        resources.push(DiscoveredResource {
            id,
            host,
            service_id: entry.service,
            protocol,
            rule: entry.rule,
        });
    }
    resources
}

fn services_from_entries(entries: BTreeMap<String, Value>) -> ServiceSet {
    let mut services = ServiceSet::new();
    for (name, raw) in entries {
        if is_system_name(&name) {
            continue;
        }
        let Some(entry) = raw.as_object() else {
            tracing::warn!(service = %name, "Skipping service that is not an object");
            continue;
        };
        match infer_service_type(entry) {
            Some((kind, config)) => services.push(DiscoveredService {
                id: name,
                name: None,
                kind,
                config,
            }),
            None => tracing::warn!(service = %name, "Skipping service of unknown type"),
        }
    }
    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ServiceType;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "http": {
                "routers": {
                    "3-router": {"rule": "Host(`app.example.com`)", "service": "3-service", "entryPoints": ["websecure"]},
                    "3-router-redirect": {"rule": "Host(`app.example.com`)", "service": "3-service"},
                    "next-router": {"rule": "Host(`gw.example.com`) && !PathPrefix(`/api/v1`)", "service": "next-service"},
                    "4-router": {"rule": "PathPrefix(`/`)", "service": "4-service"},
                    "5-router": "not an object"
                },
                "services": {
                    "3-service": {"loadBalancer": {"servers": [{"url": "http://10.0.0.3:80"}]}},
                    "next-service": {"loadBalancer": {"servers": [{"url": "http://gw:3002"}]}},
                    "9-service": {"unknown": {}}
                }
            },
            "tcp": {
                "routers": {
                    "7-router": {"rule": "HostSNI(`db.example.com`)", "service": "7-service"},
                    "8-router": {"rule": "HostSNI(`*`)", "service": "8-service"}
                },
                "services": {
                    "7-service": {"loadBalancer": {"servers": [{"address": "10.0.0.7:5432"}]}}
                }
            }
        })
    }

    #[test]
    fn test_resources_from_document() {
        let document: GatewayDocument = serde_json::from_value(document()).unwrap();
        let resources = resources_from_routers(document.http.unwrap().routers.unwrap(), RouterProtocol::Http);
        assert_eq!(
            resources,
            vec![DiscoveredResource {
                id: "3-router".into(),
                host: "app.example.com".into(),
                service_id: "3-service".into(),
                protocol: RouterProtocol::Http,
                rule: "Host(`app.example.com`)".into(),
            }]
        );
    }

    #[test]
    fn test_tcp_routers_keep_their_protocol() {
        let document: GatewayDocument = serde_json::from_value(document()).unwrap();
        let resources = resources_from_routers(document.tcp.unwrap().routers.unwrap(), RouterProtocol::Tcp);
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id, "7-router");
        assert_eq!(resources[0].host, "db.example.com");
        assert_eq!(resources[0].protocol, RouterProtocol::Tcp);
        assert_eq!(resources[0].rule, "HostSNI(`db.example.com`)");
    }

    #[test]
    fn test_services_from_document() {
        let document: GatewayDocument = serde_json::from_value(document()).unwrap();
        let mut services = services_from_entries(document.http.unwrap().services.unwrap());
        services.extend(services_from_entries(document.tcp.unwrap().services.unwrap()));

        let ids: Vec<_> = services.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["3-service", "7-service"]);
        assert!(services.iter().all(|s| s.kind == ServiceType::LoadBalancer));
    }

    #[test]
    fn test_null_sections_are_empty() {
        let document: GatewayDocument =
            serde_json::from_value(json!({"http": null, "tcp": {"routers": null}})).unwrap();
        assert!(document.http.is_none());
        assert!(document.tcp.unwrap().routers.is_none());
    }
}
