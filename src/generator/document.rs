//! The published dynamic configuration document.
//!
//! Maps are `BTreeMap` so rendering the same data twice yields the same
//! bytes. Every section is always present, even when empty.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::generator::middleware::MiddlewareEntry;
use crate::generator::service::ServiceSpec;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DynamicConfig {
    pub http: HttpSection,
    pub tcp: TcpSection,
    pub udp: UdpSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpSection {
    pub middlewares: BTreeMap<String, MiddlewareEntry>,
    pub routers: BTreeMap<String, HttpRouter>,
    pub services: BTreeMap<String, ServiceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TcpSection {
    pub routers: BTreeMap<String, TcpRouter>,
    pub services: BTreeMap<String, ServiceSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UdpSection {
    pub services: BTreeMap<String, ServiceSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouter {
    pub rule: String,
    pub service: String,
    pub entry_points: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub middlewares: Vec<String>,
    pub priority: i64,
    pub tls: RouterTls,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpRouter {
    pub rule: String,
    pub service: String,
    pub entry_points: Vec<String>,
    pub tls: RouterTls,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterTls {
    pub cert_resolver: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<TlsDomain>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TlsDomain {
    pub main: String,
    pub sans: Vec<String>,
}

impl RouterTls {
    /// TLS block for `host`. Domains are listed only when SANs exist.
    pub fn new(cert_resolver: &str, host: &str, sans: Vec<String>) -> Self {
        let domains = if sans.is_empty() {
            Vec::new()
        } else {
            vec![TlsDomain {
                main: host.to_string(),
                sans,
            }]
        };
        Self {
            cert_resolver: cert_resolver.to_string(),
            domains,
        }
    }
}

impl DynamicConfig {
    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
