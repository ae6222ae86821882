//! Row types for the relational model.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Active,
    Disabled,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Active => "active",
            ResourceStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which router table a discovered resource came from.
///
/// A `tcp` resource was only ever reported by a TCP router and gets no
/// HTTP router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RouterProtocol {
    #[default]
    Http,
    Tcp,
}

impl RouterProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterProtocol::Http => "http",
            RouterProtocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for RouterProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service kinds. Exactly one of these sub-objects describes a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceType {
    LoadBalancer,
    Weighted,
    Mirroring,
    Failover,
}

impl ServiceType {
    pub const ALL: [ServiceType; 4] = [
        ServiceType::LoadBalancer,
        ServiceType::Weighted,
        ServiceType::Mirroring,
        ServiceType::Failover,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::LoadBalancer => "loadBalancer",
            ServiceType::Weighted => "weighted",
            ServiceType::Mirroring => "mirroring",
            ServiceType::Failover => "failover",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown service type '{}'", s))
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Middleware {
    pub id: String,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    /// JSON document.
    pub config: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Middleware {
    pub fn config_value(&self) -> Result<Value, serde_json::Error> {
        parse_document(&self.config)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    /// JSON document.
    pub config: String,
    pub source_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn config_value(&self) -> Result<Value, serde_json::Error> {
        parse_document(&self.config)
    }

    pub fn service_type(&self) -> Result<ServiceType, String> {
        self.kind.parse()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Resource {
    pub id: String,
    pub host: String,
    pub service_id: String,
    pub status: ResourceStatus,
    pub source_type: String,
    pub protocol: RouterProtocol,
    /// Ordered, comma separated.
    pub entrypoints: String,
    /// Comma separated SANs.
    pub tls_domains: String,
    /// JSON object of header name to value.
    pub custom_headers: String,
    pub router_priority: i64,
    pub tcp_enabled: bool,
    pub tcp_entrypoints: String,
    pub tcp_sni_rule: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_ENTRYPOINT: &str = "websecure";
pub const DEFAULT_TCP_ENTRYPOINT: &str = "tcp";
pub const DEFAULT_ROUTER_PRIORITY: i64 = 100;

impl Resource {
    pub fn is_active(&self) -> bool {
        self.status == ResourceStatus::Active
    }

    /// Whether an HTTP router is generated for this resource.
    pub fn routes_http(&self) -> bool {
        self.protocol == RouterProtocol::Http
    }

    /// HTTP entrypoints, `["websecure"]` when none are configured.
    pub fn entrypoint_list(&self) -> Vec<String> {
        list_or(&self.entrypoints, DEFAULT_ENTRYPOINT)
    }

    /// TCP entrypoints, `["tcp"]` when none are configured.
    pub fn tcp_entrypoint_list(&self) -> Vec<String> {
        list_or(&self.tcp_entrypoints, DEFAULT_TCP_ENTRYPOINT)
    }

    /// Non-empty SANs.
    pub fn tls_sans(&self) -> Vec<String> {
        split_list(&self.tls_domains)
    }

    /// Custom headers. Empty values are kept; `null` becomes an empty string
    /// and other scalars their textual form.
    pub fn headers(&self) -> Result<BTreeMap<String, String>, serde_json::Error> {
        if self.custom_headers.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let raw: BTreeMap<String, Value> = serde_json::from_str(&self.custom_headers)?;
        Ok(raw
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::Null => String::new(),
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MiddlewareAssignment {
    pub resource_id: String,
    pub middleware_id: String,
    pub priority: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ServiceAssignment {
    pub resource_id: String,
    pub service_id: String,
}

/// Input for creating a middleware.
#[derive(Debug, Clone)]
pub struct NewMiddleware {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub config: Value,
}

/// An upstream report of a resource, as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSighting {
    pub id: String,
    pub host: String,
    pub service_id: String,
    pub source_type: String,
    pub protocol: RouterProtocol,
    /// Upstream SNI rule. Stored only when a TCP resource is first inserted.
    pub sni_rule: String,
}

impl ResourceSighting {
    pub fn http(id: &str, host: &str, service_id: &str, source_type: &str) -> Self {
        Self {
            id: id.to_string(),
            host: host.to_string(),
            service_id: service_id.to_string(),
            source_type: source_type.to_string(),
            protocol: RouterProtocol::Http,
            sni_rule: String::new(),
        }
    }

    pub fn tcp(id: &str, host: &str, service_id: &str, source_type: &str, sni_rule: &str) -> Self {
        Self {
            protocol: RouterProtocol::Tcp,
            sni_rule: sni_rule.to_string(),
            ..Self::http(id, host, service_id, source_type)
        }
    }
}

/// Input for creating a service.
#[derive(Debug, Clone)]
pub struct NewService {
    pub id: String,
    pub name: String,
    pub kind: ServiceType,
    pub config: Value,
    pub source_type: String,
}

/// Operator-owned resource fields. The resource watcher never writes these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSettings {
    pub entrypoints: String,
    pub tls_domains: String,
    pub custom_headers: BTreeMap<String, String>,
    pub router_priority: i64,
    pub tcp_enabled: bool,
    pub tcp_entrypoints: String,
    pub tcp_sni_rule: String,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            entrypoints: DEFAULT_ENTRYPOINT.to_string(),
            tls_domains: String::new(),
            custom_headers: BTreeMap::new(),
            router_priority: DEFAULT_ROUTER_PRIORITY,
            tcp_enabled: false,
            tcp_entrypoints: DEFAULT_TCP_ENTRYPOINT.to_string(),
            tcp_sni_rule: String::new(),
        }
    }
}

/// Split a comma list, trimming items and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn list_or(raw: &str, fallback: &str) -> Vec<String> {
    let items = split_list(raw);
    if items.is_empty() {
        vec![fallback.to_string()]
    } else {
        items
    }
}

fn parse_document(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource() -> Resource {
        Resource {
            id: "r1".into(),
            host: "app.example.com".into(),
            service_id: "svc".into(),
            status: ResourceStatus::Active,
            source_type: "gateway".into(),
            protocol: RouterProtocol::Http,
            entrypoints: String::new(),
            tls_domains: " , ".into(),
            custom_headers: String::new(),
            router_priority: DEFAULT_ROUTER_PRIORITY,
            tcp_enabled: false,
            tcp_entrypoints: " ".into(),
            tcp_sni_rule: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_list_defaults() {
        let mut r = resource();
        assert_eq!(r.entrypoint_list(), vec!["websecure"]);
        assert_eq!(r.tcp_entrypoint_list(), vec!["tcp"]);
        assert!(r.tls_sans().is_empty());

        r.entrypoints = "web, websecure ,".into();
        r.tls_domains = "a.example.com,, b.example.com".into();
        assert_eq!(r.entrypoint_list(), vec!["web", "websecure"]);
        assert_eq!(r.tls_sans(), vec!["a.example.com", "b.example.com"]);
    }

    #[test]
    fn test_headers_keep_empty_values() {
        let mut r = resource();
        r.custom_headers = r#"{"Server":"","X-Num":5,"X-Null":null,"X-Real":"yes"}"#.into();
        let headers = r.headers().unwrap();
        assert_eq!(headers["Server"], "");
        assert_eq!(headers["X-Num"], "5");
        assert_eq!(headers["X-Null"], "");
        assert_eq!(headers["X-Real"], "yes");
    }

    #[test]
    fn test_service_type_parse() {
        assert_eq!("loadBalancer".parse::<ServiceType>().unwrap(), ServiceType::LoadBalancer);
        assert_eq!("FAILOVER".parse::<ServiceType>().unwrap(), ServiceType::Failover);
        assert!("roundRobin".parse::<ServiceType>().is_err());
    }
}
