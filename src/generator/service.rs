//! Typed service payloads and protocol classification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generator::values;
use crate::naming::{with_suffix, ProviderSuffix};
use crate::store::ServiceType;

type Extra = BTreeMap<String, Value>;

const UDP_SCHEME: &str = "udp://";

/// Output table a service belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Tcp,
    Udp,
}

/// One service, serialized as `{<type>: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceSpec {
    LoadBalancer(LoadBalancer),
    Weighted(Weighted),
    Mirroring(Mirroring),
    Failover(Failover),
}

impl ServiceSpec {
    /// Decode a stored `(type, config)` pair, unwrapping `{<type>: ...}`.
    pub fn from_parts(kind: ServiceType, config: Value) -> Result<Self, serde_json::Error> {
        let key = kind.as_str();
        let inner = match config {
            Value::Null => Value::Object(Default::default()),
            Value::Object(mut map) if map.len() == 1 && map.contains_key(key) => {
                map.remove(key).unwrap_or(Value::Null)
            }
            other => other,
        };
        let mut tagged = serde_json::Map::with_capacity(1);
        tagged.insert(key.to_string(), inner);
        serde_json::from_value(Value::Object(tagged))
    }

    /// Decide which table the service goes in.
    ///
    /// A load balancer is HTTP as soon as any server has a `url`. Servers
    /// with only an `address` are TCP, or UDP when an address uses the
    /// `udp://` scheme or the service id mentions `udp`. A load balancer
    /// with neither field, and every composite kind, is HTTP.
    pub fn classify(&self, id: &str) -> Protocol {
        let ServiceSpec::LoadBalancer(lb) = self else {
            return Protocol::Http;
        };
        if lb.servers.iter().any(|server| server.url.is_some()) {
            return Protocol::Http;
        }
        let addresses: Vec<&str> = lb.servers.iter().filter_map(|server| server.address.as_deref()).collect();
        if addresses.is_empty() {
            return Protocol::Http;
        }
        let udp_scheme = addresses
            .iter()
            .any(|address| address.trim().to_ascii_lowercase().starts_with(UDP_SCHEME));
        if udp_scheme || id.to_ascii_lowercase().contains("udp") {
            Protocol::Udp
        } else {
            Protocol::Tcp
        }
    }

    /// Remove the `udp://` scheme from server addresses.
    pub fn strip_udp_scheme(&mut self) {
        if let ServiceSpec::LoadBalancer(lb) = self {
            for server in &mut lb.servers {
                if let Some(address) = server.address.as_mut() {
                    let trimmed = address.trim();
                    if trimmed.to_ascii_lowercase().starts_with(UDP_SCHEME) {
                        *address = trimmed[UDP_SCHEME.len()..].to_string();
                    }
                }
            }
        }
    }

    /// Give referenced services without a provider the local file provider.
    pub fn qualify_references(&mut self) {
        let qualify = |name: &mut String| *name = with_suffix(name.trim(), ProviderSuffix::File);
        match self {
            ServiceSpec::LoadBalancer(_) => {}
            ServiceSpec::Weighted(weighted) => {
                weighted.services.iter_mut().for_each(|member| qualify(&mut member.name));
            }
            ServiceSpec::Mirroring(mirroring) => {
                qualify(&mut mirroring.service);
                mirroring.mirrors.iter_mut().for_each(|mirror| qualify(&mut mirror.name));
            }
            ServiceSpec::Failover(failover) => {
                qualify(&mut failover.service);
                if let Some(fallback) = failover.fallback.as_mut() {
                    qualify(fallback);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    #[serde(default)]
    pub servers: Vec<Server>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub pass_host_header: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub servers_transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_forwarding: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub preserve_path: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_scalar", skip_serializing_if = "Option::is_none")]
    pub interval: Option<values::Scalar>,
    #[serde(default, deserialize_with = "values::opt_scalar", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<values::Scalar>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_string_map", skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weighted {
    #[serde(default)]
    pub services: Vec<WeightedMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedMember {
    #[serde(default, deserialize_with = "values::string")]
    pub name: String,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mirroring {
    #[serde(default, deserialize_with = "values::string")]
    pub service: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<Mirror>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub mirror_body: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mirror {
    #[serde(default, deserialize_with = "values::string")]
    pub name: String,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub percent: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failover {
    #[serde(default, deserialize_with = "values::string")]
    pub service: String,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lb(config: Value) -> ServiceSpec {
        ServiceSpec::from_parts(ServiceType::LoadBalancer, config).unwrap()
    }

    #[test]
    fn test_classification() {
        assert_eq!(lb(json!({"servers": [{"url": "http://app:80"}]})).classify("app"), Protocol::Http);
        assert_eq!(lb(json!({"servers": [{"address": "db:5432"}]})).classify("db"), Protocol::Tcp);
        assert_eq!(lb(json!({"servers": [{"address": "udp://dns:53"}]})).classify("dns"), Protocol::Udp);
        assert_eq!(lb(json!({"servers": [{"address": "dns:53"}]})).classify("dns-udp"), Protocol::Udp);
        // Mixed servers: any url wins.
        assert_eq!(
            lb(json!({"servers": [{"address": "db:5432"}, {"url": "http://app"}]})).classify("x"),
            Protocol::Http
        );
        // Neither url nor address.
        assert_eq!(lb(json!({"servers": []})).classify("empty"), Protocol::Http);

        let weighted = ServiceSpec::from_parts(ServiceType::Weighted, json!({"services": []})).unwrap();
        assert_eq!(weighted.classify("udp-mix"), Protocol::Http);
    }

    #[test]
    fn test_udp_scheme_stripped() {
        let mut spec = lb(json!({"servers": [{"address": "udp://dns:53"}]}));
        spec.strip_udp_scheme();
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"loadBalancer": {"servers": [{"address": "dns:53"}]}})
        );
    }

    #[test]
    fn test_server_weight_coerced() {
        let spec = lb(json!({"servers": [{"url": "http://a", "weight": "3"}], "passHostHeader": "false"}));
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"loadBalancer": {"servers": [{"url": "http://a", "weight": 3}], "passHostHeader": false}})
        );
    }

    #[test]
    fn test_composite_references_qualified() {
        let mut spec = ServiceSpec::from_parts(
            ServiceType::Failover,
            json!({"service": "main", "fallback": "backup@docker"}),
        )
        .unwrap();
        spec.qualify_references();
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"failover": {"service": "main@file", "fallback": "backup@docker"}})
        );

        let mut spec = ServiceSpec::from_parts(
            ServiceType::Weighted,
            json!({"weighted": {"services": [{"name": "a", "weight": "2"}, {"name": "b@http", "weight": 1}]}}),
        )
        .unwrap();
        spec.qualify_references();
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"weighted": {"services": [{"name": "a@file", "weight": 2}, {"name": "b@http", "weight": 1}]}})
        );
    }
}
