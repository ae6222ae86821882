//! Router rule and naming helpers shared by both fetchers.

use serde_json::{Map, Value};

use crate::store::ServiceType;

/// Name fragments of routers and services the gateway creates for itself.
const SYSTEM_NAME_FRAGMENTS: &[&str] = &[
    "api-router",
    "next-router",
    "ws-router",
    "api-service",
    "next-service",
    "noop",
    "-redirect",
];

/// Host of a `Host(`...`)` matcher, if the rule has one.
///
/// Plain substring extraction of the first matcher; no rule parsing.
pub fn extract_host(rule: &str) -> Option<String> {
    extract_between(rule, "Host(`")
}

/// Host of a `HostSNI(`...`)` matcher, ignoring the `*` catch-all.
pub fn extract_sni_host(rule: &str) -> Option<String> {
    extract_between(rule, "HostSNI(`").filter(|host| host != "*")
}

fn extract_between(rule: &str, opener: &str) -> Option<String> {
    let start = rule.find(opener)? + opener.len();
    let rest = &rule[start..];
    let end = rest.find('`')?;
    let host = rest[..end].trim();
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Routers and services the gateway runs for its own UI and API.
pub fn is_system_name(name: &str) -> bool {
    SYSTEM_NAME_FRAGMENTS.iter().any(|fragment| name.contains(fragment))
}

/// Objects the proxy registers internally (dashboard, api, acme, ...).
pub fn is_internal(name: &str, provider: &str) -> bool {
    provider == "internal" || name.ends_with("@internal")
}

/// The service kind whose sub-object is populated, with that sub-object.
///
/// Kinds are mutually exclusive; if several are present the first in
/// `ServiceType::ALL` order wins.
pub fn infer_service_type(entry: &Map<String, Value>) -> Option<(ServiceType, Value)> {
    ServiceType::ALL.into_iter().find_map(|kind| match entry.get(kind.as_str()) {
        Some(body @ Value::Object(_)) => Some((kind, body.clone())),
        _ => None,
    })
}
