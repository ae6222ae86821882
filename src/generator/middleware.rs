//! Typed middleware payloads.
//!
//! A stored middleware is `(type, config)`. Known types decode into a closed
//! set of variants so each field serializes with its real type; keys a
//! variant does not model are carried through `extra` untouched. Types with
//! no variant are published verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::generator::values::{self, Scalar};
use crate::naming::{with_suffix, ProviderSuffix};

type Extra = BTreeMap<String, Value>;

/// One middleware, serialized as `{<type>: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MiddlewareSpec {
    AddPrefix(AddPrefix),
    BasicAuth(UserAuth),
    Buffering(Buffering),
    Chain(Chain),
    CircuitBreaker(CircuitBreaker),
    Compress(Compress),
    ContentType(ContentType),
    DigestAuth(UserAuth),
    Errors(ErrorPages),
    ForwardAuth(ForwardAuth),
    GrpcWeb(GrpcWeb),
    Headers(Headers),
    InFlightReq(InFlightReq),
    IpAllowList(IpList),
    IpWhiteList(IpList),
    #[serde(rename = "passTLSClientCert")]
    PassTlsClientCert(PassTlsClientCert),
    /// Plugin configs are opaque and pass through verbatim.
    Plugin(BTreeMap<String, Value>),
    RateLimit(RateLimit),
    RedirectRegex(RedirectRegex),
    RedirectScheme(RedirectScheme),
    ReplacePath(ReplacePath),
    ReplacePathRegex(ReplacePathRegex),
    Retry(Retry),
    StripPrefix(StripPrefix),
    StripPrefixRegex(StripPrefixRegex),
}

/// Type keys with a [`MiddlewareSpec`] variant.
pub const MODELLED_KINDS: &[&str] = &[
    "addPrefix",
    "basicAuth",
    "buffering",
    "chain",
    "circuitBreaker",
    "compress",
    "contentType",
    "digestAuth",
    "errors",
    "forwardAuth",
    "grpcWeb",
    "headers",
    "inFlightReq",
    "ipAllowList",
    "ipWhiteList",
    "passTLSClientCert",
    "plugin",
    "rateLimit",
    "redirectRegex",
    "redirectScheme",
    "replacePath",
    "replacePathRegex",
    "retry",
    "stripPrefix",
    "stripPrefixRegex",
];

/// A config that already wraps itself in `{<type>: ...}` is unwrapped.
/// `null` becomes an empty object.
fn unwrap_config(kind: &str, config: Value) -> Value {
    match config {
        Value::Null => Value::Object(Default::default()),
        Value::Object(mut map) if map.len() == 1 && map.contains_key(kind) => {
            match map.remove(kind) {
                Some(Value::Null) | None => Value::Object(Default::default()),
                Some(inner) => inner,
            }
        }
        other => other,
    }
}

impl MiddlewareSpec {
    /// Decode a stored `(type, config)` pair of a modelled type.
    pub fn from_parts(kind: &str, config: Value) -> Result<Self, serde_json::Error> {
        let kind = kind.trim();
        let mut tagged = serde_json::Map::with_capacity(1);
        tagged.insert(kind.to_string(), unwrap_config(kind, config));
        serde_json::from_value(Value::Object(tagged))
    }

    /// Headers middleware built from a resource's custom request headers.
    pub fn custom_request_headers(headers: BTreeMap<String, String>) -> Self {
        MiddlewareSpec::Headers(Headers {
            custom_request_headers: Some(headers),
            ..Headers::default()
        })
    }

    /// Give chain members without a provider the local file provider.
    pub fn qualify_references(&mut self) {
        if let MiddlewareSpec::Chain(chain) = self {
            for member in &mut chain.middlewares {
                *member = with_suffix(member.trim(), ProviderSuffix::File);
            }
        }
    }
}

/// A middleware as published: typed when its type is modelled, otherwise
/// the stored `{<type>: config}` object as is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MiddlewareEntry {
    Typed(MiddlewareSpec),
    Verbatim(BTreeMap<String, Value>),
}

impl MiddlewareEntry {
    /// Modelled types are decoded strictly; anything else only needs a
    /// non-empty type key.
    pub fn from_parts(kind: &str, config: Value) -> Result<Self, serde_json::Error> {
        let kind = kind.trim();
        if MODELLED_KINDS.contains(&kind) {
            return MiddlewareSpec::from_parts(kind, config).map(MiddlewareEntry::Typed);
        }
        if kind.is_empty() {
            return Err(serde::de::Error::custom("middleware type is empty"));
        }
        let inner = unwrap_config(kind, config);
        Ok(MiddlewareEntry::Verbatim(BTreeMap::from([(kind.to_string(), inner)])))
    }

    pub fn qualify_references(&mut self) {
        if let MiddlewareEntry::Typed(spec) = self {
            spec.qualify_references();
        }
    }

    pub fn is_typed(&self) -> bool {
        matches!(self, MiddlewareEntry::Typed(_))
    }
}

impl From<MiddlewareSpec> for MiddlewareEntry {
    fn from(spec: MiddlewareSpec) -> Self {
        MiddlewareEntry::Typed(spec)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPrefix {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Shared shape of `basicAuth` and `digestAuth`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAuth {
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub users_file: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub remove_header: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub header_field: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buffering {
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub max_request_body_bytes: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub mem_request_body_bytes: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub max_response_body_bytes: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub mem_response_body_bytes: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub retry_expression: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    #[serde(default, deserialize_with = "chain_members")]
    pub middlewares: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn chain_members<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(values::opt_list(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreaker {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, deserialize_with = "values::opt_scalar", skip_serializing_if = "Option::is_none")]
    pub check_period: Option<Scalar>,
    #[serde(default, deserialize_with = "values::opt_scalar", skip_serializing_if = "Option::is_none")]
    pub fallback_duration: Option<Scalar>,
    #[serde(default, deserialize_with = "values::opt_scalar", skip_serializing_if = "Option::is_none")]
    pub recovery_duration: Option<Scalar>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub response_code: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compress {
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub excluded_content_types: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub included_content_types: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub min_response_body_bytes: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub default_encoding: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub auto_detect: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPages {
    /// Status codes or ranges such as `"500-599"`.
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub status: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardAuth {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub trust_forward_header: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub auth_response_headers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub auth_response_headers_regex: Option<String>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub auth_request_headers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub add_auth_cookies_to_response: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub max_body_size: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub forward_body: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcWeb {
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub allow_origins: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Headers {
    #[serde(default, deserialize_with = "values::opt_string_map", skip_serializing_if = "Option::is_none")]
    pub custom_request_headers: Option<BTreeMap<String, String>>,
    #[serde(default, deserialize_with = "values::opt_string_map", skip_serializing_if = "Option::is_none")]
    pub custom_response_headers: Option<BTreeMap<String, String>>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub access_control_allow_credentials: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub access_control_allow_headers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub access_control_allow_methods: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub access_control_allow_origin_list: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub access_control_allow_origin_list_regex: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub access_control_expose_headers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub access_control_max_age: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub add_vary_header: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub hosts_proxy_headers: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_string_map", skip_serializing_if = "Option::is_none")]
    pub ssl_proxy_headers: Option<BTreeMap<String, String>>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub sts_seconds: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub sts_include_subdomains: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub sts_preload: Option<bool>,
    #[serde(
        default,
        rename = "forceSTSHeader",
        deserialize_with = "values::opt_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub force_sts_header: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub frame_deny: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub custom_frame_options_value: Option<String>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub content_type_nosniff: Option<bool>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub browser_xss_filter: Option<bool>,
    #[serde(
        default,
        rename = "customBrowserXSSValue",
        deserialize_with = "values::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_browser_xss_value: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub content_security_policy: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub referrer_policy: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub permissions_policy: Option<String>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub is_development: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightReq {
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_criterion: Option<SourceCriterion>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Shared shape of `ipAllowList` and the older `ipWhiteList`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpList {
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub source_range: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_strategy: Option<IpStrategy>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub reject_status_code: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpStrategy {
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
    #[serde(
        default,
        rename = "excludedIPs",
        deserialize_with = "values::opt_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub excluded_ips: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCriterion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_strategy: Option<IpStrategy>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub request_header_name: Option<String>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub request_host: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassTlsClientCert {
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub pem: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub average: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub burst: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_scalar", skip_serializing_if = "Option::is_none")]
    pub period: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_criterion: Option<SourceCriterion>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRegex {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub permanent: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectScheme {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    /// The proxy expects the port as a string.
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub permanent: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePath {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePathRegex {
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, deserialize_with = "values::opt_string", skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retry {
    #[serde(default, deserialize_with = "values::opt_i64", skip_serializing_if = "Option::is_none")]
    pub attempts: Option<i64>,
    #[serde(default, deserialize_with = "values::opt_scalar", skip_serializing_if = "Option::is_none")]
    pub initial_interval: Option<Scalar>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripPrefix {
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub prefixes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "values::opt_bool", skip_serializing_if = "Option::is_none")]
    pub force_slash: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripPrefixRegex {
    #[serde(default, deserialize_with = "values::opt_list", skip_serializing_if = "Option::is_none")]
    pub regex: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Extra,
}
