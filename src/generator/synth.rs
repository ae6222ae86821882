//! Pure synthesis of the dynamic configuration from a store snapshot.
//!
//! # Passes
//! ```text
//! middlewares → http.middlewares        (typed or verbatim, chain refs → @file)
//! services    → http|tcp|udp.services   (typed decode, classify)
//! resources   → http.routers            (http protocol; chain = headers + assignments by priority desc + auth)
//! resources   → tcp.routers             (tcp_enabled only)
//! ```
//! Rows that fail to decode are logged and left out; siblings still render.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::datasource::DataSourceType;
use crate::generator::document::{DynamicConfig, HttpRouter, RouterTls, TcpRouter};
use crate::generator::middleware::{MiddlewareEntry, MiddlewareSpec};
use crate::generator::service::{Protocol, ServiceSpec};
use crate::naming::{has_suffix, strip_suffix, with_suffix, ProviderSuffix};
use crate::store::{
    Middleware, MiddlewareAssignment, Resource, Service, ServiceAssignment, Store, StoreResult,
};

/// Everything one generation reads from the store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub middlewares: Vec<Middleware>,
    pub services: Vec<Service>,
    /// Active resources only.
    pub resources: Vec<Resource>,
    pub middleware_assignments: Vec<MiddlewareAssignment>,
    pub service_assignments: Vec<ServiceAssignment>,
}

impl Snapshot {
    pub async fn load(store: &Store) -> StoreResult<Self> {
        Ok(Self {
            middlewares: store.middlewares().await?,
            services: store.services().await?,
            resources: store.active_resources().await?,
            middleware_assignments: store.middleware_assignments().await?,
            service_assignments: store.service_assignments().await?,
        })
    }
}

/// Inputs that do not come from the store.
#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub active_source: DataSourceType,
    pub cert_resolver: String,
    /// Appended to every HTTP chain while the gateway source is active.
    pub gateway_auth_middleware: String,
}

pub fn router_name(resource_id: &str) -> String {
    format!("{}-router", resource_id)
}

pub fn tcp_router_name(resource_id: &str) -> String {
    format!("{}-tcp-router", resource_id)
}

pub fn headers_middleware_name(resource_id: &str) -> String {
    format!("{}-customheaders", resource_id)
}

/// Build the document. Same snapshot and settings, same document.
pub fn synthesize(snapshot: &Snapshot, settings: &SynthesisSettings) -> DynamicConfig {
    let mut doc = DynamicConfig::default();

    let rendered = render_middlewares(snapshot, &mut doc);
    render_services(snapshot, &mut doc);

    let chains = middleware_chains(&snapshot.middleware_assignments, &rendered);
    let custom_services: HashMap<&str, &str> = snapshot
        .service_assignments
        .iter()
        .map(|a| (a.resource_id.as_str(), a.service_id.as_str()))
        .collect();

    for resource in &snapshot.resources {
        let host = resource.host.trim();
        if host.is_empty() {
            tracing::warn!(resource_id = %resource.id, "Skipping resource without host");
            continue;
        }

        let service = match custom_services.get(resource.id.as_str()) {
            Some(custom) => with_suffix(strip_suffix(custom), ProviderSuffix::File),
            None => default_service_ref(resource, settings.active_source),
        };

        if resource.routes_http() {
            render_http_router(resource, host, &service, chains.get(resource.id.as_str()), settings, &mut doc);
        }
        if resource.tcp_enabled {
            render_tcp_router(resource, host, &service, settings, &mut doc);
        }
    }

    doc
}

/// Emit every decodable middleware. Returns the ids that were emitted.
fn render_middlewares(snapshot: &Snapshot, doc: &mut DynamicConfig) -> HashSet<String> {
    let mut rendered = HashSet::with_capacity(snapshot.middlewares.len());
    for row in &snapshot.middlewares {
        let entry = row
            .config_value()
            .and_then(|config| MiddlewareEntry::from_parts(&row.kind, config));
        match entry {
            Ok(mut entry) => {
                if !entry.is_typed() {
                    tracing::debug!(middleware_id = %row.id, kind = %row.kind, "Publishing middleware of unmodelled type verbatim");
                }
                entry.qualify_references();
                doc.http.middlewares.insert(strip_suffix(&row.id).to_string(), entry);
                rendered.insert(row.id.clone());
            }
            Err(e) => {
                tracing::warn!(middleware_id = %row.id, kind = %row.kind, error = %e, "Skipping middleware with invalid config");
            }
        }
    }
    rendered
}

fn render_services(snapshot: &Snapshot, doc: &mut DynamicConfig) {
    for row in &snapshot.services {
        let kind = match row.service_type() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(service_id = %row.id, error = %e, "Skipping service with unknown type");
                continue;
            }
        };
        let spec = row
            .config_value()
            .and_then(|config| ServiceSpec::from_parts(kind, config));
        let mut spec = match spec {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!(service_id = %row.id, kind = %kind, error = %e, "Skipping service with invalid config");
                continue;
            }
        };

        spec.qualify_references();
        let key = strip_suffix(&row.id).to_string();
        match spec.classify(&row.id) {
            Protocol::Http => {
                doc.http.services.insert(key, spec);
            }
            Protocol::Tcp => {
                doc.tcp.services.insert(key, spec);
            }
            Protocol::Udp => {
                spec.strip_udp_scheme();
                doc.udp.services.insert(key, spec);
            }
        }
    }
}

/// Per-resource middleware references, highest priority first.
///
/// Ties are broken by middleware id. Every reference names the emitted key
/// under the file provider. Assignments to middlewares that were not
/// emitted are dropped.
fn middleware_chains<'a>(
    assignments: &'a [MiddlewareAssignment],
    rendered: &HashSet<String>,
) -> HashMap<&'a str, Vec<String>> {
    let mut grouped: HashMap<&str, Vec<&MiddlewareAssignment>> = HashMap::new();
    for assignment in assignments {
        if !rendered.contains(&assignment.middleware_id) {
            tracing::warn!(
                resource_id = %assignment.resource_id,
                middleware_id = %assignment.middleware_id,
                "Dropping reference to middleware that was not rendered"
            );
            continue;
        }
        grouped.entry(assignment.resource_id.as_str()).or_default().push(assignment);
    }

    grouped
        .into_iter()
        .map(|(resource_id, mut items)| {
            items.sort_by(|a, b| {
                (Reverse(a.priority), &a.middleware_id).cmp(&(Reverse(b.priority), &b.middleware_id))
            });
            let refs = items
                .into_iter()
                .map(|a| with_suffix(strip_suffix(&a.middleware_id), ProviderSuffix::File))
                .collect();
            (resource_id, refs)
        })
        .collect()
}

/// Reference to the resource's discovered service.
///
/// Explicit providers are kept. Otherwise a resource discovered by the
/// active source points at that source's runtime provider, and anything
/// else at the HTTP provider.
fn default_service_ref(resource: &Resource, active: DataSourceType) -> String {
    let service = resource.service_id.trim();
    if has_suffix(service) {
        return service.to_string();
    }
    let suffix = if resource.source_type == active.as_str() {
        active.runtime_suffix()
    } else {
        ProviderSuffix::Http
    };
    with_suffix(service, suffix)
}

fn render_http_router(
    resource: &Resource,
    host: &str,
    service: &str,
    assigned: Option<&Vec<String>>,
    settings: &SynthesisSettings,
    doc: &mut DynamicConfig,
) {
    let mut middlewares = Vec::new();

    match resource.headers() {
        Ok(headers) if !headers.is_empty() => {
            let name = headers_middleware_name(&resource.id);
            doc.http
                .middlewares
                .insert(name.clone(), MiddlewareSpec::custom_request_headers(headers).into());
            middlewares.push(with_suffix(&name, ProviderSuffix::File));
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(resource_id = %resource.id, error = %e, "Ignoring unreadable custom headers");
        }
    }

    if let Some(assigned) = assigned {
        middlewares.extend(assigned.iter().cloned());
    }

    let auth = settings.gateway_auth_middleware.trim();
    if settings.active_source == DataSourceType::Gateway
        && !auth.is_empty()
        && !middlewares.iter().any(|m| m == auth)
    {
        middlewares.push(auth.to_string());
    }

    doc.http.routers.insert(
        router_name(&resource.id),
        HttpRouter {
            rule: format!("Host(`{}`)", host),
            service: service.to_string(),
            entry_points: resource.entrypoint_list(),
            middlewares,
            priority: resource.router_priority,
            tls: RouterTls::new(&settings.cert_resolver, host, resource.tls_sans()),
        },
    );
}

fn render_tcp_router(
    resource: &Resource,
    host: &str,
    service: &str,
    settings: &SynthesisSettings,
    doc: &mut DynamicConfig,
) {
    let custom_rule = resource.tcp_sni_rule.trim();
    let rule = if custom_rule.is_empty() {
        format!("HostSNI(`{}`)", host)
    } else {
        custom_rule.to_string()
    };

    doc.tcp.routers.insert(
        tcp_router_name(&resource.id),
        TcpRouter {
            rule,
            service: service.to_string(),
            entry_points: resource.tcp_entrypoint_list(),
            tls: RouterTls::new(&settings.cert_resolver, host, resource.tls_sans()),
        },
    );
}

/// Object counts per table, for logging.
pub fn summary(doc: &DynamicConfig) -> BTreeMap<&'static str, usize> {
    BTreeMap::from([
        ("http_middlewares", doc.http.middlewares.len()),
        ("http_routers", doc.http.routers.len()),
        ("http_services", doc.http.services.len()),
        ("tcp_routers", doc.tcp.routers.len()),
        ("tcp_services", doc.tcp.services.len()),
        ("udp_services", doc.udp.services.len()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ResourceStatus, RouterProtocol};
    use chrono::Utc;
    use serde_json::json;

    fn settings(active: DataSourceType) -> SynthesisSettings {
        SynthesisSettings {
            active_source: active,
            cert_resolver: "letsencrypt".into(),
            gateway_auth_middleware: "badger@http".into(),
        }
    }

    fn resource(id: &str, host: &str) -> Resource {
        Resource {
            id: id.into(),
            host: host.into(),
            service_id: format!("{}-service", id),
            status: ResourceStatus::Active,
            source_type: "gateway".into(),
            protocol: RouterProtocol::Http,
            entrypoints: "websecure".into(),
            tls_domains: String::new(),
            custom_headers: String::new(),
            router_priority: 100,
            tcp_enabled: false,
            tcp_entrypoints: "tcp".into(),
            tcp_sni_rule: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn middleware(id: &str, kind: &str, config: serde_json::Value) -> Middleware {
        Middleware {
            id: id.into(),
            name: id.into(),
            kind: kind.into(),
            config: config.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(id: &str, kind: &str, config: serde_json::Value) -> Service {
        Service {
            id: id.into(),
            name: id.into(),
            kind: kind.into(),
            config: config.to_string(),
            source_type: "gateway".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn assign(resource_id: &str, middleware_id: &str, priority: i64) -> MiddlewareAssignment {
        MiddlewareAssignment {
            resource_id: resource_id.into(),
            middleware_id: middleware_id.into(),
            priority,
        }
    }

    #[test]
    fn test_chain_is_ordered_by_descending_priority() {
        let snapshot = Snapshot {
            middlewares: vec![
                middleware("A", "compress", json!({})),
                middleware("B", "compress", json!({})),
                middleware("C", "compress", json!({})),
            ],
            resources: vec![resource("app", "app.example.com")],
            middleware_assignments: vec![assign("app", "A", 10), assign("app", "B", 50), assign("app", "C", 30)],
            ..Snapshot::default()
        };
        let doc = synthesize(&snapshot, &settings(DataSourceType::ProxyApi));
        assert_eq!(doc.http.routers["app-router"].middlewares, vec!["B@file", "C@file", "A@file"]);
    }

    #[test]
    fn test_custom_headers_prepended_and_auth_appended() {
        let mut app = resource("app", "app.example.com");
        app.custom_headers = json!({"X-Forwarded-Proto": "https", "Server": ""}).to_string();
        let snapshot = Snapshot {
            middlewares: vec![middleware("limit", "rateLimit", json!({"average": "10"}))],
            resources: vec![app],
            middleware_assignments: vec![assign("app", "limit", 5)],
            ..Snapshot::default()
        };

        let doc = synthesize(&snapshot, &settings(DataSourceType::Gateway));
        assert_eq!(
            doc.http.routers["app-router"].middlewares,
            vec!["app-customheaders@file", "limit@file", "badger@http"]
        );

        let headers = serde_json::to_value(&doc.http.middlewares["app-customheaders"]).unwrap();
        assert_eq!(headers["headers"]["customRequestHeaders"]["Server"], json!(""));

        // Not appended for the proxy API source.
        let doc = synthesize(&snapshot, &settings(DataSourceType::ProxyApi));
        assert_eq!(doc.http.routers["app-router"].middlewares, vec!["app-customheaders@file", "limit@file"]);
    }

    #[test]
    fn test_auth_middleware_not_duplicated() {
        let snapshot = Snapshot {
            middlewares: vec![middleware("authelia", "forwardAuth", json!({"address": "http://authelia"}))],
            resources: vec![resource("app", "app.example.com")],
            middleware_assignments: vec![assign("app", "authelia", 1)],
            ..Snapshot::default()
        };
        let settings = SynthesisSettings {
            gateway_auth_middleware: "authelia@file".into(),
            ..settings(DataSourceType::Gateway)
        };
        let doc = synthesize(&snapshot, &settings);
        assert_eq!(doc.http.routers["app-router"].middlewares, vec!["authelia@file"]);
    }

    #[test]
    fn test_chain_references_match_emitted_keys() {
        let snapshot = Snapshot {
            middlewares: vec![
                middleware("auth@docker", "forwardAuth", json!({"address": "http://auth"})),
                middleware("limit@file", "rateLimit", json!({"average": 5})),
            ],
            resources: vec![resource("app", "app.example.com")],
            middleware_assignments: vec![assign("app", "auth@docker", 20), assign("app", "limit@file", 10)],
            ..Snapshot::default()
        };
        let doc = synthesize(&snapshot, &settings(DataSourceType::ProxyApi));
        assert!(doc.http.middlewares.contains_key("auth"));
        assert!(doc.http.middlewares.contains_key("limit"));
        assert_eq!(doc.http.routers["app-router"].middlewares, vec!["auth@file", "limit@file"]);
    }

    #[test]
    fn test_unmodelled_middleware_is_emitted_and_referenced() {
        let snapshot = Snapshot {
            middlewares: vec![
                middleware("grpc", "grpcWeb", json!({"allowOrigins": ["*"]})),
                middleware("custom", "teleport", json!({"to": "elsewhere"})),
            ],
            resources: vec![resource("app", "app.example.com")],
            middleware_assignments: vec![assign("app", "grpc", 2), assign("app", "custom", 1)],
            ..Snapshot::default()
        };
        let doc = synthesize(&snapshot, &settings(DataSourceType::ProxyApi));
        assert_eq!(
            serde_json::to_value(&doc.http.middlewares["grpc"]).unwrap(),
            json!({"grpcWeb": {"allowOrigins": ["*"]}})
        );
        assert_eq!(
            serde_json::to_value(&doc.http.middlewares["custom"]).unwrap(),
            json!({"teleport": {"to": "elsewhere"}})
        );
        assert_eq!(doc.http.routers["app-router"].middlewares, vec!["grpc@file", "custom@file"]);
    }

    #[test]
    fn test_service_reference_suffixes() {
        let mut from_gateway = resource("a", "a.example.com");
        from_gateway.service_id = "a-svc".into();
        let mut from_proxy = resource("b", "b.example.com");
        from_proxy.source_type = "proxy-api".into();
        from_proxy.service_id = "b-svc".into();
        let mut explicit = resource("c", "c.example.com");
        explicit.service_id = "c-svc@docker".into();
        let custom = resource("d", "d.example.com");

        let snapshot = Snapshot {
            resources: vec![from_gateway, from_proxy, explicit, custom],
            service_assignments: vec![ServiceAssignment {
                resource_id: "d".into(),
                service_id: "custom@http".into(),
            }],
            ..Snapshot::default()
        };

        let doc = synthesize(&snapshot, &settings(DataSourceType::ProxyApi));
        assert_eq!(doc.http.routers["a-router"].service, "a-svc@http");
        assert_eq!(doc.http.routers["b-router"].service, "b-svc@docker");
        assert_eq!(doc.http.routers["c-router"].service, "c-svc@docker");
        assert_eq!(doc.http.routers["d-router"].service, "custom@file");

        let doc = synthesize(&snapshot, &settings(DataSourceType::Gateway));
        assert_eq!(doc.http.routers["a-router"].service, "a-svc@http");
        assert_eq!(doc.http.routers["b-router"].service, "b-svc@http");
    }

    #[test]
    fn test_router_fields() {
        let mut app = resource("app", "app.example.com");
        app.entrypoints = " web , websecure ,".into();
        app.tls_domains = " www.example.com, ,".into();
        app.router_priority = 250;
        let doc = synthesize(
            &Snapshot {
                resources: vec![app],
                ..Snapshot::default()
            },
            &settings(DataSourceType::ProxyApi),
        );
        let router = &doc.http.routers["app-router"];
        assert_eq!(router.rule, "Host(`app.example.com`)");
        assert_eq!(router.entry_points, vec!["web", "websecure"]);
        assert_eq!(router.priority, 250);
        assert_eq!(router.tls.cert_resolver, "letsencrypt");
        assert_eq!(router.tls.domains.len(), 1);
        assert_eq!(router.tls.domains[0].sans, vec!["www.example.com"]);

        let mut bare = resource("bare", "bare.example.com");
        bare.entrypoints = "  ".into();
        bare.tls_domains = " , ".into();
        let doc = synthesize(
            &Snapshot {
                resources: vec![bare],
                ..Snapshot::default()
            },
            &settings(DataSourceType::ProxyApi),
        );
        let router = &doc.http.routers["bare-router"];
        assert_eq!(router.entry_points, vec!["websecure"]);
        assert!(router.tls.domains.is_empty());
    }

    #[test]
    fn test_tcp_router() {
        let mut db = resource("db", "db.example.com");
        db.tcp_enabled = true;
        db.tcp_entrypoints = String::new();
        let mut custom = resource("mq", "mq.example.com");
        custom.tcp_enabled = true;
        custom.tcp_sni_rule = "HostSNI(`*`)".into();

        let doc = synthesize(
            &Snapshot {
                resources: vec![db, custom, resource("web", "web.example.com")],
                ..Snapshot::default()
            },
            &settings(DataSourceType::Gateway),
        );

        let router = &doc.tcp.routers["db-tcp-router"];
        assert_eq!(router.rule, "HostSNI(`db.example.com`)");
        assert_eq!(router.entry_points, vec!["tcp"]);
        assert_eq!(router.tls.cert_resolver, "letsencrypt");
        assert_eq!(doc.tcp.routers["mq-tcp-router"].rule, "HostSNI(`*`)");
        assert!(!doc.tcp.routers.contains_key("web-tcp-router"));
        // An HTTP resource with TCP routing enabled keeps its HTTP router.
        assert!(doc.http.routers.contains_key("db-router"));
    }

    #[test]
    fn test_tcp_resource_gets_no_http_router() {
        let mut db = resource("db", "db.example.com");
        db.protocol = RouterProtocol::Tcp;
        db.tcp_enabled = true;
        db.tcp_sni_rule = "HostSNI(`db.example.com`)".into();
        db.service_id = "db@docker".into();

        let doc = synthesize(
            &Snapshot {
                resources: vec![db],
                ..Snapshot::default()
            },
            &settings(DataSourceType::ProxyApi),
        );
        assert!(doc.http.routers.is_empty());
        let router = &doc.tcp.routers["db-tcp-router"];
        assert_eq!(router.rule, "HostSNI(`db.example.com`)");
        assert_eq!(router.service, "db@docker");
    }

    #[test]
    fn test_services_split_by_protocol() {
        let snapshot = Snapshot {
            services: vec![
                service("web@file", "loadBalancer", json!({"servers": [{"url": "http://web:80"}]})),
                service("pg@file", "loadBalancer", json!({"servers": [{"address": "pg:5432"}]})),
                service("dns@file", "loadBalancer", json!({"servers": [{"address": "udp://dns:53"}]})),
                service("split", "weighted", json!({"services": [{"name": "web", "weight": 1}]})),
                service("broken", "loadBalancer", json!({"servers": "nope"})),
                service("odd", "roundRobin", json!({})),
            ],
            ..Snapshot::default()
        };
        let doc = synthesize(&snapshot, &settings(DataSourceType::Gateway));
        assert!(doc.http.services.contains_key("web"));
        assert!(doc.tcp.services.contains_key("pg"));
        assert!(doc.udp.services.contains_key("dns"));
        assert!(doc.http.services.contains_key("split"));
        assert!(!doc.http.services.contains_key("broken"));
        assert!(!doc.http.services.contains_key("odd"));

        let split = serde_json::to_value(&doc.http.services["split"]).unwrap();
        assert_eq!(split["weighted"]["services"][0]["name"], json!("web@file"));
    }

    #[test]
    fn test_invalid_middleware_skipped_and_unreferenced() {
        let snapshot = Snapshot {
            middlewares: vec![
                middleware("good", "compress", json!({})),
                middleware("bad", "rateLimit", json!({"average": "fast"})),
            ],
            resources: vec![resource("app", "app.example.com")],
            middleware_assignments: vec![assign("app", "bad", 10), assign("app", "good", 5)],
            ..Snapshot::default()
        };
        let doc = synthesize(&snapshot, &settings(DataSourceType::ProxyApi));
        assert!(!doc.http.middlewares.contains_key("bad"));
        assert_eq!(doc.http.routers["app-router"].middlewares, vec!["good@file"]);
    }

    #[test]
    fn test_same_input_same_output() {
        let mut app = resource("app", "app.example.com");
        app.custom_headers = json!({"B": "2", "A": "1"}).to_string();
        let snapshot = Snapshot {
            middlewares: vec![middleware("m1", "headers", json!({"customResponseHeaders": {"Server": ""}}))],
            resources: vec![app, resource("other", "other.example.com")],
            middleware_assignments: vec![assign("app", "m1", 1)],
            ..Snapshot::default()
        };
        let first = synthesize(&snapshot, &settings(DataSourceType::Gateway)).to_yaml().unwrap();
        let second = synthesize(&snapshot, &settings(DataSourceType::Gateway)).to_yaml().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Server: ''"));
    }
}
