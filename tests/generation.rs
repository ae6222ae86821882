//! End-to-end generation from a populated store.

use std::collections::BTreeMap;
use std::fs;

use routeforge::datasource::DataSourceType;
use routeforge::generator::{ConfigGenerator, GeneratorOptions, PublishOutcome};
use routeforge::store::{NewMiddleware, NewService, ResourceSighting, RoutingSettings, ServiceType, Store};
use serde_json::json;

mod common;

async fn populated_store() -> Store {
    let store = common::store().await;

    for (id, kind, config) in [
        ("security-headers", "headers", json!({"customResponseHeaders": {"Server": "", "X-Powered-By": ""}, "stsSeconds": "31536000", "frameDeny": "true"})),
        ("limit", "rateLimit", json!({"average": "100", "burst": "50"})),
        ("strip-api", "stripPrefix", json!({"prefixes": ["/api"]})),
    ] {
        store
            .insert_middleware(&NewMiddleware {
                id: id.into(),
                name: id.into(),
                kind: kind.into(),
                config,
            })
            .await
            .unwrap();
    }

    for (id, config) in [
        ("app-backend@file", json!({"servers": [{"url": "http://app:8080"}]})),
        ("postgres@file", json!({"servers": [{"address": "10.0.0.5:5432"}]})),
    ] {
        store
            .insert_service(&NewService {
                id: id.into(),
                name: id.into(),
                kind: ServiceType::LoadBalancer,
                config,
                source_type: "proxy-api".into(),
            })
            .await
            .unwrap();
    }

    store
        .upsert_discovered_resource(&ResourceSighting::http("app", "app.example.com", "app", "proxy-api"))
        .await
        .unwrap();
    store
        .upsert_discovered_resource(&ResourceSighting::http("db", "db.example.com", "db", "proxy-api"))
        .await
        .unwrap();

    let mut headers = BTreeMap::new();
    headers.insert("X-Env".to_string(), "prod".to_string());
    store
        .update_routing(
            "app",
            &RoutingSettings {
                tls_domains: "www.example.com".into(),
                custom_headers: headers,
                ..RoutingSettings::default()
            },
        )
        .await
        .unwrap();
    store.assign_middleware("app", "limit", 10).await.unwrap();
    store.assign_middleware("app", "security-headers", 50).await.unwrap();
    store.assign_middleware("app", "strip-api", 30).await.unwrap();
    store.assign_service("app", "app-backend@file").await.unwrap();

    store
        .update_routing(
            "db",
            &RoutingSettings {
                tcp_enabled: true,
                ..RoutingSettings::default()
            },
        )
        .await
        .unwrap();
    store.assign_service("db", "postgres@file").await.unwrap();

    store
}

fn generator(store: &Store, dir: &std::path::Path, kind: DataSourceType) -> ConfigGenerator {
    let datasources = common::datasources(dir, kind, "http://127.0.0.1:9");
    ConfigGenerator::new(
        store.clone(),
        datasources,
        GeneratorOptions {
            output_path: dir.join("conf").join("dynamic.yml"),
            cert_resolver: "letsencrypt".into(),
            gateway_auth_middleware: "badger@http".into(),
        },
    )
}

#[tokio::test]
async fn test_second_generation_does_not_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store().await;
    let path = dir.path().join("conf").join("dynamic.yml");

    let mut generator = generator(&store, dir.path(), DataSourceType::ProxyApi);
    assert_eq!(generator.generate().await.unwrap(), PublishOutcome::Written);
    let first = fs::read_to_string(&path).unwrap();
    let modified = fs::metadata(&path).unwrap().modified().unwrap();

    assert_eq!(generator.generate().await.unwrap(), PublishOutcome::Unchanged);
    assert_eq!(fs::read_to_string(&path).unwrap(), first);
    assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);

    // A fresh generator picks up the published file and also skips.
    let mut restarted = generator_for_existing(&store, dir.path());
    assert_eq!(restarted.generate().await.unwrap(), PublishOutcome::Unchanged);

    // A store change produces a new document.
    store.remove_middleware("app", "strip-api").await.unwrap();
    assert_eq!(generator.generate().await.unwrap(), PublishOutcome::Written);
    assert_ne!(fs::read_to_string(&path).unwrap(), first);
}

fn generator_for_existing(store: &Store, dir: &std::path::Path) -> ConfigGenerator {
    let datasources = routeforge::DataSourceManager::load(dir.join("datasources.json")).unwrap();
    ConfigGenerator::new(
        store.clone(),
        std::sync::Arc::new(datasources),
        GeneratorOptions {
            output_path: dir.join("conf").join("dynamic.yml"),
            cert_resolver: "letsencrypt".into(),
            gateway_auth_middleware: "badger@http".into(),
        },
    )
}

#[tokio::test]
async fn test_published_document_shape() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store().await;
    let mut generator = generator(&store, dir.path(), DataSourceType::Gateway);
    generator.generate().await.unwrap();

    let yaml = fs::read_to_string(dir.path().join("conf").join("dynamic.yml")).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

    let router = &doc["http"]["routers"]["app-router"];
    assert_eq!(router["rule"].as_str(), Some("Host(`app.example.com`)"));
    assert_eq!(router["service"].as_str(), Some("app-backend@file"));
    assert_eq!(router["priority"].as_i64(), Some(100));
    let chain: Vec<&str> = router["middlewares"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    assert_eq!(
        chain,
        vec![
            "app-customheaders@file",
            "security-headers@file",
            "strip-api@file",
            "limit@file",
            "badger@http",
        ]
    );
    assert_eq!(router["tls"]["certResolver"].as_str(), Some("letsencrypt"));
    assert_eq!(router["tls"]["domains"][0]["main"].as_str(), Some("app.example.com"));
    assert_eq!(router["tls"]["domains"][0]["sans"][0].as_str(), Some("www.example.com"));

    // Exact value types.
    let headers = &doc["http"]["middlewares"]["security-headers"]["headers"];
    assert_eq!(headers["customResponseHeaders"]["Server"].as_str(), Some(""));
    assert_eq!(headers["stsSeconds"].as_i64(), Some(31536000));
    assert_eq!(headers["frameDeny"].as_bool(), Some(true));
    assert_eq!(doc["http"]["middlewares"]["limit"]["rateLimit"]["average"].as_i64(), Some(100));
    assert_eq!(
        doc["http"]["middlewares"]["app-customheaders"]["headers"]["customRequestHeaders"]["X-Env"].as_str(),
        Some("prod")
    );

    // Suffixes are stripped from emitted keys; services split by protocol.
    assert!(doc["http"]["services"]["app-backend"].is_mapping());
    assert!(doc["tcp"]["services"]["postgres"].is_mapping());
    assert!(doc["udp"]["services"].is_mapping());

    let tcp = &doc["tcp"]["routers"]["db-tcp-router"];
    assert_eq!(tcp["rule"].as_str(), Some("HostSNI(`db.example.com`)"));
    assert_eq!(tcp["service"].as_str(), Some("postgres@file"));
    assert_eq!(tcp["entryPoints"][0].as_str(), Some("tcp"));
    assert_eq!(tcp["tls"]["certResolver"].as_str(), Some("letsencrypt"));
    assert!(tcp["middlewares"].is_null());
}

#[tokio::test]
async fn test_disabled_resources_are_not_routed() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store().await;
    store
        .disable_resources_except(&["app".to_string()].into_iter().collect())
        .await
        .unwrap();

    let generator = generator(&store, dir.path(), DataSourceType::ProxyApi);
    let doc = generator.render().await.unwrap();
    assert!(doc.http.routers.contains_key("app-router"));
    assert!(!doc.http.routers.contains_key("db-router"));
    assert!(doc.tcp.routers.is_empty());
    // Services stay declared.
    assert!(doc.tcp.services.contains_key("postgres"));
}

#[tokio::test]
async fn test_active_source_switch_from_another_process() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store().await;
    let generator = generator(&store, dir.path(), DataSourceType::ProxyApi);

    let doc = generator.render().await.unwrap();
    assert!(!doc.http.routers["app-router"].middlewares.contains(&"badger@http".to_string()));

    // Same file, separate manager, as the ctl binary does it.
    let ctl = routeforge::DataSourceManager::load(dir.path().join("datasources.json")).unwrap();
    ctl.update(
        "gw",
        routeforge::datasource::DataSourceConfig::new(DataSourceType::Gateway, "http://127.0.0.1:9"),
    )
    .await
    .unwrap();
    ctl.set_active("gw").await.unwrap();

    let doc = generator.render().await.unwrap();
    assert_eq!(
        doc.http.routers["app-router"].middlewares.last().map(String::as_str),
        Some("badger@http")
    );
}
