//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use routeforge::datasource::{DataSourceConfig, DataSourceFile, DataSourceManager, DataSourceType};
use routeforge::fetcher::FetcherFactory;
use routeforge::store::Store;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

type Routes = Arc<Mutex<HashMap<String, (u16, String)>>>;

/// Mock upstream serving canned JSON by request path.
///
/// Unknown paths answer 404. Responses can be swapped between ticks.
pub struct MockUpstream {
    addr: SocketAddr,
    routes: Routes,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let hits = Arc::new(Mutex::new(HashMap::new()));

        let served_routes = routes.clone();
        let served_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = served_routes.clone();
                let hits = served_hits.clone();
                tokio::spawn(async move {
                    let path = read_request_path(&mut socket).await.unwrap_or_default();
                    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                    let (status, body) = routes
                        .lock()
                        .unwrap()
                        .get(&path)
                        .cloned()
                        .unwrap_or((404, "{}".to_string()));
                    let status_text = match status {
                        200 => "200 OK",
                        401 => "401 Unauthorized",
                        404 => "404 Not Found",
                        500 => "500 Internal Server Error",
                        502 => "502 Bad Gateway",
                        503 => "503 Service Unavailable",
                        _ => "200 OK",
                    };

                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status_text,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                });
            }
        });

        Self { addr, routes, hits }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

async fn read_request_path(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    let target = head.lines().next()?.split_whitespace().nth(1)?;
    Some(target.split('?').next().unwrap_or(target).to_string())
}

/// Distinct base URLs on which nothing is listening.
pub async fn closed_urls(count: usize) -> Vec<String> {
    let mut listeners = Vec::with_capacity(count);
    for _ in 0..count {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    listeners
        .iter()
        .map(|listener| format!("http://{}", listener.local_addr().unwrap()))
        .collect()
}

/// Data-source file with a single active source, loaded into a manager.
pub fn datasources(dir: &Path, kind: DataSourceType, url: &str) -> Arc<DataSourceManager> {
    let path = dir.join("datasources.json");
    let mut file = DataSourceFile::default();
    file.data_sources
        .insert("test".to_string(), DataSourceConfig::new(kind, url));
    file.active_data_source = "test".to_string();
    std::fs::write(&path, serde_json::to_string_pretty(&file).unwrap()).unwrap();
    Arc::new(DataSourceManager::load(&path).unwrap())
}

/// Fetchers with short timeouts and the given fallback bases.
pub fn fetchers(fallbacks: Vec<String>) -> FetcherFactory {
    FetcherFactory::new(Duration::from_secs(2))
        .unwrap()
        .with_fallback_urls(fallbacks)
}

pub async fn store() -> Store {
    Store::in_memory().await.unwrap()
}
