//! Canonical fetch output and error types.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::store::{RouterProtocol, ServiceType};

/// A routable host as reported upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredResource {
    /// Router name without provider suffix.
    pub id: String,
    pub host: String,
    /// Service reference exactly as the upstream router names it.
    pub service_id: String,
    /// Router table the resource was reported in.
    pub protocol: RouterProtocol,
    /// Matcher rule as reported.
    pub rule: String,
}

/// A backend definition as reported upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredService {
    /// Upstream name, possibly decorated with a provider suffix.
    pub id: String,
    pub name: Option<String>,
    pub kind: ServiceType,
    /// Body of the `kind` sub-object.
    pub config: Value,
}

pub type ResourceSet = Vec<DiscoveredResource>;
pub type ServiceSet = Vec<DiscoveredService>;

/// Errors that abort a fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request could not be sent or the body could not be read.
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Body was not the expected JSON.
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured URL and every fallback failed.
    #[error("all upstream URLs failed ({}), last error: {last}", .tried.join(", "))]
    AllUrlsFailed { tried: Vec<String>, last: String },

    /// The whole fetch exceeded its deadline.
    #[error("fetch timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Transport failures worth retrying against another base URL.
    pub fn is_transport(&self) -> bool {
        match self {
            FetchError::Http { source, .. } => {
                source.is_connect() || source.is_timeout() || source.is_request()
            }
            _ => false,
        }
    }
}
