//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals and timeouts > 0)
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::Settings;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.database.url.trim().is_empty() {
        errors.push(ValidationError::new("database.url", "must not be empty"));
    }
    if settings.database.max_connections == 0 {
        errors.push(ValidationError::new("database.max_connections", "must be at least 1"));
    }
    if settings.datasources.file.as_os_str().is_empty() {
        errors.push(ValidationError::new("datasources.file", "must not be empty"));
    }

    let generator = &settings.generator;
    if generator.output_path.as_os_str().is_empty() {
        errors.push(ValidationError::new("generator.output_path", "must not be empty"));
    }
    if generator.interval_secs == 0 {
        errors.push(ValidationError::new("generator.interval_secs", "must be greater than 0"));
    }
    if generator.cert_resolver.trim().is_empty() {
        errors.push(ValidationError::new("generator.cert_resolver", "must not be empty"));
    }

    let watchers = &settings.watchers;
    for (field, value) in [
        ("watchers.resource_interval_secs", watchers.resource_interval_secs),
        ("watchers.service_interval_secs", watchers.service_interval_secs),
        ("watchers.fetch_timeout_secs", watchers.fetch_timeout_secs),
        ("watchers.request_timeout_secs", watchers.request_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }
    for url in &watchers.fallback_urls {
        if url::Url::parse(url).is_err() {
            errors.push(ValidationError::new(
                "watchers.fallback_urls",
                format!("'{}' is not a valid URL", url),
            ));
        }
    }

    if settings.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.address",
            format!("'{}' is not a socket address", settings.metrics.address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
