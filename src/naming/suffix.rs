//! Provider suffixes (`@file`, `@docker`, `@http`).

use std::fmt;

/// Configuration source that declared an object, as the proxy encodes it
/// after the `@` of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderSuffix {
    /// Objects this crate publishes in its own declarative document.
    File,
    /// Objects discovered from container labels.
    Docker,
    /// Objects served by an HTTP provider (the gateway).
    Http,
}

impl ProviderSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderSuffix::File => "@file",
            ProviderSuffix::Docker => "@docker",
            ProviderSuffix::Http => "@http",
        }
    }
}

impl fmt::Display for ProviderSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True if the id already names a provider.
pub fn has_suffix(id: &str) -> bool {
    id.contains('@')
}

/// The part of an id before its first `@`.
pub fn strip_suffix(id: &str) -> &str {
    match id.find('@') {
        Some(idx) => &id[..idx],
        None => id,
    }
}

/// Lookup key for an upstream identifier.
///
/// Drops every provider segment, so `svc@http`, `svc@http@http` and
/// `svc@file@docker` all collapse to `svc`. Surrounding whitespace is trimmed.
pub fn normalize(id: &str) -> String {
    strip_suffix(id.trim()).trim().to_string()
}

/// Attach `suffix` unless the id already carries a provider.
pub fn with_suffix(id: &str, suffix: ProviderSuffix) -> String {
    if has_suffix(id) {
        id.to_string()
    } else {
        format!("{}{}", id, suffix)
    }
}
