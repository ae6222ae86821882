//! Identifier handling shared by the watchers and the generator.
//!
//! # Data Flow
//! ```text
//! upstream id ("api-service@docker", "api-service@http@http")
//!     → suffix.rs normalize()      → "api-service"         (lookup key)
//!     → suffix.rs with_suffix()    → "api-service@file"    (stored / referenced id)
//!     → display_name()             → "Api Service"         (default row name)
//! ```
//!
//! # Design Decisions
//! - Every derived identifier is computed from a stable base id, never from a
//!   previously derived one, so suffixes cannot cascade across ticks
//! - Adding a suffix to an id that already carries one is a no-op

pub mod suffix;

pub use suffix::{has_suffix, normalize, strip_suffix, with_suffix, ProviderSuffix};

/// Human readable name for an id that arrived without one.
///
/// Strips the provider suffix, turns `-`, `_` and `.` into spaces and
/// title-cases each word.
pub fn display_name(id: &str) -> String {
    strip_suffix(id)
        .split(|c: char| c == '-' || c == '_' || c == '.')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
