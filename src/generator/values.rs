//! Lenient field decoders for stored config documents.
//!
//! Documents are edited by hand and by upstream imports, so numbers arrive
//! as strings and booleans as `"true"`. Each decoder accepts the loose form
//! and yields the strict type, which is what gets serialized.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A value that is either a number or text, e.g. durations (`10`, `"10s"`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

fn integer<E: serde::de::Error>(value: Value, field: &str) -> Result<i64, E> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| E::custom(format!("{} is not an integer: {}", field, n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| E::custom(format!("{} is not an integer: '{}'", field, s))),
        other => Err(E::custom(format!("{} is not an integer: {}", field, other))),
    }
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => integer(value, "field").map(Some),
    }
}

pub fn opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            "" => Ok(None),
            _ => Err(D::Error::custom(format!("not a boolean: '{}'", s))),
        },
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(D::Error::custom(format!("not a boolean: {}", n))),
        },
        Some(other) => Err(D::Error::custom(format!("not a boolean: {}", other))),
    }
}

/// Strings stay exactly as given, including empty ones.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(text))
}

/// Required string; scalars are converted, `null` becomes empty.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(text)
        .unwrap_or_default())
}

/// A list of strings. A bare string is split on commas.
pub fn opt_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items.into_iter().filter_map(text).collect())),
        Some(Value::String(s)) => Ok(Some(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Some(other) => Err(D::Error::custom(format!("not a list: {}", other))),
    }
}

/// Header-style map. `null` values become empty strings, which are kept.
pub fn opt_string_map<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(
            map.into_iter()
                .map(|(key, value)| (key, text(value).unwrap_or_default()))
                .collect(),
        )),
        Some(other) => Err(D::Error::custom(format!("not a map: {}", other))),
    }
}

pub fn opt_scalar<'de, D>(deserializer: D) -> Result<Option<Scalar>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(Some(Scalar::Int(i))),
            None => n
                .as_f64()
                .map(|f| Some(Scalar::Float(f)))
                .ok_or_else(|| D::Error::custom(format!("unsupported number: {}", n))),
        },
        Some(Value::String(s)) => Ok(Some(match s.trim().parse::<i64>() {
            Ok(i) => Scalar::Int(i),
            Err(_) => Scalar::Text(s),
        })),
        Some(other) => Err(D::Error::custom(format!("not a number or text: {}", other))),
    }
}
