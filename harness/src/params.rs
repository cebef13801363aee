//! Untyped benchmark parameters
//!
//! Requests carry free-form parameter maps (from JSON, TOML or the command
//! line). Operation strategies never read them directly; each one resolves
//! a typed config from the map, see [`crate::operations::config`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameter map keyed by the recognised option names
pub type ParamMap = HashMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    List(Vec<ParamValue>),
    Map(HashMap<String, ParamValue>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Non-negative integer, used for counts and sizes.
    pub fn as_usize(&self) -> Option<usize> {
        self.as_integer().and_then(|i| usize::try_from(i).ok())
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// A native timestamp, or a string holding an RFC3339 timestamp.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ParamValue::Timestamp(ts) => Some(*ts),
            ParamValue::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// A list made only of strings.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            ParamValue::List(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// Parse a command-line value: bool, then integer, then float, then text.
    pub fn parse_cli(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return ParamValue::Boolean(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return ParamValue::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return ParamValue::Float(f);
        }
        ParamValue::String(raw.to_string())
    }

    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ParamValue::Boolean(b)),
            Value::Number(n) => n
                .as_i64()
                .map(ParamValue::Integer)
                .or_else(|| n.as_f64().map(ParamValue::Float)),
            Value::String(s) => Some(ParamValue::String(s)),
            Value::Array(items) => Some(ParamValue::List(
                items.into_iter().filter_map(Self::from_json).collect(),
            )),
            Value::Object(obj) => Some(ParamValue::Map(
                obj.into_iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k, v)))
                    .collect(),
            )),
        }
    }

    pub fn from_toml_value(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ParamValue::String(s),
            toml::Value::Integer(i) => ParamValue::Integer(i),
            toml::Value::Float(f) => ParamValue::Float(f),
            toml::Value::Boolean(b) => ParamValue::Boolean(b),
            toml::Value::Array(arr) => {
                ParamValue::List(arr.into_iter().map(Self::from_toml_value).collect())
            }
            toml::Value::Table(table) => ParamValue::Map(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_toml_value(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => {
                let text = dt.to_string();
                match DateTime::parse_from_rfc3339(&text) {
                    Ok(ts) => ParamValue::Timestamp(ts.with_timezone(&Utc)),
                    Err(_) => ParamValue::String(text),
                }
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            ParamValue::Boolean(b) => Value::Bool(*b),
            ParamValue::Integer(i) => Value::from(*i),
            ParamValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ParamValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            ParamValue::Map(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Boolean(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::Timestamp(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::List(value.into_iter().map(ParamValue::String).collect())
    }
}

/// Build a [`ParamMap`] from `key => value` pairs.
#[macro_export]
macro_rules! params {
    () => { $crate::params::ParamMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::params::ParamMap::new();
        $( map.insert($key.to_string(), $crate::params::ParamValue::from($value)); )+
        map
    }};
}

/// Render a parameter map as a JSON object, e.g. for run metadata.
pub fn to_json_object(params: &ParamMap) -> serde_json::Map<String, serde_json::Value> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}
