//! Parameter bag for policies.
//!
//! Policy parameters arrive from the control plane as arbitrary JSON. The
//! engine keeps them as a tagged union and hands them to each policy's own
//! parser, so per-policy schemas stay late-bound while the engine core stays
//! typed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PolykernError, Result};

/// Opaque, per-policy parameters. `BTreeMap` keeps iteration (and the
/// canonical fingerprint) deterministic.
pub type Params = BTreeMap<String, ConfigValue>;

/// A dynamically typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Render scalars the way they would appear in a header or a condition literal.
    pub fn to_display_string(&self) -> Option<String> {
        match self {
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::Bool(b) => Some(b.to_string()),
            ConfigValue::Int(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => ConfigValue::Null,
            serde_json::Value::Bool(b) => ConfigValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Int(i),
                None => ConfigValue::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => ConfigValue::String(s),
            serde_json::Value::Array(a) => {
                ConfigValue::List(a.into_iter().map(ConfigValue::from).collect())
            }
            serde_json::Value::Object(o) => {
                ConfigValue::Map(o.into_iter().map(|(k, v)| (k, ConfigValue::from(v))).collect())
            }
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

/// Typed lookups over a parameter bag, for use inside policy parsers.
pub trait ParamsExt {
    fn get_str(&self, key: &str) -> Option<&str>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn get_i64(&self, key: &str) -> Option<i64>;
    fn get_list(&self, key: &str) -> Option<&[ConfigValue]>;
    fn get_map(&self, key: &str) -> Option<&BTreeMap<String, ConfigValue>>;

    /// Like `get_str`, but a missing or non-string value is an `InvalidParams` error.
    fn require_str(&self, key: &str) -> Result<&str>;
}

impl ParamsExt for Params {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_str)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ConfigValue::as_bool)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ConfigValue::as_i64)
    }

    fn get_list(&self, key: &str) -> Option<&[ConfigValue]> {
        self.get(key).and_then(ConfigValue::as_list)
    }

    fn get_map(&self, key: &str) -> Option<&BTreeMap<String, ConfigValue>> {
        self.get(key).and_then(ConfigValue::as_map)
    }

    fn require_str(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(ConfigValue::String(s)) => Ok(s),
            Some(_) => Err(PolykernError::InvalidParams(format!(
                "parameter {key} must be a string"
            ))),
            None => Err(PolykernError::InvalidParams(format!(
                "missing required parameter: {key}"
            ))),
        }
    }
}

/// Canonical string form of a parameter bag (sorted keys), used as a cache key.
pub fn fingerprint(params: &Params) -> String {
    serde_json::to_string(params).unwrap_or_default()
}
