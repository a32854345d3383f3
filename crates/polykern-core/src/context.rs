//! Per-exchange state handed to policies.
//!
//! One `ExchangeContext` lives for one request/response cycle. Policies read
//! and write it in chain order; the `metadata` map is how a request-phase
//! policy leaves information for later policies and for the response phase.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use crate::value::ConfigValue;
use crate::RouteKey;

/// Cross-policy, cross-phase scratch space for one exchange.
pub type Metadata = HashMap<String, ConfigValue>;

/// Case-insensitive header map (names are stored lowercased).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: BTreeMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.inner.remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut h = Headers::new();
        for (k, v) in iter {
            h.set(k, v);
        }
        h
    }
}

/// Request half of an exchange as seen by policies.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    /// Present only when the chain asked for the request body.
    pub body: Option<Bytes>,
}

impl RequestData {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Response half of an exchange. Empty (status 0) during the request phase.
#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    pub status: u16,
    pub headers: Headers,
    /// Present only when the chain asked for the response body.
    pub body: Option<Bytes>,
}

impl ResponseData {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Mutable state of one exchange.
#[derive(Debug, Clone, Default)]
pub struct ExchangeContext {
    pub route_key: RouteKey,
    pub request: RequestData,
    pub response: ResponseData,
    pub metadata: Metadata,
}

impl ExchangeContext {
    pub fn new(route_key: impl Into<RouteKey>, request: RequestData) -> Self {
        Self {
            route_key: route_key.into(),
            request,
            response: ResponseData::default(),
            metadata: Metadata::new(),
        }
    }
}
