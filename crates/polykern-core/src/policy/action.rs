//! Actions a policy returns, and how they fold into an exchange.

use bytes::Bytes;

use crate::context::{Headers, RequestData, ResponseData};

/// Outcome of one policy invocation (either phase).
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyAction {
    /// Leave the exchange untouched.
    PassThrough,
    /// Change what goes upstream (request phase) or downstream (response phase).
    Modify(Modifications),
    /// Answer the client directly; nothing further in this phase runs.
    ImmediateResponse(ImmediateResponse),
}

impl PolicyAction {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, PolicyAction::PassThrough)
    }
}

/// Header, body, path, and status changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifications {
    pub set_headers: Headers,
    pub remove_headers: Vec<String>,
    pub body: Option<Bytes>,
    /// Request phase only.
    pub path: Option<String>,
    /// Response phase only.
    pub status_override: Option<u16>,
}

impl Modifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_headers.set(name, value);
        self
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.remove_headers.push(name.to_ascii_lowercase());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status_override = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set_headers.is_empty()
            && self.remove_headers.is_empty()
            && self.body.is_none()
            && self.path.is_none()
            && self.status_override.is_none()
    }

    fn apply_headers(&self, headers: &mut Headers) {
        for name in &self.remove_headers {
            headers.remove(name);
        }
        for (name, value) in self.set_headers.iter() {
            headers.set(name, value);
        }
    }

    /// Apply to the request so later policies observe the change.
    pub fn apply_to_request(&self, req: &mut RequestData) {
        self.apply_headers(&mut req.headers);
        if let Some(body) = &self.body {
            req.body = Some(body.clone());
        }
        if let Some(path) = &self.path {
            req.path = path.clone();
        }
    }

    /// Apply to the response so later policies observe the change.
    pub fn apply_to_response(&self, resp: &mut ResponseData) {
        self.apply_headers(&mut resp.headers);
        if let Some(body) = &self.body {
            resp.body = Some(body.clone());
        }
        if let Some(status) = self.status_override {
            resp.status = status;
        }
    }

    /// Fold a later modification into this one; the later one wins on conflicts.
    pub fn merge(&mut self, later: Modifications) {
        for name in later.remove_headers {
            self.set_headers.remove(&name);
            if !self.remove_headers.contains(&name) {
                self.remove_headers.push(name);
            }
        }
        for (name, value) in later.set_headers.iter() {
            self.remove_headers.retain(|r| r != name);
            self.set_headers.set(name, value);
        }
        if later.body.is_some() {
            self.body = later.body;
        }
        if later.path.is_some() {
            self.path = later.path;
        }
        if later.status_override.is_some() {
            self.status_override = later.status_override;
        }
    }
}

/// Response sent straight back to the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImmediateResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl ImmediateResponse {
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
        self.body = body.into();
        self
    }
}
