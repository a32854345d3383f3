//! Body-access modes a policy declares per phase.

use serde::{Deserialize, Serialize};

/// How much of an HTTP message a policy needs to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BodyMode {
    #[default]
    Skip,
    HeadersOnly,
    BufferFullBody,
    StreamIncrementally,
}

impl BodyMode {
    /// Whether this mode makes the proxy deliver body bytes.
    pub fn needs_body(self) -> bool {
        matches!(self, BodyMode::BufferFullBody | BodyMode::StreamIncrementally)
    }
}

/// Per-phase access a policy instance declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingMode {
    pub request_header: BodyMode,
    pub request_body: BodyMode,
    pub response_header: BodyMode,
    pub response_body: BodyMode,
}

impl ProcessingMode {
    /// Headers-only access on the request side, nothing on the response side.
    pub fn request_headers() -> Self {
        Self {
            request_header: BodyMode::HeadersOnly,
            ..Self::default()
        }
    }

    /// Headers-only access on the response side, nothing on the request side.
    pub fn response_headers() -> Self {
        Self {
            response_header: BodyMode::HeadersOnly,
            ..Self::default()
        }
    }

    pub fn with_request_body(mut self, mode: BodyMode) -> Self {
        self.request_body = mode;
        self
    }

    pub fn with_response_body(mut self, mode: BodyMode) -> Self {
        self.response_body = mode;
        self
    }
}
