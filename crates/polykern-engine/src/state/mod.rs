//! Independently versioned state-of-the-world stores.
//!
//! API keys and metadata resources have their own lifecycle, decoupled from
//! the route table. Both stores build the next snapshot off to the side and
//! swap one pointer, so a reader never sees a half-replaced set.

pub mod api_keys;
pub mod metadata;

pub use api_keys::{ApiKey, ApiKeyState, ApiKeyStateResource, ApiKeyStore};
pub use metadata::{MetadataEntry, MetadataResource, MetadataState, MetadataStore};

/// Outcome of one wholesale replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceReport {
    pub accepted: usize,
    pub dropped: usize,
}
