//! polykern core: policy-facing primitives shared by the engine and by policy crates.
//!
//! This crate defines the contract a policy implementation compiles against:
//! the parameter bag, the exchange context, body modes, actions, and the
//! `Policy` trait itself. It carries no runtime or transport dependencies so
//! policy authors can depend on it without pulling in the engine.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible paths
//! surface as `PolykernError`/`Result` so malformed control-plane input never
//! brings the host proxy down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod context;
pub mod error;
pub mod policy;
pub mod value;

/// Shared result type.
pub use error::{ErrorCode, PolykernError, Result};

pub use context::{ExchangeContext, Headers, Metadata, RequestData, ResponseData};
pub use policy::{
    BodyMode, ImmediateResponse, Modifications, Policy, PolicyAction, PolicyMetadata,
    ProcessingMode,
};
pub use value::{ConfigValue, Params};

/// Opaque identifier of one route binding.
pub type RouteKey = String;
