//! The policy capability interface.
//!
//! The engine never knows what a policy does. It only knows which phases it
//! runs in, how much of the body it needs, and the action it returns.

pub mod action;
pub mod mode;

use async_trait::async_trait;

use crate::context::ExchangeContext;
use crate::error::Result;
use crate::value::Params;
use crate::RouteKey;

pub use action::{ImmediateResponse, Modifications, PolicyAction};
pub use mode::{BodyMode, ProcessingMode};

/// Identity a factory receives when instantiating a policy for a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyMetadata {
    pub route_key: RouteKey,
    pub api_name: String,
    pub policy_name: String,
    pub policy_version: String,
}

/// A compiled policy instance. Instances are shared across concurrent
/// exchanges, so per-exchange state belongs in the `ExchangeContext`.
#[async_trait]
pub trait Policy: Send + Sync {
    fn mode(&self) -> ProcessingMode;

    async fn on_request(&self, ctx: &mut ExchangeContext, params: &Params) -> Result<PolicyAction>;

    async fn on_response(
        &self,
        _ctx: &mut ExchangeContext,
        _params: &Params,
    ) -> Result<PolicyAction> {
        Ok(PolicyAction::PassThrough)
    }

    /// Load-time static checks on the parameter bag.
    fn validate(&self, _params: &Params) -> Result<()> {
        Ok(())
    }
}
