//! Request executor: runs a route's chain against one exchange.
//!
//! Two calls per exchange, both driven by the host proxy:
//! - `execute_request` before the upstream call,
//! - `execute_response` after it, correlated by the same id.
//!
//! Request-phase state is parked in the kernel only when the chain has
//! response-phase work. Nothing is stored otherwise.

use std::sync::Arc;
use std::time::Instant;

use polykern_core::error::{PolykernError, Result};
use polykern_core::{
    ExchangeContext, ImmediateResponse, Modifications, PolicyAction, RequestData, ResponseData,
};

use crate::chain::{ChainEntry, PolicyChain};
use crate::config::RouteMissBehavior;
use crate::kernel::Kernel;
use crate::obs::EngineMetrics;

/// Final verdict of one phase, handed back to the proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    PassThrough,
    /// All modifications of the phase folded together, in chain order.
    Modify(Modifications),
    ImmediateResponse(ImmediateResponse),
}

impl PhaseOutcome {
    fn from_modifications(mods: Modifications) -> Self {
        if mods.is_empty() {
            PhaseOutcome::PassThrough
        } else {
            PhaseOutcome::Modify(mods)
        }
    }
}

/// Whether the proxy should buffer bodies for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BodyRequirements {
    pub request_body: bool,
    pub response_body: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Request,
    Response,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Request => "request",
            Phase::Response => "response",
        }
    }
}

#[derive(Clone)]
pub struct RequestExecutor {
    kernel: Arc<Kernel>,
    metrics: Arc<EngineMetrics>,
    on_route_miss: RouteMissBehavior,
}

impl RequestExecutor {
    pub fn new(kernel: Arc<Kernel>, metrics: Arc<EngineMetrics>, on_route_miss: RouteMissBehavior) -> Self {
        Self {
            kernel,
            metrics,
            on_route_miss,
        }
    }

    /// Body buffering the proxy must negotiate for `route_key`; `None` if unrouted.
    pub fn body_requirements(&self, route_key: &str) -> Option<BodyRequirements> {
        self.kernel.chain(route_key).ok().map(|c| BodyRequirements {
            request_body: c.requires_request_body(),
            response_body: c.requires_response_body(),
        })
    }

    pub async fn execute_request(
        &self,
        route_key: &str,
        correlation_id: &str,
        mut request: RequestData,
    ) -> Result<PhaseOutcome> {
        let chain = match self.kernel.chain(route_key) {
            Ok(chain) => chain,
            Err(_) => {
                self.metrics.route_misses.inc(&[]);
                return match self.on_route_miss {
                    RouteMissBehavior::PassThrough => {
                        tracing::debug!(route_key = %route_key, "no chain for route, passing through");
                        Ok(PhaseOutcome::PassThrough)
                    }
                    RouteMissBehavior::Reject => Err(PolykernError::RouteNotFound(route_key.to_string())),
                };
            }
        };

        let started = Instant::now();
        if !chain.requires_request_body() {
            request.body = None;
        }
        let mut ctx = ExchangeContext::new(route_key, request);

        let outcome = self
            .run_phase(Phase::Request, chain.request_policies(), &mut ctx)
            .await;
        self.metrics
            .phase_duration
            .observe(&[("phase", "request")], started.elapsed());

        if chain.has_response_phase() && !matches!(outcome, PhaseOutcome::ImmediateResponse(_)) {
            ctx.request.body = None;
            self.park(correlation_id, ctx, chain);
        }
        Ok(outcome)
    }

    pub async fn execute_response(
        &self,
        correlation_id: &str,
        mut response: ResponseData,
    ) -> Result<PhaseOutcome> {
        let Some(stored) = self.kernel.take_exchange(correlation_id) else {
            tracing::debug!(correlation_id = %correlation_id, "no stored exchange, passing through");
            self.metrics.correlation_misses.inc(&[]);
            return Ok(PhaseOutcome::PassThrough);
        };
        self.metrics
            .exchanges_stored
            .set(&[], self.kernel.exchange_count() as i64);

        let started = Instant::now();
        let chain = stored.chain;
        if !chain.requires_response_body() {
            response.body = None;
        }
        let mut ctx = stored.context;
        ctx.response = response;

        let outcome = self
            .run_phase(Phase::Response, chain.response_policies(), &mut ctx)
            .await;
        self.metrics
            .phase_duration
            .observe(&[("phase", "response")], started.elapsed());
        Ok(outcome)
    }

    /// Drop parked state for an exchange that will never reach its response phase.
    pub fn abandon_exchange(&self, correlation_id: &str) -> bool {
        let removed = self.kernel.remove_exchange(correlation_id);
        if removed {
            self.metrics
                .exchanges_stored
                .set(&[], self.kernel.exchange_count() as i64);
        }
        removed
    }

    fn park(&self, correlation_id: &str, ctx: ExchangeContext, chain: Arc<PolicyChain>) {
        self.kernel.store_exchange(correlation_id, ctx, chain);
        self.metrics
            .exchanges_stored
            .set(&[], self.kernel.exchange_count() as i64);
    }

    async fn run_phase(
        &self,
        phase: Phase,
        entries: &[Arc<ChainEntry>],
        ctx: &mut ExchangeContext,
    ) -> PhaseOutcome {
        let mut merged = Modifications::new();

        for entry in entries {
            if let Some(cond) = &entry.condition {
                if !cond.matches(ctx) {
                    self.count(phase, entry, "skipped");
                    continue;
                }
            }

            let result = match phase {
                Phase::Request => entry.policy.on_request(ctx, &entry.spec.parameters).await,
                Phase::Response => entry.policy.on_response(ctx, &entry.spec.parameters).await,
            };

            match result {
                Ok(PolicyAction::PassThrough) => self.count(phase, entry, "pass"),
                Ok(PolicyAction::Modify(mods)) => {
                    self.count(phase, entry, "modify");
                    match phase {
                        Phase::Request => mods.apply_to_request(&mut ctx.request),
                        Phase::Response => mods.apply_to_response(&mut ctx.response),
                    }
                    merged.merge(mods);
                }
                Ok(PolicyAction::ImmediateResponse(resp)) => {
                    self.count(phase, entry, "immediate_response");
                    tracing::debug!(
                        route_key = %ctx.route_key,
                        policy = %entry.spec.name,
                        status = resp.status,
                        phase = phase.as_str(),
                        "policy short-circuited the phase"
                    );
                    return PhaseOutcome::ImmediateResponse(resp);
                }
                Err(e) => {
                    self.count(phase, entry, "error");
                    tracing::error!(
                        route_key = %ctx.route_key,
                        policy = %entry.spec.name,
                        version = %entry.spec.version,
                        phase = phase.as_str(),
                        error = %e,
                        "policy failed, failing closed"
                    );
                    return PhaseOutcome::ImmediateResponse(
                        ImmediateResponse::new(500)
                            .with_header("content-type", "text/plain")
                            .with_body("policy execution failed"),
                    );
                }
            }
        }

        PhaseOutcome::from_modifications(merged)
    }

    fn count(&self, phase: Phase, entry: &ChainEntry, outcome: &str) {
        self.metrics.policy_executions.inc(&[
            ("phase", phase.as_str()),
            ("policy", entry.spec.name.as_str()),
            ("outcome", outcome),
        ]);
    }
}
