//! Per-type resource handlers.
//!
//! The sync client unwraps envelopes and filters by declared type; a handler
//! receives only resources of its own type, decodes them into its typed
//! state, and replaces that state wholesale.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use polykern_core::error::{PolykernError, Result};
use polykern_core::RouteKey;

use super::protocol::{
    DecodedResource, PolicyChainResource, RouteConfig, API_KEY_STATE_TYPE_URL, METADATA_TYPE_URL,
    POLICY_CHAIN_TYPE_URL,
};
use crate::chain::{ChainBuilder, PolicyChain};
use crate::kernel::Kernel;
use crate::obs::EngineMetrics;
use crate::registry::{InstanceKey, PolicyRegistry};
use crate::state::{ApiKeyStateResource, ApiKeyStore, MetadataResource, MetadataStore};

/// What one push changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandlerOutcome {
    pub accepted: usize,
    pub dropped: usize,
}

pub trait ResourceHandler: Send + Sync {
    fn type_url(&self) -> &'static str;

    /// Apply one complete state-of-the-world push. An `Err` rejects the push
    /// as a whole and leaves the previous state in force.
    fn apply(&self, version_info: &str, resources: Vec<DecodedResource>) -> Result<HandlerOutcome>;
}

// --------------------
// Policy chains
// --------------------

pub struct PolicyChainHandler {
    builder: ChainBuilder,
    kernel: Arc<Kernel>,
    metrics: Arc<EngineMetrics>,
}

impl PolicyChainHandler {
    pub fn new(builder: ChainBuilder, kernel: Arc<Kernel>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            builder,
            kernel,
            metrics,
        }
    }

    fn drop_route(&self, resource_id: &str, route_key: &str, reason: &str, err: &PolykernError) {
        tracing::warn!(
            resource_id = %resource_id,
            route_key = %route_key,
            reason = %reason,
            error = %err,
            "route dropped from push"
        );
        self.metrics.sync_dropped.inc(&[
            ("type", POLICY_CHAIN_TYPE_URL),
            ("reason", reason),
        ]);
    }
}

/// Static checks before anything is instantiated.
fn validate_route(route: &RouteConfig, registry: &PolicyRegistry) -> Result<()> {
    if route.route_key.trim().is_empty() {
        return Err(PolykernError::InvalidConfig("route key is empty".into()));
    }
    for (idx, p) in route.policies.iter().enumerate() {
        if p.name.trim().is_empty() || p.version.trim().is_empty() {
            return Err(PolykernError::InvalidConfig(format!(
                "policy #{idx} is missing name or version"
            )));
        }
        if p.enabled && !registry.contains(&p.name, &p.version) {
            return Err(PolykernError::NotFound(format!(
                "policy {}:{}",
                p.name, p.version
            )));
        }
    }
    Ok(())
}

impl ResourceHandler for PolicyChainHandler {
    fn type_url(&self) -> &'static str {
        POLICY_CHAIN_TYPE_URL
    }

    fn apply(&self, version_info: &str, resources: Vec<DecodedResource>) -> Result<HandlerOutcome> {
        let mut routes: HashMap<RouteKey, PolicyChain> = HashMap::new();
        let mut outcome = HandlerOutcome::default();

        for (idx, res) in resources.into_iter().enumerate() {
            let api: PolicyChainResource = match serde_json::from_value(res.payload) {
                Ok(api) => api,
                Err(e) => {
                    tracing::warn!(resource_index = idx, error = %e, "policy chain resource undecodable, skipped");
                    self.metrics.sync_dropped.inc(&[
                        ("type", POLICY_CHAIN_TYPE_URL),
                        ("reason", "decode"),
                    ]);
                    outcome.dropped += 1;
                    continue;
                }
            };
            let api_name = api.configuration.metadata.api_name.as_str();

            for route in &api.configuration.routes {
                if let Err(e) = validate_route(route, self.builder.registry()) {
                    self.drop_route(&api.id, &route.route_key, "invalid", &e);
                    outcome.dropped += 1;
                    continue;
                }
                match self.builder.build(&route.route_key, api_name, &route.policies) {
                    Ok(chain) => {
                        if routes.insert(route.route_key.clone(), chain).is_some() {
                            tracing::warn!(
                                resource_id = %api.id,
                                route_key = %route.route_key,
                                "duplicate route key in push, last one wins"
                            );
                        } else {
                            outcome.accepted += 1;
                        }
                    }
                    Err(e) => {
                        self.drop_route(&api.id, &route.route_key, "build", &e);
                        outcome.dropped += 1;
                    }
                }
            }
        }

        let live: HashSet<InstanceKey> = routes
            .values()
            .flat_map(|chain| chain.instance_keys().iter().cloned())
            .collect();
        let count = routes.len();
        self.kernel.apply_whole_routes(version_info, routes);
        let pruned = self.builder.registry().prune_instances(&live);
        if pruned > 0 {
            tracing::debug!(pruned, "pruned cached policy instances");
        }

        self.metrics.routes_active.set(&[], count as i64);
        self.metrics.set_synced();
        Ok(outcome)
    }
}

// --------------------
// API keys
// --------------------

pub struct ApiKeyHandler {
    store: Arc<ApiKeyStore>,
}

impl ApiKeyHandler {
    pub fn new(store: Arc<ApiKeyStore>) -> Self {
        Self { store }
    }
}

impl ResourceHandler for ApiKeyHandler {
    fn type_url(&self) -> &'static str {
        API_KEY_STATE_TYPE_URL
    }

    // A key set is one logical state; an undecodable piece would make the
    // replacement incomplete, so the whole push is rejected instead.
    fn apply(&self, _version_info: &str, resources: Vec<DecodedResource>) -> Result<HandlerOutcome> {
        let mut version = 0;
        let mut keys = Vec::new();
        for (idx, res) in resources.into_iter().enumerate() {
            let state: ApiKeyStateResource = serde_json::from_value(res.payload).map_err(|e| {
                PolykernError::Decode(format!("api key resource #{idx}: {e}"))
            })?;
            version = version.max(state.version);
            keys.extend(state.api_keys);
        }

        let report = self.store.replace(version, keys);
        Ok(HandlerOutcome {
            accepted: report.accepted,
            dropped: report.dropped,
        })
    }
}

// --------------------
// Metadata
// --------------------

pub struct MetadataHandler {
    store: Arc<MetadataStore>,
}

impl MetadataHandler {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }
}

impl ResourceHandler for MetadataHandler {
    fn type_url(&self) -> &'static str {
        METADATA_TYPE_URL
    }

    fn apply(&self, _version_info: &str, resources: Vec<DecodedResource>) -> Result<HandlerOutcome> {
        let mut version = 0;
        let mut entries = Vec::new();
        for (idx, res) in resources.into_iter().enumerate() {
            let state: MetadataResource = serde_json::from_value(res.payload).map_err(|e| {
                PolykernError::Decode(format!("metadata resource #{idx}: {e}"))
            })?;
            version = version.max(state.version);
            entries.extend(state.resources);
        }

        let report = self.store.replace(version, entries);
        Ok(HandlerOutcome {
            accepted: report.accepted,
            dropped: report.dropped,
        })
    }
}
