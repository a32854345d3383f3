//! Policy registry: `(name, version)` → definition + factory.
//!
//! One registry belongs to one engine instance. It also owns the instance
//! cache, so repeated state-of-the-world pushes reuse already-constructed
//! policies instead of re-running factories for unchanged routes.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use polykern_core::error::{PolykernError, Result};
use polykern_core::value::{fingerprint, Params};
use polykern_core::{Policy, PolicyMetadata, RouteKey};

/// Static capabilities of a policy type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDefinition {
    pub name: String,
    pub version: String,
    pub supports_request_phase: bool,
    pub supports_response_phase: bool,
    pub requires_request_body: bool,
    pub requires_response_body: bool,
}

impl PolicyDefinition {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            supports_request_phase: false,
            supports_response_phase: false,
            requires_request_body: false,
            requires_response_body: false,
        }
    }

    pub fn request_phase(mut self) -> Self {
        self.supports_request_phase = true;
        self
    }

    pub fn response_phase(mut self) -> Self {
        self.supports_response_phase = true;
        self
    }

    pub fn request_body(mut self) -> Self {
        self.requires_request_body = true;
        self
    }

    pub fn response_body(mut self) -> Self {
        self.requires_response_body = true;
        self
    }
}

/// Builds policy instances for one policy type.
pub trait PolicyFactory: Send + Sync {
    fn create(&self, meta: &PolicyMetadata, params: &Params) -> Result<Arc<dyn Policy>>;
}

impl<F> PolicyFactory for F
where
    F: Fn(&PolicyMetadata, &Params) -> Result<Arc<dyn Policy>> + Send + Sync,
{
    fn create(&self, meta: &PolicyMetadata, params: &Params) -> Result<Arc<dyn Policy>> {
        self(meta, params)
    }
}

/// Pins a closure to the factory signature so its argument lifetimes infer.
pub fn factory_fn<F>(f: F) -> F
where
    F: Fn(&PolicyMetadata, &Params) -> Result<Arc<dyn Policy>> + Send + Sync,
{
    f
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PolicyId {
    name: String,
    version: String,
}

impl PolicyId {
    fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }
}

/// Identity of one cached policy instance.
///
/// Everything the factory sees takes part in the key, so a route moving to
/// another API or changing parameters gets a fresh instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    id: PolicyId,
    route_key: RouteKey,
    api_name: String,
    params: String,
}

impl InstanceKey {
    pub fn new(name: &str, version: &str, meta: &PolicyMetadata, params: &Params) -> Self {
        Self {
            id: PolicyId::new(name, version),
            route_key: meta.route_key.clone(),
            api_name: meta.api_name.clone(),
            params: fingerprint(params),
        }
    }

    pub fn route_key(&self) -> &str {
        &self.route_key
    }
}

struct Registered {
    definition: Arc<PolicyDefinition>,
    factory: Arc<dyn PolicyFactory>,
}

#[derive(Default)]
pub struct PolicyRegistry {
    entries: DashMap<PolicyId, Registered>,
    instances: DashMap<InstanceKey, Arc<dyn Policy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            instances: DashMap::new(),
        }
    }

    pub fn register(
        &self,
        definition: PolicyDefinition,
        factory: impl PolicyFactory + 'static,
    ) -> Result<()> {
        let id = PolicyId::new(&definition.name, &definition.version);
        match self.entries.entry(id) {
            Entry::Occupied(e) => Err(PolykernError::AlreadyExists(format!(
                "policy {}:{}",
                e.key().name,
                e.key().version
            ))),
            Entry::Vacant(v) => {
                tracing::debug!(
                    policy = %definition.name,
                    version = %definition.version,
                    "policy registered"
                );
                v.insert(Registered {
                    definition: Arc::new(definition),
                    factory: Arc::new(factory),
                });
                Ok(())
            }
        }
    }

    pub fn definition(&self, name: &str, version: &str) -> Result<Arc<PolicyDefinition>> {
        self.entries
            .get(&PolicyId::new(name, version))
            .map(|r| Arc::clone(&r.value().definition))
            .ok_or_else(|| PolykernError::NotFound(format!("policy {name}:{version}")))
    }

    pub fn factory(&self, name: &str, version: &str) -> Result<Arc<dyn PolicyFactory>> {
        self.entries
            .get(&PolicyId::new(name, version))
            .map(|r| Arc::clone(&r.value().factory))
            .ok_or_else(|| PolykernError::NotFound(format!("policy {name}:{version}")))
    }

    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.entries.contains_key(&PolicyId::new(name, version))
    }

    /// Registered `(name, version)` pairs.
    pub fn registered(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|e| (e.key().name.clone(), e.key().version.clone()))
            .collect()
    }

    /// Construct (or reuse) an instance for `meta.route_key`.
    ///
    /// Runs the factory, then the instance's own `validate`. Either rejection
    /// surfaces as `InvalidParams`.
    pub fn create_instance(
        &self,
        name: &str,
        version: &str,
        meta: &PolicyMetadata,
        params: &Params,
    ) -> Result<Arc<dyn Policy>> {
        let key = InstanceKey::new(name, version, meta, params);
        if let Some(cached) = self.instances.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }

        let factory = self.factory(name, version)?;
        let policy = factory.create(meta, params).map_err(|e| {
            PolykernError::InvalidParams(format!("{name}:{version} factory rejected params: {e}"))
        })?;
        policy.validate(params).map_err(|e| {
            PolykernError::InvalidParams(format!("{name}:{version} validation failed: {e}"))
        })?;

        self.instances.insert(key, Arc::clone(&policy));
        Ok(policy)
    }

    /// Keep only the instances in `live`; returns how many were dropped.
    ///
    /// `live` is the set of keys the installed route table actually uses, so
    /// instances for removed routes and for superseded parameters both go.
    pub fn prune_instances(&self, live: &HashSet<InstanceKey>) -> usize {
        let before = self.instances.len();
        self.instances.retain(|k, _| live.contains(k));
        before.saturating_sub(self.instances.len())
    }

    pub fn cached_instances(&self) -> usize {
        self.instances.len()
    }
}
