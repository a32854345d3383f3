use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use polykern_core::error::{PolykernError, Result};
use polykern_core::{Params, Policy, PolicyMetadata, ProcessingMode, RouteKey};

use super::condition::Condition;
use crate::registry::{InstanceKey, PolicyRegistry};

/// Declarative reference to one policy in a route's chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    pub name: String,
    pub version: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub execution_condition: Option<String>,
    #[serde(default)]
    pub parameters: Params,
}

fn default_enabled() -> bool {
    true
}

impl PolicySpec {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            enabled: true,
            execution_condition: None,
            parameters: Params::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<polykern_core::ConfigValue>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_condition(mut self, cond: impl Into<String>) -> Self {
        self.execution_condition = Some(cond.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// One resolved chain member.
pub struct ChainEntry {
    pub spec: PolicySpec,
    pub policy: Arc<dyn Policy>,
    pub condition: Option<Condition>,
    pub mode: ProcessingMode,
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("policy", &format_args!("{}:{}", self.spec.name, self.spec.version))
            .field("condition", &self.condition.as_ref().map(Condition::as_str))
            .field("mode", &self.mode)
            .finish()
    }
}

/// Compiled, immutable policy chain for one route.
#[derive(Debug)]
pub struct PolicyChain {
    route_key: RouteKey,
    api_name: String,
    request: Vec<Arc<ChainEntry>>,
    response: Vec<Arc<ChainEntry>>,
    instances: Vec<InstanceKey>,
    requires_request_body: bool,
    requires_response_body: bool,
}

impl PolicyChain {
    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn request_policies(&self) -> &[Arc<ChainEntry>] {
        &self.request
    }

    pub fn response_policies(&self) -> &[Arc<ChainEntry>] {
        &self.response
    }

    /// Cache keys of every policy instance this chain holds.
    pub fn instance_keys(&self) -> &[InstanceKey] {
        &self.instances
    }

    pub fn requires_request_body(&self) -> bool {
        self.requires_request_body
    }

    pub fn requires_response_body(&self) -> bool {
        self.requires_response_body
    }

    pub fn has_response_phase(&self) -> bool {
        !self.response.is_empty()
    }
}

/// Compiles declarative policy lists into `PolicyChain`s.
#[derive(Clone)]
pub struct ChainBuilder {
    registry: Arc<PolicyRegistry>,
}

impl ChainBuilder {
    pub fn new(registry: Arc<PolicyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Fails on the first policy that cannot be resolved or instantiated.
    pub fn build(&self, route_key: &str, api_name: &str, specs: &[PolicySpec]) -> Result<PolicyChain> {
        let mut request = Vec::new();
        let mut response = Vec::new();
        let mut instances = Vec::new();
        let mut requires_request_body = false;
        let mut requires_response_body = false;

        for spec in specs {
            if !spec.enabled {
                tracing::debug!(route_key = %route_key, policy = %spec.name, "policy disabled, skipped");
                continue;
            }
            if spec.name.trim().is_empty() || spec.version.trim().is_empty() {
                return Err(PolykernError::InvalidConfig(
                    "policy reference requires name and version".into(),
                ));
            }

            let definition = self.registry.definition(&spec.name, &spec.version)?;
            let condition = match &spec.execution_condition {
                Some(raw) => Condition::compile(raw)?,
                None => None,
            };

            let meta = PolicyMetadata {
                route_key: route_key.to_string(),
                api_name: api_name.to_string(),
                policy_name: spec.name.clone(),
                policy_version: spec.version.clone(),
            };
            let policy =
                self.registry
                    .create_instance(&spec.name, &spec.version, &meta, &spec.parameters)?;
            instances.push(InstanceKey::new(&spec.name, &spec.version, &meta, &spec.parameters));
            let mode = policy.mode();

            requires_request_body |=
                definition.requires_request_body || mode.request_body.needs_body();
            requires_response_body |=
                definition.requires_response_body || mode.response_body.needs_body();

            if !definition.supports_request_phase && !definition.supports_response_phase {
                tracing::warn!(
                    route_key = %route_key,
                    policy = %spec.name,
                    version = %spec.version,
                    "policy declares no phase; it will never run"
                );
            }

            let entry = Arc::new(ChainEntry {
                spec: spec.clone(),
                policy,
                condition,
                mode,
            });
            if definition.supports_request_phase {
                request.push(Arc::clone(&entry));
            }
            if definition.supports_response_phase {
                response.push(entry);
            }
        }

        Ok(PolicyChain {
            route_key: route_key.to_string(),
            api_name: api_name.to_string(),
            request,
            response,
            instances,
            requires_request_body,
            requires_response_body,
        })
    }
}
