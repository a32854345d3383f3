use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use polykern_core::ConfigValue;

use super::ReplaceReport;

/// One API key as pushed by the control plane. `api_key` carries whatever
/// form the control plane distributes (typically a hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_id: String,
    #[serde(default)]
    pub operations: Option<ConfigValue>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub index_key: Option<String>,
}

impl ApiKey {
    pub fn is_active(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("active")
    }
}

/// Decoded API-key resource payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStateResource {
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
    #[serde(default, deserialize_with = "crate::sync::protocol::lenient_version")]
    pub version: i64,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Immutable API-key snapshot.
#[derive(Debug, Default)]
pub struct ApiKeyState {
    pub version: i64,
    keys: HashMap<String, Arc<ApiKey>>,
    by_index: HashMap<String, String>,
    by_api: HashMap<String, Vec<String>>,
}

impl ApiKeyState {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ApiKey>> {
        self.keys.get(id).cloned()
    }
}

#[derive(Default)]
pub struct ApiKeyStore {
    state: ArcSwap<ApiKeyState>,
}

impl ApiKeyStore {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(ApiKeyState::default()),
        }
    }

    /// Replace every key in one swap. Entries without id, apiKey, or apiId
    /// are dropped and logged.
    pub fn replace(&self, version: i64, keys: Vec<ApiKey>) -> ReplaceReport {
        let mut next = ApiKeyState {
            version,
            ..ApiKeyState::default()
        };
        let mut report = ReplaceReport::default();

        for key in keys {
            if key.id.is_empty() || key.api_key.is_empty() || key.api_id.is_empty() {
                tracing::warn!(key_id = %key.id, api_id = %key.api_id, "api key missing id/apiKey/apiId, dropped");
                report.dropped += 1;
                continue;
            }
            if let Some(prev) = next.keys.get(&key.id) {
                tracing::warn!(key_id = %key.id, "duplicate api key id, last entry wins");
                if let Some(idx) = &prev.index_key {
                    next.by_index.remove(idx);
                }
                let prev_api = prev.api_id.clone();
                if let Some(ids) = next.by_api.get_mut(&prev_api) {
                    ids.retain(|i| i != &key.id);
                }
                report.accepted -= 1;
            }
            if let Some(idx) = &key.index_key {
                next.by_index.insert(idx.clone(), key.id.clone());
            }
            next.by_api
                .entry(key.api_id.clone())
                .or_default()
                .push(key.id.clone());
            next.keys.insert(key.id.clone(), Arc::new(key));
            report.accepted += 1;
        }

        self.state.store(Arc::new(next));
        tracing::info!(version, accepted = report.accepted, dropped = report.dropped, "api key state replaced");
        report
    }

    pub fn snapshot(&self) -> Arc<ApiKeyState> {
        self.state.load_full()
    }

    pub fn version(&self) -> i64 {
        self.state.load().version
    }

    pub fn len(&self) -> usize {
        self.state.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.load().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ApiKey>> {
        self.state.load().get(id)
    }

    pub fn find_by_index_key(&self, index_key: &str) -> Option<Arc<ApiKey>> {
        let state = self.state.load();
        state
            .by_index
            .get(index_key)
            .and_then(|id| state.keys.get(id))
            .cloned()
    }

    /// Look up a presented key value for one API.
    pub fn find(&self, api_id: &str, api_key: &str) -> Option<Arc<ApiKey>> {
        let state = self.state.load();
        state
            .by_api
            .get(api_id)?
            .iter()
            .filter_map(|id| state.keys.get(id))
            .find(|k| k.api_key == api_key)
            .cloned()
    }

    pub fn keys_for_api(&self, api_id: &str) -> Vec<Arc<ApiKey>> {
        let state = self.state.load();
        state
            .by_api
            .get(api_id)
            .map(|ids| ids.iter().filter_map(|id| state.keys.get(id)).cloned().collect())
            .unwrap_or_default()
    }
}
