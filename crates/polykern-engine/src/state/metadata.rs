use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;

use polykern_core::ConfigValue;

use super::ReplaceReport;

/// One opaque metadata resource.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub resource: BTreeMap<String, ConfigValue>,
}

/// Decoded metadata resource payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResource {
    #[serde(default)]
    pub resources: Vec<MetadataEntry>,
    #[serde(default, deserialize_with = "crate::sync::protocol::lenient_version")]
    pub version: i64,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

/// Immutable metadata snapshot keyed by `(resource_type, id)`.
#[derive(Debug, Default)]
pub struct MetadataState {
    pub version: i64,
    entries: HashMap<(String, String), Arc<MetadataEntry>>,
}

impl MetadataState {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
pub struct MetadataStore {
    state: ArcSwap<MetadataState>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(MetadataState::default()),
        }
    }

    pub fn replace(&self, version: i64, entries: Vec<MetadataEntry>) -> ReplaceReport {
        let mut next = MetadataState {
            version,
            entries: HashMap::with_capacity(entries.len()),
        };
        let mut report = ReplaceReport::default();

        for entry in entries {
            if entry.id.is_empty() || entry.resource_type.is_empty() {
                tracing::warn!(
                    resource_id = %entry.id,
                    resource_type = %entry.resource_type,
                    "metadata resource missing id/resourceType, dropped"
                );
                report.dropped += 1;
                continue;
            }
            let key = (entry.resource_type.clone(), entry.id.clone());
            if next.entries.insert(key, Arc::new(entry)).is_none() {
                report.accepted += 1;
            }
        }

        self.state.store(Arc::new(next));
        tracing::info!(version, accepted = report.accepted, dropped = report.dropped, "metadata state replaced");
        report
    }

    pub fn snapshot(&self) -> Arc<MetadataState> {
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

    pub fn get(&self, resource_type: &str, id: &str) -> Option<Arc<MetadataEntry>> {
        self.state
            .load()
            .entries
            .get(&(resource_type.to_string(), id.to_string()))
            .cloned()
    }

    pub fn by_type(&self, resource_type: &str) -> Vec<Arc<MetadataEntry>> {
        let mut out: Vec<Arc<MetadataEntry>> = self
            .state
            .load()
            .entries
            .iter()
            .filter(|((t, _), _)| t == resource_type)
            .map(|(_, e)| Arc::clone(e))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
