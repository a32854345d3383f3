//! Discovery protocol messages and resource envelope unwrapping.
//!
//! The control plane relays resources through generic wrappers, sometimes
//! several deep: `{ "@type": <relay type>, "value": { "@type": <real type>,
//! "value": <payload> } }`. A wrapper's `value` may be inline JSON or a base64
//! string holding JSON bytes. `unwrap_envelope` is the only place that knows
//! this; everything downstream sees a `DecodedResource`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use polykern_core::error::{PolykernError, Result};

use crate::chain::PolicySpec;

pub const POLICY_CHAIN_TYPE_URL: &str = "type.polykern.dev/polykern.v1.PolicyChainConfig";
pub const API_KEY_STATE_TYPE_URL: &str = "type.polykern.dev/polykern.v1.ApiKeyState";
pub const METADATA_TYPE_URL: &str = "type.polykern.dev/polykern.v1.MetadataState";

/// Wrappers nested deeper than this are rejected.
const MAX_ENVELOPE_DEPTH: usize = 8;

/// Identity announced on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Client -> control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    #[serde(default)]
    pub version_info: String,
    #[serde(default)]
    pub node: Option<Node>,
    pub type_url: String,
    #[serde(default)]
    pub response_nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

impl DiscoveryRequest {
    /// Subscription request sent right after connecting. `version_info` is the
    /// last version accepted on a previous connection, if any.
    pub fn subscribe(node: &Node, type_url: &str, version_info: &str) -> Self {
        Self {
            version_info: version_info.to_string(),
            node: Some(node.clone()),
            type_url: type_url.to_string(),
            response_nonce: String::new(),
            error_detail: None,
        }
    }

    pub fn ack(node: &Node, type_url: &str, version_info: &str, nonce: &str) -> Self {
        Self {
            version_info: version_info.to_string(),
            node: Some(node.clone()),
            type_url: type_url.to_string(),
            response_nonce: nonce.to_string(),
            error_detail: None,
        }
    }

    /// Reject a push; `accepted_version` is the version still in force.
    pub fn nack(
        node: &Node,
        type_url: &str,
        accepted_version: &str,
        nonce: &str,
        err: &PolykernError,
    ) -> Self {
        Self {
            version_info: accepted_version.to_string(),
            node: Some(node.clone()),
            type_url: type_url.to_string(),
            response_nonce: nonce.to_string(),
            error_detail: Some(ErrorDetail {
                code: err.code().as_str().to_string(),
                message: err.to_string(),
            }),
        }
    }

    pub fn is_nack(&self) -> bool {
        self.error_detail.is_some()
    }
}

/// Control plane -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub version_info: String,
    pub type_url: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub resources: Vec<Value>,
}

pub fn encode_request(req: &DiscoveryRequest) -> Result<String> {
    serde_json::to_string(req).map_err(|e| PolykernError::Internal(format!("encode request: {e}")))
}

pub fn decode_request(frame: &str) -> Result<DiscoveryRequest> {
    serde_json::from_str(frame).map_err(|e| PolykernError::Decode(format!("invalid request: {e}")))
}

pub fn encode_response(resp: &DiscoveryResponse) -> Result<String> {
    serde_json::to_string(resp).map_err(|e| PolykernError::Internal(format!("encode response: {e}")))
}

pub fn decode_response(frame: &str) -> Result<DiscoveryResponse> {
    serde_json::from_str(frame)
        .map_err(|e| PolykernError::Decode(format!("invalid discovery response: {e}")))
}

/// A resource with every transport wrapper removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResource {
    /// Innermost declared type.
    pub type_url: String,
    pub payload: Value,
}

fn declared_type(obj: &serde_json::Map<String, Value>) -> Option<&str> {
    ["@type", "typeUrl", "type_url"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_str)
}

fn decode_wrapped_value(type_url: &str, value: &Value) -> Result<Value> {
    match value {
        Value::String(encoded) => {
            let bytes = BASE64.decode(encoded.as_bytes()).map_err(|e| {
                PolykernError::Decode(format!("envelope {type_url}: value is not base64: {e}"))
            })?;
            serde_json::from_slice(&bytes).map_err(|e| {
                PolykernError::Decode(format!("envelope {type_url}: value is not json: {e}"))
            })
        }
        other => Ok(other.clone()),
    }
}

/// Peel every wrapper layer off one resource.
pub fn unwrap_envelope(raw: &Value) -> Result<DecodedResource> {
    let mut type_url: Option<String> = None;
    let mut current = raw.clone();

    for _ in 0..MAX_ENVELOPE_DEPTH {
        let Some(obj) = current.as_object() else {
            break;
        };
        let Some(declared) = declared_type(obj) else {
            break;
        };
        let declared = declared.to_string();

        let next = match obj.get("value") {
            Some(v) => decode_wrapped_value(&declared, v)?,
            // Fields inlined next to the type marker.
            None => {
                let mut inline = obj.clone();
                for k in ["@type", "typeUrl", "type_url"] {
                    inline.remove(k);
                }
                type_url = Some(declared);
                current = Value::Object(inline);
                break;
            }
        };
        type_url = Some(declared);
        current = next;
    }

    if let Some(obj) = current.as_object() {
        if declared_type(obj).is_some() && obj.contains_key("value") {
            return Err(PolykernError::Decode(format!(
                "envelope nested deeper than {MAX_ENVELOPE_DEPTH} layers"
            )));
        }
    }

    let type_url =
        type_url.ok_or_else(|| PolykernError::Decode("resource carries no type url".into()))?;
    Ok(DecodedResource {
        type_url,
        payload: current,
    })
}

/// Accepts a version given as a number or a numeric string.
pub fn lenient_version<'de, D>(de: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::Number(n) => Ok(n.as_i64().unwrap_or_default()),
        Value::String(s) => Ok(s.trim().parse().unwrap_or_default()),
        _ => Ok(0),
    }
}

// --------------------
// Policy-chain resource
// --------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChainResource {
    #[serde(default)]
    pub id: String,
    pub configuration: ApiConfiguration,
    #[serde(default, deserialize_with = "lenient_version")]
    pub version: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfiguration {
    #[serde(default)]
    pub metadata: ApiMetadata,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMetadata {
    #[serde(default)]
    pub api_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    #[serde(default)]
    pub route_key: String,
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
}
