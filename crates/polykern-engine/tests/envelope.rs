//! Resource envelope vectors and discovery message framing.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use serde::Deserialize;
use serde_json::{json, Value};

use polykern_core::error::PolykernError;
use polykern_engine::sync::protocol::{
    decode_request, decode_response, encode_request, PolicyChainResource,
};
use polykern_engine::sync::{
    unwrap_envelope, DiscoveryRequest, Node, API_KEY_STATE_TYPE_URL, POLICY_CHAIN_TYPE_URL,
};

#[derive(Debug, Deserialize)]
struct EnvelopeVector {
    description: String,
    resource: Value,
    #[serde(default)]
    expect_type_url: Option<String>,
    #[serde(default)]
    expect_payload: Option<Value>,
    #[serde(default)]
    expect_error: Option<String>,
}

fn load(name: &str) -> EnvelopeVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn envelope_vectors() {
    let files = [
        "envelope_single.json",
        "envelope_double.json",
        "envelope_triple_base64.json",
        "envelope_inline_fields.json",
        "envelope_missing_type.json",
        "envelope_bad_base64.json",
        "envelope_base64_not_json.json",
        "envelope_too_deep.json",
    ];

    for f in files {
        let v = load(f);
        let res = unwrap_envelope(&v.resource);

        if let Some(code) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.code().as_str(), code, "vector={}", v.description);
            continue;
        }

        let decoded = res.unwrap_or_else(|e| panic!("vector={} failed: {e}", v.description));
        assert_eq!(
            Some(decoded.type_url.as_str()),
            v.expect_type_url.as_deref(),
            "vector={}",
            v.description
        );
        if let Some(payload) = v.expect_payload {
            assert_eq!(decoded.payload, payload, "vector={}", v.description);
        }
    }
}

#[test]
fn unwrapped_policy_chain_decodes() {
    let raw = json!({
        "@type": "type.googleapis.com/relay.v1.Resource",
        "value": {
            "@type": POLICY_CHAIN_TYPE_URL,
            "value": {
                "id": "api-1",
                "version": "4",
                "configuration": {
                    "metadata": { "apiName": "orders" },
                    "routes": [{
                        "routeKey": "GET|/orders|example.com",
                        "policies": [{ "name": "set-header", "version": "v1", "enabled": false }]
                    }]
                }
            }
        }
    });

    let decoded = unwrap_envelope(&raw).unwrap();
    assert_eq!(decoded.type_url, POLICY_CHAIN_TYPE_URL);
    let api: PolicyChainResource = serde_json::from_value(decoded.payload).unwrap();
    assert_eq!(api.id, "api-1");
    assert_eq!(api.version, 4);
    assert_eq!(api.configuration.metadata.api_name, "orders");
    assert_eq!(api.configuration.routes[0].route_key, "GET|/orders|example.com");
    assert!(!api.configuration.routes[0].policies[0].enabled);
}

#[test]
fn nack_carries_code_and_previous_version() {
    let node = Node {
        id: "gw-1".into(),
        cluster: "edge".into(),
    };
    let err = PolykernError::Decode("bad envelope".into());
    let nack = DiscoveryRequest::nack(&node, API_KEY_STATE_TYPE_URL, "3", "n-7", &err);
    assert!(nack.is_nack());

    let frame = encode_request(&nack).unwrap();
    let wire: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(wire["versionInfo"], "3");
    assert_eq!(wire["responseNonce"], "n-7");
    assert_eq!(wire["typeUrl"], API_KEY_STATE_TYPE_URL);
    assert_eq!(wire["errorDetail"]["code"], "DECODE");
    assert_eq!(wire["node"]["id"], "gw-1");

    assert_eq!(decode_request(&frame).unwrap(), nack);
}

#[test]
fn ack_has_no_error_detail_on_the_wire() {
    let node = Node {
        id: "gw-1".into(),
        cluster: String::new(),
    };
    let ack = DiscoveryRequest::ack(&node, POLICY_CHAIN_TYPE_URL, "9", "n-1");
    assert!(!ack.is_nack());
    let wire: Value = serde_json::from_str(&encode_request(&ack).unwrap()).unwrap();
    assert!(wire.get("errorDetail").is_none());
}

#[test]
fn response_fields_default_when_absent() {
    let resp = decode_response(r#"{ "typeUrl": "t" }"#).unwrap();
    assert_eq!(resp.type_url, "t");
    assert!(resp.version_info.is_empty());
    assert!(resp.nonce.is_empty());
    assert!(resp.resources.is_empty());

    let err = decode_response("{ not json").expect_err("garbage");
    assert_eq!(err.code().as_str(), "DECODE");
}
