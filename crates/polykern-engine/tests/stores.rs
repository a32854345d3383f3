#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use serde_json::json;

use polykern_core::error::ErrorCode;
use polykern_engine::state::{ApiKey, ApiKeyStore, MetadataEntry, MetadataStore};
use polykern_engine::sync::{
    ApiKeyHandler, DecodedResource, MetadataHandler, ResourceHandler, API_KEY_STATE_TYPE_URL,
    METADATA_TYPE_URL,
};

fn key(id: &str, api_id: &str, value: &str) -> ApiKey {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("key {id}"),
        "apiKey": value,
        "apiId": api_id,
        "status": "active",
        "indexKey": format!("idx-{id}"),
    }))
    .unwrap()
}

fn entry(resource_type: &str, id: &str) -> MetadataEntry {
    serde_json::from_value(json!({
        "id": id,
        "resourceType": resource_type,
        "resource": { "owner": "team-a" },
    }))
    .unwrap()
}

#[test]
fn api_key_lookups() {
    let store = ApiKeyStore::new();
    let report = store.replace(
        2,
        vec![key("k1", "api-a", "h1"), key("k2", "api-a", "h2"), key("k3", "api-b", "h3")],
    );
    assert_eq!(report.accepted, 3);
    assert_eq!(store.version(), 2);

    assert_eq!(store.find("api-a", "h2").unwrap().id, "k2");
    assert!(store.find("api-b", "h2").is_none());
    assert_eq!(store.find_by_index_key("idx-k3").unwrap().api_id, "api-b");
    assert_eq!(store.keys_for_api("api-a").len(), 2);
    assert!(store.get("k1").unwrap().is_active());
}

#[test]
fn api_key_replace_is_wholesale() {
    let store = ApiKeyStore::new();
    store.replace(1, vec![key("k1", "api-a", "h1"), key("k2", "api-a", "h2")]);
    let before = store.snapshot();

    store.replace(2, vec![key("k3", "api-a", "h3")]);
    assert_eq!(store.len(), 1);
    assert!(store.get("k1").is_none());
    assert!(store.find("api-a", "h1").is_none());

    // A snapshot taken earlier still sees the whole previous set.
    assert_eq!(before.len(), 2);
    assert!(before.get("k1").is_some());
}

#[test]
fn incomplete_api_keys_are_dropped_and_duplicates_last_win() {
    let store = ApiKeyStore::new();
    let report = store.replace(
        1,
        vec![
            key("k1", "api-a", "old"),
            key("k2", "", "h2"),
            key("k1", "api-b", "new"),
        ],
    );
    assert_eq!(report.accepted, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get("k1").unwrap().api_key, "new");
    assert!(store.keys_for_api("api-a").is_empty());
    assert_eq!(store.find("api-b", "new").unwrap().id, "k1");
}

#[test]
fn metadata_lookups_and_replace() {
    let store = MetadataStore::new();
    let report = store.replace(
        5,
        vec![entry("plan", "gold"), entry("plan", "bronze"), entry("app", "a1"), entry("", "x")],
    );
    assert_eq!(report.accepted, 3);
    assert_eq!(report.dropped, 1);
    assert_eq!(store.version(), 5);

    let plans: Vec<String> = store.by_type("plan").iter().map(|e| e.id.clone()).collect();
    assert_eq!(plans, ["bronze", "gold"]);
    assert_eq!(
        store.get("app", "a1").unwrap().resource["owner"].as_str(),
        Some("team-a")
    );

    store.replace(6, vec![]);
    assert!(store.is_empty());
}

fn decoded(type_url: &str, payload: serde_json::Value) -> DecodedResource {
    DecodedResource {
        type_url: type_url.into(),
        payload,
    }
}

#[test]
fn api_key_handler_merges_resources() {
    let store = Arc::new(ApiKeyStore::new());
    let handler = ApiKeyHandler::new(Arc::clone(&store));
    assert_eq!(handler.type_url(), API_KEY_STATE_TYPE_URL);

    let outcome = handler
        .apply(
            "v1",
            vec![
                decoded(
                    API_KEY_STATE_TYPE_URL,
                    json!({ "apiKeys": [{ "id": "k1", "apiKey": "h1", "apiId": "a" }], "version": 3 }),
                ),
                decoded(
                    API_KEY_STATE_TYPE_URL,
                    json!({ "apiKeys": [{ "id": "k2", "apiKey": "h2", "apiId": "a" }], "version": "7" }),
                ),
            ],
        )
        .unwrap();
    assert_eq!(outcome.accepted, 2);
    assert_eq!(store.version(), 7);
}

#[test]
fn api_key_handler_rejects_undecodable_push_and_keeps_state() {
    let store = Arc::new(ApiKeyStore::new());
    store.replace(1, vec![key("k1", "api-a", "h1")]);
    let handler = ApiKeyHandler::new(Arc::clone(&store));

    let err = handler
        .apply(
            "v2",
            vec![
                decoded(API_KEY_STATE_TYPE_URL, json!({ "apiKeys": [] })),
                decoded(API_KEY_STATE_TYPE_URL, json!({ "apiKeys": "not a list" })),
            ],
        )
        .expect_err("second resource is malformed");
    assert_eq!(err.code(), ErrorCode::Decode);
    assert_eq!(store.len(), 1);
    assert_eq!(store.version(), 1);
}

#[test]
fn metadata_handler_replaces_store() {
    let store = Arc::new(MetadataStore::new());
    store.replace(1, vec![entry("plan", "old")]);
    let handler = MetadataHandler::new(Arc::clone(&store));
    assert_eq!(handler.type_url(), METADATA_TYPE_URL);

    handler
        .apply(
            "v2",
            vec![decoded(
                METADATA_TYPE_URL,
                json!({
                    "resources": [{ "id": "new", "resourceType": "plan", "resource": {} }],
                    "version": 2
                }),
            )],
        )
        .unwrap();
    assert!(store.get("plan", "old").is_none());
    assert!(store.get("plan", "new").is_some());
    assert_eq!(store.version(), 2);
}
