//! Folding and applying policy modifications.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use polykern_core::{BodyMode, Headers, Modifications, ProcessingMode, RequestData, ResponseData};

#[test]
fn apply_to_request_updates_headers_path_and_body() {
    let mut req = RequestData::new("GET", "/v1/items")
        .with_header("X-Remove", "1")
        .with_header("keep", "yes");

    Modifications::new()
        .set_header("X-Added", "a")
        .remove_header("x-remove")
        .path("/v2/items")
        .body("hello")
        .apply_to_request(&mut req);

    assert_eq!(req.headers.get("x-added"), Some("a"));
    assert!(!req.headers.contains("x-remove"));
    assert_eq!(req.headers.get("KEEP"), Some("yes"));
    assert_eq!(req.path, "/v2/items");
    assert_eq!(req.body.as_deref(), Some(&b"hello"[..]));
}

#[test]
fn apply_to_response_overrides_status() {
    let mut resp = ResponseData::new(200);
    Modifications::new().status(403).apply_to_response(&mut resp);
    assert_eq!(resp.status, 403);
}

#[test]
fn merge_later_wins() {
    let mut merged = Modifications::new().set_header("x", "1").path("/first");
    merged.merge(Modifications::new().remove_header("x").set_header("y", "2"));
    assert!(!merged.set_headers.contains("x"));
    assert_eq!(merged.remove_headers, vec!["x".to_string()]);

    merged.merge(Modifications::new().set_header("x", "3").path("/second"));
    assert_eq!(merged.set_headers.get("x"), Some("3"));
    assert!(merged.remove_headers.is_empty());
    assert_eq!(merged.set_headers.get("y"), Some("2"));
    assert_eq!(merged.path.as_deref(), Some("/second"));
}

#[test]
fn empty_modifications() {
    assert!(Modifications::new().is_empty());
    assert!(!Modifications::new().status(500).is_empty());
}

#[test]
fn headers_are_case_insensitive() {
    let h: Headers = [("Content-Type", "text/plain")].into_iter().collect();
    assert_eq!(h.get("content-type"), Some("text/plain"));
    assert_eq!(h.iter().next(), Some(("content-type", "text/plain")));
}

#[test]
fn only_buffering_modes_need_body() {
    assert!(!BodyMode::Skip.needs_body());
    assert!(!BodyMode::HeadersOnly.needs_body());
    assert!(BodyMode::BufferFullBody.needs_body());
    assert!(BodyMode::StreamIncrementally.needs_body());

    let mode = ProcessingMode::request_headers().with_request_body(BodyMode::BufferFullBody);
    assert_eq!(mode.request_header, BodyMode::HeadersOnly);
    assert!(mode.request_body.needs_body());
    assert!(!mode.response_body.needs_body());
}
