//! Operational HTTP endpoints, mountable by the host proxy.
//!
//! - `/healthz` : liveness
//! - `/readyz`  : readiness (503 until the first route table is applied)
//! - `/metrics` : Prometheus text format

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::engine::PolicyEngine;

pub fn router(engine: PolicyEngine) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(engine)
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(engine): State<PolicyEngine>) -> impl IntoResponse {
    if engine.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "awaiting config")
    }
}

pub async fn metrics(State(engine): State<PolicyEngine>) -> Response {
    let kernel = engine.kernel();
    let extra = [
        ("polykern_route_table_generation", kernel.generation()),
        ("polykern_api_keys", engine.api_keys().len() as u64),
        ("polykern_metadata_resources", engine.metadata().len() as u64),
    ];
    let body = engine.metrics().render(&extra);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
