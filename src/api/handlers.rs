use std::collections::BTreeMap;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::core::metrics;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::{HealthResponse, RootResponse};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let api = state.settings().api();
    Json(RootResponse {
        message: api.project_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs_url: format!("{}/docs", api.api_v1_str),
    })
}

/// Database reachability decides the status code; storage is reported but
/// optional, since lectures without files keep working.
pub(crate) async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut components = BTreeMap::new();

    let database_ok = match repositories::health::ping(state.db()).await {
        Ok(()) => {
            components.insert("database", "healthy".to_string());
            true
        }
        Err(reason) => {
            tracing::warn!(error = %reason, "Health check: database unreachable");
            components.insert("database", format!("unhealthy: {reason}"));
            false
        }
    };

    let storage = match state.storage() {
        Some(storage) => format!("configured ({})", storage.bucket()),
        None => "disabled".to_string(),
    };
    components.insert("storage", storage);

    let (code, status) = if database_ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (code, Json(HealthResponse { service: "coursehub-api", status, components }))
}

pub(crate) async fn metrics(State(state): State<AppState>) -> Response {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    metrics::render()
        .map(|body| ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response())
        .unwrap_or_else(|| StatusCode::SERVICE_UNAVAILABLE.into_response())
}
