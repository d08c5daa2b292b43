use axum::{
    body::Body,
    extract::MatchedPath,
    http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method, Request, Response},
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::api::{
    attempts, auth, course_tests, groups, handlers, lectures, questions, subjects, users,
};
use crate::core::{config::CorsSettings, state::AppState};

const REQUEST_ID_HEADER: &str = "x-request-id";

pub(crate) fn router(state: AppState) -> Router {
    let settings = state.settings();
    let prefix = settings.api().api_v1_str.clone();
    let expose_metrics = settings.telemetry().prometheus_enabled;
    let max_upload_bytes = settings.storage().max_upload_bytes();
    let cors = cors_layer(settings.cors());

    let mut app: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&prefix, api_v1(max_upload_bytes));
    if expose_metrics {
        app = app.route("/metrics", get(handlers::metrics));
    }

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    app.layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(request_span).on_response(record_response))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

/// Every versioned resource. Subject- and test-scoped collections are merged
/// into the parent resource so that `/subjects/:id/lectures` and friends share
/// one path prefix.
fn api_v1(max_upload_bytes: u64) -> Router<AppState> {
    let subjects = subjects::router()
        .merge(lectures::subject_router(max_upload_bytes))
        .merge(course_tests::subject_router());
    let tests = course_tests::router()
        .merge(questions::test_router())
        .merge(attempts::test_router());

    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/groups", groups::router())
        .nest("/subjects", subjects)
        .nest("/lectures", lectures::router(max_upload_bytes))
        .nest("/tests", tests)
        .nest("/questions", questions::router())
        .nest("/attempts", attempts::router())
}

fn request_span(request: &Request<Body>) -> Span {
    // Route templates keep span cardinality bounded; raw ids stay in `uri`.
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        method = %request.method(),
        route = %route,
        uri = %request.uri(),
        request_id = %request_id,
    )
}

fn record_response(response: &Response<Body>, latency: Duration, _span: &Span) {
    let status = response.status();
    let class = match status.as_u16() {
        100..=399 => "ok",
        400..=499 => "client_error",
        _ => "server_error",
    };

    metrics::counter!(
        "http_requests_total",
        "status" => status.as_u16().to_string(),
        "class" => class
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds", "class" => class)
        .record(latency.as_secs_f64());

    if status.is_server_error() {
        tracing::warn!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "request failed"
        );
    }
}

fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, ORIGIN, request_id.clone()])
        .expose_headers([request_id])
        .max_age(Duration::from_secs(60 * 60));

    let allowed: Vec<HeaderValue> =
        settings.origins.iter().filter_map(|origin| origin.parse().ok()).collect();
    if allowed.is_empty() {
        // Credentials are not allowed together with a wildcard origin.
        layer.allow_origin(Any)
    } else {
        layer.allow_credentials(true).allow_origin(AllowOrigin::list(allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::router;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        Router,
    };
    use tokio::sync::OwnedMutexGuard;
    use tower::ServiceExt;

    use crate::core::state::AppState;
    use crate::core::{config::Settings, metrics};
    use crate::test_support;

    async fn app_with_env(extra: &[(&str, &str)]) -> (Router, OwnedMutexGuard<()>) {
        let guard = test_support::env_lock().await;
        test_support::set_test_env();
        for (key, value) in extra {
            std::env::set_var(key, value);
        }
        let settings = Settings::load().expect("settings");
        if settings.telemetry().prometheus_enabled {
            metrics::init(&settings).expect("metrics init");
        }
        let db =
            sqlx::PgPool::connect_lazy(&settings.database().database_url()).expect("lazy pool");
        (router(AppState::new(settings, db, None)), guard)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().method(Method::GET).uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn root_reports_project_name_and_docs_url() {
        let (app, _guard) = app_with_env(&[]).await;

        let response = app.oneshot(get("/")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = test_support::read_json(response).await;
        assert_eq!(json["message"], "CourseHub API");
        assert_eq!(json["docs_url"], "/api/v1/docs");
    }

    #[tokio::test]
    async fn api_routes_require_bearer_token() {
        let (app, _guard) = app_with_env(&[]).await;

        let response = app.oneshot(get("/api/v1/subjects")).await.expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let (app, _guard) = app_with_env(&[]).await;

        let response = app.oneshot(get("/")).await.expect("response");

        let request_id = response.headers().get("x-request-id").expect("request id header");
        assert!(!request_id.is_empty());
    }

    #[tokio::test]
    async fn metrics_route_follows_prometheus_flag() {
        let (app, guard) = app_with_env(&[]).await;
        let response = app.oneshot(get("/metrics")).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        drop(guard);

        let (app, _guard) = app_with_env(&[("PROMETHEUS_ENABLED", "1")]).await;
        let response = app.oneshot(get("/metrics")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
