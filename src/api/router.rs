use axum::{
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

use crate::api::{assignments, handlers, progress, submissions};
use crate::core::{config::Settings, state::AppState};

pub(crate) fn router(state: AppState) -> Router {
    let cors = build_cors_layer(state.settings());
    let api_v1_prefix = state.settings().api().api_v1_str.clone();
    let max_audio_bytes = usize::try_from(state.settings().grading().max_audio_size_mb * 1024 * 1024)
        .unwrap_or(usize::MAX);
    let api_v1 = Router::new()
        .nest("/submissions", submissions::router(max_audio_bytes))
        .nest("/progress", progress::router())
        .merge(assignments::router());

    let request_id_header = HeaderName::from_static("x-request-id");
    let request_id_header_for_span = request_id_header.clone();
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(move |request: &Request<_>| {
            let request_id = request
                .headers()
                .get(&request_id_header_for_span)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_response(|response: &Response<axum::body::Body>, latency: Duration, _span: &Span| {
            let status_label = response.status().as_u16().to_string();
            metrics::counter!(
                "http_requests_total",
                "status" => status_label.clone()
            )
            .increment(1);
            metrics::histogram!(
                "http_request_duration_seconds",
                "status" => status_label
            )
            .record(latency.as_secs_f64());
        });

    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&api_v1_prefix, api_v1)
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(trace_layer)
        .layer(cors);

    if state.settings().telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router.with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            ORIGIN,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        // Wildcard origin cannot be combined with allow_credentials
        base.allow_origin(Any)
    } else {
        base.allow_credentials(true)
            .allow_origin(AllowOrigin::list(origins))
    }
}

#[cfg(test)]
mod tests {
    use super::router;
    use axum::{body::Body, http::Request, http::StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::core::redis::RedisHandle;
    use crate::core::state::AppState;
    use crate::core::{config::Settings, metrics};
    use crate::repositories::memory::MemoryStore;
    use crate::test_support::{self, FakeEvaluator, FakeTranscriber};

    fn build_state(settings: Settings) -> AppState {
        let harness = test_support::pipeline_harness(
            MemoryStore::new(),
            FakeTranscriber::replying("hello"),
            FakeEvaluator::scoring(80),
        );
        let redis = RedisHandle::new(settings.redis().redis_url());
        AppState::new(settings, Arc::new(harness.store.clone()), redis, harness.pipeline.clone())
    }

    #[tokio::test]
    async fn root_returns_message() {
        let ctx = test_support::setup_test_context(
            FakeTranscriber::replying("hello"),
            FakeEvaluator::scoring(80),
        )
        .await;

        let response = ctx
            .app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = test_support::read_json(response).await;
        assert_eq!(json["message"], "Speakwise Grading API");
    }

    #[tokio::test]
    async fn healthz_reports_store_and_redis() {
        let ctx = test_support::setup_test_context(
            FakeTranscriber::replying("hello"),
            FakeEvaluator::scoring(80),
        )
        .await;

        let response = ctx
            .app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = test_support::read_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["database"], "healthy");
        assert_eq!(json["components"]["redis"], "disconnected");
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let ctx = test_support::setup_test_context(
            FakeTranscriber::replying("hello"),
            FakeEvaluator::scoring(80),
        )
        .await;

        let response = ctx
            .app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn metrics_disabled_returns_404() {
        let ctx = test_support::setup_test_context(
            FakeTranscriber::replying("hello"),
            FakeEvaluator::scoring(80),
        )
        .await;

        let response = ctx
            .app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_enabled_returns_200() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("PROMETHEUS_ENABLED", "1");

        let settings = Settings::load().expect("settings");
        std::env::set_var("PROMETHEUS_ENABLED", "0");
        metrics::init(&settings).expect("metrics init");
        let app = router(build_state(settings));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
