use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

pub struct HealthState {
    pub registry: Arc<Registry>,
    /// Flipped once the HTTPS webhook listener is bound.
    pub ready: Arc<AtomicBool>,
}

pub type SharedHealthState = Arc<HealthState>;

pub fn health_router(state: SharedHealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<SharedHealthState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_handler(State(state): State<SharedHealthState>) -> Response {
    let mut buffer = String::new();
    match encode(&mut buffer, &state.registry) {
        Ok(()) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], buffer).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::metrics::InjectorMetrics;

    fn state(ready: bool) -> SharedHealthState {
        let mut registry = Registry::default();
        let metrics = InjectorMetrics::new(&mut registry);
        metrics.record_request("ok");
        Arc::new(HealthState {
            registry: Arc::new(registry),
            ready: Arc::new(AtomicBool::new(ready)),
        })
    }

    async fn get_status(state: SharedHealthState, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = health_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_readiness_follows_flag() {
        let (status, _) = get_status(state(false), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = get_status(state(true), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_liveness() {
        let (status, body) = get_status(state(false), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let (status, body) = get_status(state(true), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("injector_admission_requests_total"));
        assert!(body.ends_with("# EOF\n"));
    }
}
