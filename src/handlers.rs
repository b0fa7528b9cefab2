use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use json_patch::Patch;
use kube::core::DynamicObject;
use kube::core::admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, ConvertAdmissionReviewError,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::engine::TolerationInjector;
use crate::metrics::InjectorMetrics;

const JSON_CONTENT_TYPE: &str = "application/json";
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub struct AppState {
    pub injector: TolerationInjector,
    pub metrics: InjectorMetrics,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("expected Content-Type application/json, got {0:?}")]
    UnsupportedMediaType(String),
    #[error("failed to decode AdmissionReview: {0}")]
    MalformedReview(#[source] serde_json::Error),
    #[error("invalid AdmissionReview: {0}")]
    MissingRequest(#[from] ConvertAdmissionReviewError),
    #[error("failed to encode AdmissionReview: {0}")]
    Encode(#[source] serde_json::Error),
}

impl TransportError {
    fn status(&self) -> StatusCode {
        match self {
            TransportError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TransportError::MalformedReview(_) | TransportError::MissingRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            TransportError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            TransportError::UnsupportedMediaType(_) => "unsupported_media_type",
            TransportError::MalformedReview(_) | TransportError::MissingRequest(_) => {
                "bad_request"
            }
            TransportError::Encode(_) => "encode_error",
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

pub fn webhook_router(path: &str, state: SharedState) -> Router {
    Router::new()
        .route(path, post(handle_inject))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn handle_inject(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let result = admit(&state, &headers, &body);
    state
        .metrics
        .admission_request_duration_seconds
        .observe(start.elapsed().as_secs_f64());

    match result {
        Ok(response) => {
            state.metrics.record_request("ok");
            response
        }
        Err(e) => {
            match &e {
                TransportError::Encode(_) => error!("{e}"),
                _ => warn!("rejecting admission call: {e}"),
            }
            state.metrics.record_request(e.outcome());
            e.into_response()
        }
    }
}

fn admit(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<Response, TransportError> {
    check_content_type(headers)?;

    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(TransportError::MalformedReview)?;
    let request: AdmissionRequest<DynamicObject> = review.try_into()?;
    debug!(uid = %request.uid, operation = ?request.operation, "admission request decoded");

    let response = state.injector.decide(&request);
    state
        .metrics
        .record_response(response.allowed, response.patch.is_some());
    state
        .metrics
        .patch_operations
        .observe(patch_len(&response) as f64);

    let encoded = encode_review(response).map_err(TransportError::Encode)?;
    Ok(([(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], encoded).into_response())
}

fn patch_len(response: &AdmissionResponse) -> usize {
    response
        .patch
        .as_deref()
        .and_then(|bytes| serde_json::from_slice::<Patch>(bytes).ok())
        .map_or(0, |patch| patch.0.len())
}

/// Serializes the review envelope with `response.patch` as a base64 string,
/// the wire form the API server expects for the `patch` byte field.
fn encode_review(mut response: AdmissionResponse) -> Result<Vec<u8>, serde_json::Error> {
    let patch = response.patch.take();
    let mut review = serde_json::to_value(response.into_review())?;
    if let Some(patch) = patch {
        if let Some(body) = review.get_mut("response").and_then(Value::as_object_mut) {
            body.insert("patch".to_string(), Value::String(STANDARD.encode(patch)));
        }
    }
    serde_json::to_vec(&review)
}

fn check_content_type(headers: &HeaderMap) -> Result<(), TransportError> {
    let value = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let media_type = value.split(';').next().unwrap_or_default().trim();
    if media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        Ok(())
    } else {
        Err(TransportError::UnsupportedMediaType(value.to_string()))
    }
}
