//! Request middleware: correlation ids, bearer authentication and
//! request metrics.

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;
use uuid::Uuid;

use esg_core::EsgError;

use crate::errors::ApiError;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Attaches a correlation id to the request extensions and the response.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Records request counts and latency per matched route.
pub async fn track_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let started = Instant::now();
    let response = next.run(request).await;

    state
        .metrics
        .api_request_duration_seconds
        .with_label_values(&[&endpoint])
        .observe(started.elapsed().as_secs_f64());
    state
        .metrics
        .api_requests_total
        .with_label_values(&[&endpoint, response.status().as_str()])
        .inc();
    response
}

/// Verifies the bearer token and stores the resulting principal in the
/// request extensions. Runs only on protected routes.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let principal = match token {
        Some(token) => match state.tokens.verify(token) {
            Ok(principal) => principal,
            Err(err) => return ApiError(err).into_response(),
        },
        None => return ApiError(EsgError::AuthRequired).into_response(),
    };

    request.extensions_mut().insert(principal);
    next.run(request).await
}
