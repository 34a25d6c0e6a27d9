//! Error-to-HTTP mapping with the stable JSON envelope.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use esg_core::EsgError;

pub const UPGRADE_URL: &str = "https://esg-platform.example.com/pricing";

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_url: Option<String>,
}

/// Wrapper so domain errors can flow out of handlers with `?`.
pub struct ApiError(pub EsgError);

impl From<EsgError> for ApiError {
    fn from(err: EsgError) -> Self {
        Self(err)
    }
}

fn status_for(err: &EsgError) -> StatusCode {
    match err {
        EsgError::Validation { .. } => StatusCode::BAD_REQUEST,
        EsgError::AuthRequired | EsgError::TokenInvalid { .. } => StatusCode::UNAUTHORIZED,
        EsgError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        EsgError::NotFound { .. } => StatusCode::NOT_FOUND,
        EsgError::Parse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EsgError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        EsgError::Fetch { .. } => StatusCode::BAD_GATEWAY,
        EsgError::Database { .. } | EsgError::CacheUnavailable { .. } | EsgError::Busy { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        EsgError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        EsgError::Config { .. } | EsgError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);

        let mut headers = HeaderMap::new();
        let mut retry_after = None;
        match &err {
            EsgError::RateLimited {
                retry_after_secs,
                limit,
                ..
            } => {
                retry_after = Some(*retry_after_secs);
                headers.insert(
                    header::RETRY_AFTER,
                    HeaderValue::from_str(&retry_after_secs.to_string())
                        .unwrap_or(HeaderValue::from_static("60")),
                );
                headers.insert(
                    "X-RateLimit-Limit",
                    HeaderValue::from_str(&limit.to_string())
                        .unwrap_or(HeaderValue::from_static("0")),
                );
                headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
                headers.insert(
                    "X-RateLimit-Reset",
                    HeaderValue::from_str(&retry_after_secs.to_string())
                        .unwrap_or(HeaderValue::from_static("60")),
                );
            }
            EsgError::Busy { .. } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
                retry_after = Some(1);
            }
            _ => {}
        }

        if status.is_server_error() {
            tracing::error!(error = %err, kind = err.error_kind(), "request failed");
        } else {
            tracing::debug!(error = %err, kind = err.error_kind(), "request rejected");
        }

        let envelope = ErrorEnvelope {
            error: err.error_kind().to_string(),
            message: err.to_string(),
            retry_after,
            upgrade_url: matches!(err, EsgError::InsufficientCredits { .. })
                .then(|| UPGRADE_URL.to_string()),
        };

        (status, headers, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
