use thiserror::Error;

use crate::types::{FetchFailure, Tier};

#[derive(Error, Debug)]
pub enum EsgError {
    #[error("validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("authentication required")]
    AuthRequired,

    #[error("invalid token: {reason}")]
    TokenInvalid { reason: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("rate limit exceeded for {tier:?}: limit {limit}, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        tier: Tier,
        limit: u32,
    },

    #[error("content fetch failed ({})", reason.as_str())]
    Fetch { reason: FetchFailure, message: String },

    #[error("content unreadable: {message}")]
    Parse { message: String },

    #[error("cache unavailable: {reason}")]
    CacheUnavailable { reason: String },

    #[error("database operation failed: {operation}: {reason}")]
    Database { operation: String, reason: String },

    #[error("too many concurrent analyses: {in_flight} in flight")]
    Busy { in_flight: u32 },

    #[error("operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("configuration error: {parameter}: {reason}")]
    Config { parameter: String, reason: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

pub type EsgResult<T> = Result<T, EsgError>;

impl EsgError {
    /// Stable wire discriminator for the error envelope's `error_kind`.
    pub fn error_kind(&self) -> &'static str {
        match self {
            EsgError::Validation { .. } => "validation",
            EsgError::AuthRequired => "auth_required",
            EsgError::TokenInvalid { .. } => "token_invalid",
            EsgError::NotFound { .. } => "not_found",
            EsgError::InsufficientCredits { .. } => "insufficient_credits",
            EsgError::RateLimited { .. } => "rate_limited",
            EsgError::Fetch { .. } => "fetch_failed",
            EsgError::Parse { .. } => "parse_failed",
            EsgError::CacheUnavailable { .. } => "cache_unavailable",
            EsgError::Database { .. } => "database",
            EsgError::Busy { .. } => "busy",
            EsgError::Timeout { .. } => "timeout",
            EsgError::Config { .. } => "config",
            EsgError::Internal { .. } => "internal",
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        EsgError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EsgError::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for EsgError {
    fn from(err: serde_json::Error) -> Self {
        EsgError::Internal {
            message: format!("serialization failure: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_are_stable() {
        let cases: Vec<(EsgError, &str)> = vec![
            (
                EsgError::Validation {
                    field: "f".into(),
                    message: "m".into(),
                },
                "validation",
            ),
            (EsgError::AuthRequired, "auth_required"),
            (
                EsgError::InsufficientCredits {
                    required: 5,
                    available: 0,
                },
                "insufficient_credits",
            ),
            (
                EsgError::RateLimited {
                    retry_after_secs: 60,
                    tier: Tier::Free,
                    limit: 20,
                },
                "rate_limited",
            ),
            (
                EsgError::Fetch {
                    reason: FetchFailure::Disallowed,
                    message: "private address".into(),
                },
                "fetch_failed",
            ),
            (EsgError::not_found("analysis"), "not_found"),
        ];
        for (err, kind) in cases {
            assert_eq!(err.error_kind(), kind);
        }
    }

    #[test]
    fn fetch_error_message_carries_sub_reason() {
        let err = EsgError::Fetch {
            reason: FetchFailure::TooLarge,
            message: "body over cap".into(),
        };
        assert!(err.to_string().contains("too_large"));
    }

    #[test]
    fn insufficient_credits_message() {
        let err = EsgError::InsufficientCredits {
            required: 7,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient credits: 7 required, 2 available"
        );
    }
}
