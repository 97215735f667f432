use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Error kinds surfaced at the HTTP boundary, per the error-handling table.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("too many builds in flight")]
    TooManyBuilds,

    #[error("not ready: build in progress")]
    NotReady,

    #[error("receiver unreachable: {0}")]
    ReceiverUnreachable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyBuilds => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ReceiverUnreachable(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Per the documented S1/S5 scenarios, a build-in-progress poll always
    /// retries at a fixed 5s interval.
    fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::TooManyBuilds => Some(30),
            AppError::NotReady => Some(5),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after();
        let body = ErrorBody {
            error: match &self {
                AppError::InvalidInput(_) => "invalid_input",
                AppError::Unauthorized => "unauthorized",
                AppError::NotFound(_) => "not_found",
                AppError::TooManyBuilds => "too_many_builds",
                AppError::NotReady => "not_ready",
                AppError::ReceiverUnreachable(_) => "receiver_unreachable",
                AppError::Internal(_) => "internal_error",
            }
            .to_string(),
            message: self.to_string(),
        };
        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_str(&secs.to_string()).unwrap(),
            );
        }
        response
    }
}

/// Failure kinds classified from a build's exit (§4.6). Distinct from
/// `AppError` because not every kind maps 1:1 to an HTTP status and because
/// the recovery policy (§7) needs to match on these directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFailureKind {
    NonMonotonousDts,
    InvalidDuration,
    TimestampUnset,
    ProbeFailed,
    SourceUnavailable,
    Stalled,
    Canceled,
    FfmpegFatal,
}

impl BuildFailureKind {
    /// Whether the recovery policy in §7 allows one retry for this kind.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            BuildFailureKind::ProbeFailed
                | BuildFailureKind::NonMonotonousDts
                | BuildFailureKind::TimestampUnset
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildFailureKind::NonMonotonousDts => "NonMonotonousDTS",
            BuildFailureKind::InvalidDuration => "InvalidDuration",
            BuildFailureKind::TimestampUnset => "TimestampUnset",
            BuildFailureKind::ProbeFailed => "ProbeFailed",
            BuildFailureKind::SourceUnavailable => "SourceUnavailable",
            BuildFailureKind::Stalled => "Stalled",
            BuildFailureKind::Canceled => "Canceled",
            BuildFailureKind::FfmpegFatal => "FFmpegFatal",
        }
    }
}

impl std::fmt::Display for BuildFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
