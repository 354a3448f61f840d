use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ErrorBody;

/// Failure categories surfaced by a campaign run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "rate_limited")]
    RateLimited,
    #[serde(rename = "quota_exhausted")]
    QuotaExhausted,
    #[serde(rename = "upstream_error")]
    Upstream,
    #[serde(rename = "empty_result")]
    EmptyResult,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::QuotaExhausted => StatusCode::PAYMENT_REQUIRED,
            ErrorKind::Upstream | ErrorKind::EmptyResult => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Maps an upstream HTTP status to an error kind. `None` means the call succeeded.
///
/// Every stage goes through this one function so a given status is classified
/// the same way no matter where it was seen.
pub fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        200..=299 => None,
        429 => Some(ErrorKind::RateLimited),
        402 => Some(ErrorKind::QuotaExhausted),
        _ => Some(ErrorKind::Upstream),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
    /// Upstream HTTP status, when the failure came from a response rather than the transport.
    pub upstream_status: Option<u16>,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), upstream_status: None }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyResult, message)
    }

    /// Builds the error for a non-success upstream status.
    pub fn from_status(status: u16) -> Self {
        let kind = classify_status(status).unwrap_or(ErrorKind::Upstream);
        let message = match kind {
            ErrorKind::RateLimited => "Rate limit exceeded. Please try again shortly.".to_string(),
            ErrorKind::QuotaExhausted => "AI credits exhausted. Please add credits in your workspace.".to_string(),
            _ => format!("AI gateway error: {status}"),
        };
        Self { kind, message, upstream_status: Some(status) }
    }

    /// Transport failures, timeouts and 5xx responses may clear up on their own.
    /// Everything else (429, 402, other 4xx, bad payloads) is final.
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Upstream && self.upstream_status.map_or(true, |s| s >= 500)
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.message, kind: self.kind, run_id: None };
        (self.kind.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_are_not_errors() {
        for status in [200, 201, 204, 299] {
            assert_eq!(classify_status(status), None);
        }
    }

    #[test]
    fn rate_limit_and_billing_have_their_own_kinds() {
        assert_eq!(classify_status(429), Some(ErrorKind::RateLimited));
        assert_eq!(classify_status(402), Some(ErrorKind::QuotaExhausted));
    }

    #[test]
    fn everything_else_is_an_upstream_error() {
        for status in [400, 401, 403, 404, 500, 502, 503, 504, 302] {
            assert_eq!(classify_status(status), Some(ErrorKind::Upstream), "status {status}");
        }
    }

    #[test]
    fn caller_status_codes() {
        assert_eq!(ErrorKind::Validation.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::RateLimited.status_code().as_u16(), 429);
        assert_eq!(ErrorKind::QuotaExhausted.status_code().as_u16(), 402);
        assert_eq!(ErrorKind::Upstream.status_code().as_u16(), 500);
        assert_eq!(ErrorKind::EmptyResult.status_code().as_u16(), 500);
    }

    #[test]
    fn upstream_message_carries_status() {
        let err = PipelineError::from_status(503);
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert!(err.message.contains("503"));
        assert_eq!(err.upstream_status, Some(503));
    }

    #[test]
    fn only_server_side_and_transport_failures_are_transient() {
        assert!(PipelineError::from_status(500).is_transient());
        assert!(PipelineError::from_status(503).is_transient());
        assert!(PipelineError::new(ErrorKind::Upstream, "connection reset").is_transient());
        assert!(!PipelineError::from_status(400).is_transient());
        assert!(!PipelineError::from_status(429).is_transient());
        assert!(!PipelineError::from_status(402).is_transient());
        assert!(!PipelineError::empty("no text").is_transient());
    }
}
