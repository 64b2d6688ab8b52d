// src/error.rs
//! Error taxonomy shared by the upstream layer and the HTTP handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::Envelope;

/// Failures talking to an upstream service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Connection refused, timeout, DNS failure.
    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },

    #[error("invalid response body from {url}: {message}")]
    InvalidResponseBody { url: String, message: String },

    /// Upstream answered, but with a non-success status.
    #[error("upstream {url} rejected the request with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
}

impl UpstreamError {
    pub fn is_network(&self) -> bool {
        matches!(self, UpstreamError::Network { .. })
    }

    /// Short machine-readable tag, used in envelopes and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Network { .. } => "network_error",
            UpstreamError::InvalidResponseBody { .. } => "invalid_response_body",
            UpstreamError::Rejected { .. } => "upstream_rejected",
            UpstreamError::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// Write-path failure of `submit_review`. Same reasons as any upstream call;
/// kept as a separate name so the read and write policies stay distinct.
pub type SubmitError = UpstreamError;

/// Request-level outcomes that short-circuit a handler.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// Review submission got no usable answer from the backend.
    #[error("No response from backend")]
    SubmitFailed(#[source] SubmitError),

    /// Backend answered the submission without a success marker.
    #[error("Backend failed to post review")]
    UpstreamRejected { backend_response: serde_json::Value },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Status carried inside the JSON envelope.
    pub fn envelope_status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::FORBIDDEN,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::SubmitFailed(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::UpstreamRejected { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Status on the HTTP response line. Mirrors the envelope except when the
    /// backend itself refused a review.
    pub fn http_status(&self) -> StatusCode {
        match self {
            GatewayError::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
            other => other.envelope_status(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut envelope = Envelope::new(self.envelope_status())
            .field("message", self.to_string())
            .http_status(self.http_status());

        match self {
            GatewayError::SubmitFailed(reason) => {
                tracing::warn!(error = %reason, "review submission failed");
                envelope = envelope.field("reason", reason.kind());
            }
            GatewayError::UpstreamRejected { backend_response } => {
                envelope = envelope.field("backend_response", backend_response);
            }
            GatewayError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal error");
            }
            _ => {}
        }

        envelope.into_response()
    }
}
