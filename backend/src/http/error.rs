//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::FederationError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// No route matches the request path
    NotFound(String),
    /// Fault raised by the federation layer
    Federation(FederationError),
}

/// Status and error code for a federation fault.
pub fn status_of(err: &FederationError) -> (StatusCode, &'static str) {
    match err {
        FederationError::InvalidQueryParameter { .. } => {
            (StatusCode::BAD_REQUEST, "INVALID_QUERY_PARAMETER")
        }
        FederationError::UnknownRelease { .. } => (StatusCode::NOT_FOUND, "UNKNOWN_RELEASE"),
        FederationError::MalformedCoordinate { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "MALFORMED_COORDINATE")
        }
        FederationError::InternalInconsistency { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_INCONSISTENCY")
        }
        FederationError::BackendUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE")
        }
        FederationError::QueryError { .. } => (StatusCode::BAD_GATEWAY, "QUERY_ERROR"),
        FederationError::TimeoutError { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
        FederationError::ConfigurationError { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::Federation(err) => {
                let (status, code) = status_of(&err);
                if status.is_server_error() {
                    tracing::error!(code, error = %err, "request failed");
                } else {
                    tracing::debug!(code, error = %err, "request rejected");
                }
                let mut body = ApiError::new(code, err.to_string());
                // Client errors carry no backend internals.
                if status.is_server_error() {
                    if let Some(details) = err.context().details.clone() {
                        body = body.with_details(details);
                    }
                }
                (status, body)
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<FederationError> for AppError {
    fn from(err: FederationError) -> Self {
        AppError::Federation(err)
    }
}
