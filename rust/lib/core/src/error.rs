use std::collections::BTreeMap;
use std::fmt;

use axum::extract::OriginalUri;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these,
// never on log output.

/// Stable error code constants.
///
/// Every error body has the shape `{"error": "<CODE>", ...}`.
pub mod error_code {
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
    pub const INVALID_QUERY: &str = "INVALID_QUERY";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

// ── ValidationDetails ───────────────────────────────────────────────

/// Field-level breakdown of a validation failure.
///
/// ```json
/// {"formErrors": [], "fieldErrors": {"subject": ["Required"]}}
/// ```
///
/// `formErrors` holds problems with the payload as a whole (e.g. a body
/// that is not JSON); `fieldErrors` maps a field name to every message
/// raised against it, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDetails {
    pub form_errors: Vec<String>,
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationDetails {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a problem with the payload as a whole.
    pub fn form(&mut self, message: impl Into<String>) {
        self.form_errors.push(message.into());
    }

    /// Record a problem with a single field.
    pub fn field(&mut self, field: &str, message: impl Into<String>) {
        self.field_errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.form_errors.is_empty() && self.field_errors.is_empty()
    }

    /// Messages recorded against `field`, if any.
    pub fn field_messages(&self, field: &str) -> &[String] {
        self.field_errors
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl fmt::Display for ValidationDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.form_errors.clone();
        for (field, messages) in &self.field_errors {
            parts.push(format!("{field}: {}", messages.join(", ")));
        }
        f.write_str(&parts.join("; "))
    }
}

// ── ServiceError ────────────────────────────────────────────────────

/// Unified service error type.
///
/// Each variant maps to a stable error code (see [`error_code`]) and an
/// HTTP status code. Storage and internal failures are logged when they
/// are turned into a response and reach the caller only as
/// `{"error": "INTERNAL_ERROR"}`.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Request body failed validation. HTTP 400.
    #[error("invalid input: {0}")]
    InvalidInput(ValidationDetails),

    /// Query string failed validation. HTTP 400.
    #[error("invalid query: {0}")]
    InvalidQuery(ValidationDetails),

    /// No route matched the request path. HTTP 404.
    #[error("no route for {0}")]
    RouteNotFound(String),

    /// Storage backend failure. HTTP 500.
    #[error("storage: {0}")]
    Storage(String),

    /// Unexpected internal error. HTTP 500.
    #[error("internal: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => error_code::INVALID_INPUT,
            ServiceError::InvalidQuery(_) => error_code::INVALID_QUERY,
            ServiceError::RouteNotFound(_) => error_code::NOT_FOUND,
            ServiceError::Storage(_) | ServiceError::Internal(_) => error_code::INTERNAL_ERROR,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) | ServiceError::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Storage(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON body sent to the caller. Never includes internal detail.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ServiceError::InvalidInput(details) | ServiceError::InvalidQuery(details) => {
                serde_json::json!({
                    "error": self.error_code(),
                    "details": details,
                })
            }
            ServiceError::RouteNotFound(path) => serde_json::json!({
                "error": self.error_code(),
                "path": path,
            }),
            ServiceError::Storage(_) | ServiceError::Internal(_) => serde_json::json!({
                "error": self.error_code(),
            }),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "unhandled_error");
        }
        (status, axum::Json(self.body())).into_response()
    }
}

/// Fallback handler for unmatched routes and unsupported methods.
///
/// Uses the original URI so the reported path is the one the client sent,
/// even from inside a nested router.
pub async fn route_not_found(OriginalUri(uri): OriginalUri) -> ServiceError {
    ServiceError::RouteNotFound(uri.path().to_string())
}
