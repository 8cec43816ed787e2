//! Outer request layers: CORS headers and panic containment.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use tracing::error;

use expirysignal_core::ServiceError;

const ALLOWED_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

// ── CORS ────────────────────────────────────────────────────────────

/// Cross-origin policy applied to every response.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    /// `None` allows any origin without credentials.
    origin: Option<HeaderValue>,
}

impl CorsPolicy {
    pub fn permissive() -> Self {
        Self { origin: None }
    }

    /// Restrict to a single origin, or allow any when `None`.
    pub fn new(origin: Option<HeaderValue>) -> Self {
        Self { origin }
    }

    fn apply(&self, headers: &mut HeaderMap) {
        match &self.origin {
            Some(origin) => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
                headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
                headers.append(VARY, HeaderValue::from_static("Origin"));
            }
            None => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            }
        }
    }

    /// Origin headers plus the allowed methods. Requested headers are
    /// reflected back when the client names any.
    fn apply_preflight(&self, headers: &mut HeaderMap, requested: Option<HeaderValue>) {
        self.apply(headers);
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
        if let Some(requested) = requested {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested);
            headers.append(VARY, HeaderValue::from_static("Access-Control-Request-Headers"));
        }
    }
}

/// Adds CORS headers. Every `OPTIONS` request is answered here with 204
/// and never reaches the router.
pub async fn cors(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        let requested = request.headers().get(ACCESS_CONTROL_REQUEST_HEADERS).cloned();
        let mut response = StatusCode::NO_CONTENT.into_response();
        policy.apply_preflight(response.headers_mut(), requested);
        return response;
    }

    let mut response = next.run(request).await;
    policy.apply(response.headers_mut());
    response
}

// ── Panic containment ───────────────────────────────────────────────

/// Turns a panicking handler into a generic 500 and logs every failed
/// request with its path.
pub async fn catch_panic(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            error!(%method, %path, panic = %panic_message(&*panic), "handler panicked");
            return ServiceError::Internal("handler panicked".into()).into_response();
        }
    };

    if response.status().is_server_error() {
        error!(%method, %path, status = %response.status(), "request failed");
    }
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
