use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use expirysignal_core::{ServiceError, ValidationDetails, route_not_found};

use crate::model::{ExpirySignal, WriteAck};
use crate::service::SignalService;
use crate::validate::ReadQuery;

type ServiceState = Arc<SignalService>;

/// Every path also answers with a trailing slash.
pub fn router(service: Arc<SignalService>) -> Router {
    Router::new()
        .route("/expiry", post(write_expiry).get(read_expiry))
        .route("/expiry/", post(write_expiry).get(read_expiry))
        .route("/expiry/write", post(write_expiry))
        .route("/expiry/write/", post(write_expiry))
        .route("/expiry/signal", get(read_expiry))
        .route("/expiry/signal/", get(read_expiry))
        .method_not_allowed_fallback(route_not_found)
        .with_state(service)
}

// ---------------------------------------------------------------------------
// POST /expiry, POST /expiry/write
// ---------------------------------------------------------------------------

async fn write_expiry(
    State(service): State<ServiceState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<WriteAck>, ServiceError> {
    let Json(raw) = body.map_err(|rejection| {
        let mut details = ValidationDetails::new();
        details.form(rejection.body_text());
        ServiceError::InvalidInput(details)
    })?;
    Ok(Json(service.write(&raw)?))
}

// ---------------------------------------------------------------------------
// GET /expiry, GET /expiry/signal
// ---------------------------------------------------------------------------

async fn read_expiry(
    State(service): State<ServiceState>,
    query: Result<Query<ReadQuery>, QueryRejection>,
) -> Result<Json<ExpirySignal>, ServiceError> {
    let Query(query) = query.map_err(|rejection| {
        let mut details = ValidationDetails::new();
        details.form(rejection.body_text());
        ServiceError::InvalidQuery(details)
    })?;
    Ok(Json(service.read(&query)?))
}
