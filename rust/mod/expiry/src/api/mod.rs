mod expiry;

use std::sync::Arc;

use axum::Router;

use crate::service::SignalService;

/// Build the expiry module router.
///
/// Routes (nested under the module prefix, `/api`):
/// - `POST /expiry`         : upsert a record
/// - `POST /expiry/write`   : legacy alias of `POST /expiry`
/// - `GET  /expiry`         : read the signal
/// - `GET  /expiry/signal`  : legacy alias of `GET /expiry`
pub fn router(service: Arc<SignalService>) -> Router {
    expiry::router(service)
}
