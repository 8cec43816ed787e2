//! Route registration: module routes, system endpoints and outer layers.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Router, middleware};

use expirysignal_core::{Module, TimeSource, route_not_found};

use crate::middleware::{CorsPolicy, catch_panic, cors};

/// Application shared state for system endpoints.
#[derive(Clone)]
pub struct AppState {
    pub time_source: TimeSource,
    pub cors: Arc<CorsPolicy>,
}

/// Build the complete router.
///
/// Each module's routes are nested under its prefix. Unknown paths and
/// unsupported methods both answer 404. Panics are caught inside the
/// CORS layer so even a 500 carries CORS headers.
pub fn build_router(state: AppState, modules: &[&dyn Module]) -> Router {
    let cors_policy = Arc::clone(&state.cors);

    let mut app: Router<()> = Router::new()
        .route("/health", get(health))
        .route("/health/", get(health))
        .with_state(state);

    for module in modules {
        app = app.nest(module.prefix(), module.routes());
    }

    app.fallback(route_not_found)
        .method_not_allowed_fallback(route_not_found)
        .layer(middleware::from_fn(catch_panic))
        .layer(middleware::from_fn_with_state(cors_policy, cors))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "ok": true,
        "service": "expirysignal",
        "time_source": state.time_source.as_str(),
    }))
}
