use axum::Router;

/// A service module that contributes HTTP routes.
///
/// The binary entry point collects modules and nests each one's routes
/// under its [`prefix`](Module::prefix).
pub trait Module: Send + Sync {
    /// Module name, used for logging.
    fn name(&self) -> &str;

    /// Path prefix the routes are nested under.
    fn prefix(&self) -> &str {
        "/api"
    }

    fn routes(&self) -> Router;
}
