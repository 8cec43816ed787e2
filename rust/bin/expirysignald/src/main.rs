//! `expirysignald`: the expiry signal server binary.
//!
//! Usage:
//!   expirysignald --database-url sqlite://./expiry.db [--port 4004]
//!
//! Every flag can also be set through the environment (`DATABASE_URL`,
//! `PORT`, `HOST`, `CORS_ORIGIN`, `TIME_SOURCE`) or a `.env` file in the
//! working directory.

mod bootstrap;
mod middleware;
mod routes;

use std::sync::Arc;

use clap::Parser;
use expiry::ExpiryModule;
use expirysignal_core::{DEFAULT_PORT, Module, ServiceConfig, TimeSource};
use tracing::info;

use middleware::CorsPolicy;
use routes::AppState;

/// Expiry signal server.
#[derive(Parser, Debug)]
#[command(name = "expirysignald", about = "Expiry signal server")]
struct Cli {
    /// Storage connection string (sqlite://PATH, sqlite::memory:, memory:).
    #[arg(long = "database-url", env = "DATABASE_URL", default_value = "")]
    database_url: String,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Listen host.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Allowed CORS origin. Any origin is allowed when unset.
    #[arg(long = "cors-origin", env = "CORS_ORIGIN")]
    cors_origin: Option<String>,

    /// Source of the current time.
    #[arg(long = "time-source", env = "TIME_SOURCE", default_value = "system")]
    time_source: TimeSource,
}

impl Cli {
    fn into_config(self) -> ServiceConfig {
        ServiceConfig {
            database_url: self.database_url,
            host: self.host,
            port: self.port,
            cors_origin: self.cors_origin.filter(|o| !o.trim().is_empty()),
            time_source: self.time_source,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Cli::parse().into_config();
    bootstrap::verify_config(&config)?;
    let cors_policy = CorsPolicy::new(config.cors_header()?);

    // Initialize storage.
    let store = bootstrap::open_store(&config)?;
    let expiry_module = ExpiryModule::new(store, config.time_source.clock());
    info!("{} module initialized", expiry_module.name());

    let state = AppState {
        time_source: config.time_source,
        cors: Arc::new(cors_policy),
    };
    let app = routes::build_router(state, &[&expiry_module]);

    // Start server.
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        cors_origin = config.cors_origin_label(),
        time_source = %config.time_source,
        "Expiry signal server listening on {}",
        addr
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
