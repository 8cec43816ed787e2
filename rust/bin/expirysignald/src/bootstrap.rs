//! Bootstrap: configuration checks and storage initialisation.

use std::sync::Arc;

use expiry::{MemorySignalStore, SignalStore, SqlSignalStore};
use expirysignal_core::{ServiceConfig, StorageTarget};
use expirysignal_sql::{SQLStore, SqliteStore};
use tracing::{info, warn};

/// Verify the configuration before anything is opened or bound.
pub fn verify_config(config: &ServiceConfig) -> anyhow::Result<()> {
    config.validate().map_err(|e| {
        anyhow::anyhow!("{e}\nSet DATABASE_URL (or pass --database-url), e.g. sqlite://./expiry.db")
    })
}

/// Open the signal store the database URL points at.
pub fn open_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn SignalStore>> {
    let target = config.storage_target()?;

    let db: Arc<dyn SQLStore> = match &target {
        StorageTarget::Memory => {
            warn!("using in-memory store; records are lost on restart");
            return Ok(Arc::new(MemorySignalStore::new()));
        }
        StorageTarget::SqliteInMemory => {
            warn!("using in-memory SQLite; records are lost on restart");
            Arc::new(
                SqliteStore::open_in_memory()
                    .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
            )
        }
        StorageTarget::Sqlite(path) => {
            info!("Opening SQLite database at {}", path.display());
            Arc::new(
                SqliteStore::open(path)
                    .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
            )
        }
    };

    let store = SqlSignalStore::new(db)
        .map_err(|e| anyhow::anyhow!("failed to initialise expiry schema: {}", e))?;
    Ok(Arc::new(store))
}
