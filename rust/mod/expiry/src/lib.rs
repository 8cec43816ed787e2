pub mod api;
pub mod model;
pub mod service;
pub mod store;
pub mod validate;

use std::sync::Arc;

use axum::Router;
use expirysignal_core::{Clock, Module, ServiceError};
use expirysignal_sql::SQLStore;

pub use model::{ExpiryRecord, ExpirySignal, Identity, Signal, WriteAck};
pub use service::SignalService;
pub use store::{MemorySignalStore, SignalStore, SqlSignalStore};

/// The Expiry module: stores expiry records and reports expiry signals.
///
/// Mount its routes under `/api` to get the write and read endpoints.
pub struct ExpiryModule {
    service: Arc<SignalService>,
}

impl ExpiryModule {
    /// Create the module over any signal store.
    pub fn new(store: Arc<dyn SignalStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service: Arc::new(SignalService::new(store, clock)),
        }
    }

    /// Create the module backed by a SQL database, initialising the schema.
    pub fn with_sql(db: Arc<dyn SQLStore>, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        let store = Arc::new(SqlSignalStore::new(db)?);
        Ok(Self::new(store, clock))
    }

    pub fn service(&self) -> &Arc<SignalService> {
        &self.service
    }
}

impl Module for ExpiryModule {
    fn name(&self) -> &str {
        "expiry"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }
}
