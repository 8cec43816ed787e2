use std::sync::Arc;

use expirysignal_core::{Clock, ServiceError};
use tracing::debug;

use crate::model::{ExpirySignal, WriteAck};
use crate::store::SignalStore;
use crate::validate::{NormalizedWrite, ReadQuery};

/// Turns requests into store calls and store results into signals.
///
/// Holds no mutable state of its own. The store handle is owned for the
/// service's lifetime and shared by all requests.
pub struct SignalService {
    store: Arc<dyn SignalStore>,
    clock: Arc<dyn Clock>,
}

impl SignalService {
    pub fn new(store: Arc<dyn SignalStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Normalise, validate and upsert a raw write body.
    ///
    /// Validation failures return `InvalidInput` before the store is
    /// touched. Storage failures are returned as-is; nothing is retried.
    pub fn write(&self, raw: &serde_json::Value) -> Result<WriteAck, ServiceError> {
        let upsert = NormalizedWrite::from_json(raw)
            .validate()
            .map_err(ServiceError::InvalidInput)?;

        let now = self.clock.now();
        let record = self.store.upsert(&upsert, now)?;
        debug!(
            subject = %record.subject,
            scope = ?record.scope,
            expires_at = %record.expires_at,
            "expiry record stored"
        );

        Ok(WriteAck::applied(&record, now))
    }

    /// Report the signal for one identity at the reference instant.
    pub fn read(&self, query: &ReadQuery) -> Result<ExpirySignal, ServiceError> {
        let request = query.validate().map_err(ServiceError::InvalidQuery)?;
        let reference = request.now.unwrap_or_else(|| self.clock.now());

        Ok(match self.store.lookup(&request.identity)? {
            None => ExpirySignal::no_record(request.identity, reference),
            Some(record) => ExpirySignal::evaluate(&record, reference),
        })
    }
}
