//! Version-guarded price writes

use common::{Instrument, Symbol, Version};
use std::sync::Arc;
use storage::{InstrumentStore, PriceUpdate, StoreResult};
use tracing::debug;

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The write landed; carries the stored record with its new version
    Accepted(Instrument),
    /// Another writer changed the record after it was read
    Conflict,
}

impl WriteOutcome {
    /// True if the write landed
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Writes a tick's price only if the record is unchanged since it was read
pub struct ConditionalWriter<S> {
    store: Arc<S>,
}

impl<S> Clone for ConditionalWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: InstrumentStore> ConditionalWriter<S> {
    /// Create a writer over `store`
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Apply `update` if the stored version still equals `expected`
    ///
    /// A conflict leaves the record untouched and is not an error.
    ///
    /// # Errors
    /// Propagates store failures other than a version mismatch.
    pub async fn write(
        &self,
        symbol: &Symbol,
        update: PriceUpdate,
        expected: Version,
    ) -> StoreResult<WriteOutcome> {
        match self
            .store
            .conditional_update(symbol, update, expected)
            .await?
        {
            Some(instrument) => Ok(WriteOutcome::Accepted(instrument)),
            None => {
                debug!(%symbol, %expected, "Write skipped, record changed since read");
                Ok(WriteOutcome::Conflict)
            }
        }
    }
}
