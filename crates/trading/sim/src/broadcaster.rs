//! Batch fan-out with a polling safety net
//!
//! Subscribers get every published batch as one message, and independently
//! a full listing on a fixed interval so a missed or reordered publish heals
//! itself. A new subscriber gets no backlog; it seeds its view from
//! [`Broadcaster::snapshot`].

use crate::error::SimResult;
use bus::{BusError, Message, Publisher, Subscriber};
use common::{UpdateBatch, UpdateEntry};
use std::sync::Arc;
use std::time::Duration;
use storage::InstrumentStore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, trace, warn};

/// Wrapper for `UpdateBatch` to implement Message trait
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick(pub UpdateBatch);

impl Message for PriceTick {}

impl From<UpdateBatch> for PriceTick {
    fn from(batch: UpdateBatch) -> Self {
        Self(batch)
    }
}

impl PriceTick {
    /// Get the inner batch
    #[must_use]
    pub fn into_inner(self) -> UpdateBatch {
        self.0
    }
}

/// Publishes batches and runs subscriber delivery
pub struct Broadcaster<S, T> {
    store: Arc<S>,
    transport: T,
    poll_interval: Duration,
}

impl<S, T> Broadcaster<S, T>
where
    S: InstrumentStore,
    T: Publisher<PriceTick> + Subscriber<PriceTick>,
{
    /// Create a broadcaster publishing on `transport`
    #[must_use]
    pub const fn new(store: Arc<S>, transport: T, poll_interval: Duration) -> Self {
        Self {
            store,
            transport,
            poll_interval,
        }
    }

    /// Resync poll period
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Publish `batch` as a single message; an empty batch is not sent
    ///
    /// # Errors
    /// `SimError::Publish` if the transport refuses the message
    pub fn publish(&self, batch: &UpdateBatch) -> SimResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let receivers = self.transport.publish(PriceTick(batch.clone()))?;
        trace!(entries = batch.len(), receivers, "Batch published");
        Ok(receivers)
    }

    /// Full listing of every instrument, for seeding a new view
    ///
    /// # Errors
    /// `SimError::Store` if the listing cannot be read
    pub async fn snapshot(&self) -> SimResult<UpdateBatch> {
        let instruments = self.store.list_instruments().await?;
        Ok(instruments.iter().map(UpdateEntry::from).collect())
    }

    /// Deliver every published batch, and a full listing every poll
    /// interval, to `handler` until the returned [`Subscription`] is dropped
    ///
    /// Must be called from within a Tokio runtime. The subscription is live
    /// when this returns: any batch published afterwards reaches `handler`.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(UpdateBatch) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let mut rx = self.transport.subscribe();

        let push = tokio::spawn({
            let handler = Arc::clone(&handler);
            async move {
                loop {
                    match rx.recv().await {
                        Ok(PriceTick(batch)) => handler(batch),
                        Err(BusError::Lagged { skipped }) => {
                            warn!(skipped, "Subscriber lagged, next poll will resync");
                        }
                        Err(e) => {
                            debug!(error = %e, "Subscription stream ended");
                            break;
                        }
                    }
                }
            }
        });

        let store = Arc::clone(&self.store);
        let period = self.poll_interval;
        let poll = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.list_instruments().await {
                    Ok(instruments) => {
                        handler(instruments.iter().map(UpdateEntry::from).collect());
                    }
                    Err(e) => warn!(error = %e, "Resync poll failed, retrying next interval"),
                }
            }
        });

        Subscription { push, poll }
    }
}

/// Live subscription; dropping it stops delivery
#[derive(Debug)]
pub struct Subscription {
    push: JoinHandle<()>,
    poll: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivery
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// True while published batches are still being delivered
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.push.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.push.abort();
        self.poll.abort();
    }
}
