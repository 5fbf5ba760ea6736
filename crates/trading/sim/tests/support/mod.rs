//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bus::{Bus, BusError, BusResult, Publisher, Receiver, Subscriber, Topic};
use common::{Instrument, NewInstrument, Px, Symbol, Trajectory, Version};
use parking_lot::Mutex;
use sim::PriceTick;
use std::sync::atomic::{AtomicBool, Ordering};
use storage::{
    AdminPatch, InstrumentStore, MemoryStore, PriceUpdate, StoreError, StoreResult,
};

/// Instrument with explicit walk parameters
pub fn instrument(symbol: &str, price: f64, vol: f64) -> Instrument {
    Instrument {
        symbol: Symbol::new(symbol),
        name: format!("{symbol} Ltd"),
        price: Px::new(price),
        drift_base: 0.0,
        volatility_base: vol,
        trajectory: Trajectory::Neutral,
        halted: false,
        version: Version::INITIAL,
        glide: None,
    }
}

/// Memory store with injectable faults
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes_for: Mutex<Option<Symbol>>,
    race_before_write: Mutex<Option<(Symbol, f64)>>,
}

impl FlakyStore {
    pub fn with(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        Self {
            inner: MemoryStore::from_instruments(instruments),
            ..Self::default()
        }
    }

    /// Make every listing fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make conditional writes for `symbol` fail
    pub fn fail_writes_for(&self, symbol: &str) {
        *self.fail_writes_for.lock() = Some(Symbol::new(symbol));
    }

    /// Apply an operator nudge to `symbol` just before the engine's write
    /// for it lands
    pub fn race_nudge_before_write(&self, symbol: &str, fraction: f64) {
        *self.race_before_write.lock() = Some((Symbol::new(symbol), fraction));
    }
}

#[async_trait]
impl InstrumentStore for FlakyStore {
    async fn list_instruments(&self) -> StoreResult<Vec<Instrument>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.list_instruments().await
    }

    async fn get(&self, symbol: &Symbol) -> StoreResult<Instrument> {
        self.inner.get(symbol).await
    }

    async fn conditional_update(
        &self,
        symbol: &Symbol,
        update: PriceUpdate,
        expected: Version,
    ) -> StoreResult<Option<Instrument>> {
        if self.fail_writes_for.lock().as_ref() == Some(symbol) {
            return Err(StoreError::Rejected {
                symbol: symbol.clone(),
                reason: "row locked".into(),
            });
        }
        let race = self
            .race_before_write
            .lock()
            .take_if(|(racing, _)| racing == symbol);
        if let Some((_, fraction)) = race {
            self.inner.nudge_price(symbol, fraction).await?;
        }
        self.inner.conditional_update(symbol, update, expected).await
    }

    async fn admin_update(&self, symbol: &Symbol, patch: AdminPatch) -> StoreResult<Instrument> {
        self.inner.admin_update(symbol, patch).await
    }

    async fn nudge_price(&self, symbol: &Symbol, fraction: f64) -> StoreResult<Instrument> {
        self.inner.nudge_price(symbol, fraction).await
    }

    async fn upsert(&self, instrument: NewInstrument) -> StoreResult<Instrument> {
        self.inner.upsert(instrument).await
    }
}

/// Transport whose publishes always fail; subscriptions still work
#[derive(Clone)]
pub struct OfflineTransport {
    topic: Topic<PriceTick>,
}

impl OfflineTransport {
    pub fn new() -> Self {
        Self {
            topic: Bus::new(16).topic("prices"),
        }
    }
}

impl Publisher<PriceTick> for OfflineTransport {
    fn publish(&self, _msg: PriceTick) -> BusResult<usize> {
        Err(BusError::Rejected("transport offline".into()))
    }
}

impl Subscriber<PriceTick> for OfflineTransport {
    fn subscribe(&self) -> Receiver<PriceTick> {
        self.topic.subscribe()
    }
}
