//! In-process instrument store

use crate::error::{StoreError, StoreResult};
use crate::store::{AdminPatch, InstrumentStore, PriceUpdate};
use async_trait::async_trait;
use common::{
    Instrument, InstrumentRow, NewInstrument, Px, Symbol, Trajectory, ValidationError, Version,
};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Instrument store held in memory
///
/// Versions come from one store-wide counter, so every accepted write
/// produces a version that was never issued before.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<FxHashMap<Symbol, Instrument>>,
    clock: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `instruments`
    ///
    /// Each instrument is stamped with a fresh version on the way in.
    #[must_use]
    pub fn from_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let store = Self::new();
        for instrument in instruments {
            store.insert(instrument);
        }
        store
    }

    /// Create a store from raw rows, rejecting the first malformed one
    ///
    /// Symbols are compared after normalization, so `abc` and `ABC` clash.
    ///
    /// # Errors
    /// `StoreError::Malformed` naming the offending row index
    pub fn from_rows(rows: impl IntoIterator<Item = InstrumentRow>) -> StoreResult<Self> {
        let mut seen = FxHashSet::default();
        let mut instruments = Vec::new();
        for (row, raw) in rows.into_iter().enumerate() {
            let instrument =
                Instrument::try_from(raw).map_err(|source| StoreError::Malformed { row, source })?;
            if !seen.insert(instrument.symbol.clone()) {
                return Err(StoreError::Malformed {
                    row,
                    source: ValidationError::DuplicateSymbol(instrument.symbol),
                });
            }
            instruments.push(instrument);
        }
        let store = Self::from_instruments(instruments);
        info!(instruments = store.len(), "Memory store seeded");
        Ok(store)
    }

    /// Create a store from a JSON array of rows
    ///
    /// # Errors
    /// `StoreError::Json` if the text is not an array of rows, or
    /// `StoreError::Malformed` if a row fails validation
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let rows: Vec<InstrumentRow> = serde_json::from_str(json)?;
        Self::from_rows(rows)
    }

    /// Insert or replace an instrument, stamping a fresh version
    pub fn insert(&self, mut instrument: Instrument) -> Version {
        let version = self.issue_version();
        instrument.version = version;
        self.rows.write().insert(instrument.symbol.clone(), instrument);
        version
    }

    /// Number of instruments
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// True when the store holds no instruments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn issue_version(&self) -> Version {
        Version(self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn modify<F>(&self, symbol: &Symbol, f: F) -> StoreResult<Instrument>
    where
        F: FnOnce(&mut Instrument),
    {
        let mut rows = self.rows.write();
        let instrument = rows.get_mut(symbol).ok_or_else(|| StoreError::NotFound {
            symbol: symbol.clone(),
        })?;
        f(instrument);
        instrument.version = self.issue_version();
        Ok(instrument.clone())
    }
}

#[async_trait]
impl InstrumentStore for MemoryStore {
    async fn list_instruments(&self) -> StoreResult<Vec<Instrument>> {
        let mut instruments: Vec<Instrument> = self.rows.read().values().cloned().collect();
        instruments.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(instruments)
    }

    async fn get(&self, symbol: &Symbol) -> StoreResult<Instrument> {
        self.rows
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                symbol: symbol.clone(),
            })
    }

    async fn conditional_update(
        &self,
        symbol: &Symbol,
        update: PriceUpdate,
        expected: Version,
    ) -> StoreResult<Option<Instrument>> {
        let mut rows = self.rows.write();
        let instrument = rows.get_mut(symbol).ok_or_else(|| StoreError::NotFound {
            symbol: symbol.clone(),
        })?;
        if instrument.version != expected {
            debug!(
                %symbol,
                %expected,
                actual = %instrument.version,
                "Conditional write lost to a newer version"
            );
            return Ok(None);
        }
        instrument.price = update.price;
        if update.clear_glide {
            instrument.glide = None;
        }
        instrument.version = self.issue_version();
        Ok(Some(instrument.clone()))
    }

    async fn admin_update(&self, symbol: &Symbol, patch: AdminPatch) -> StoreResult<Instrument> {
        self.modify(symbol, |instrument| patch.apply(instrument))
    }

    async fn nudge_price(&self, symbol: &Symbol, fraction: f64) -> StoreResult<Instrument> {
        if !fraction.is_finite() {
            return Err(StoreError::Rejected {
                symbol: symbol.clone(),
                reason: format!("nudge {fraction} is not a finite number"),
            });
        }
        self.modify(symbol, |instrument| {
            instrument.price = Px::new(instrument.price.as_f64() * (1.0 + fraction)).floored();
        })
    }

    async fn upsert(&self, new: NewInstrument) -> StoreResult<Instrument> {
        new.validate()?;
        let mut rows = self.rows.write();
        let version = self.issue_version();
        let instrument = rows
            .entry(new.symbol.clone())
            .and_modify(|existing| {
                existing.name.clone_from(&new.name);
                existing.price = new.price;
                existing.drift_base = new.drift_base;
                existing.volatility_base = new.volatility_base;
                existing.halted = false;
                existing.version = version;
            })
            .or_insert_with(|| Instrument {
                symbol: new.symbol.clone(),
                name: new.name.clone(),
                price: new.price,
                drift_base: new.drift_base,
                volatility_base: new.volatility_base,
                trajectory: Trajectory::Neutral,
                halted: false,
                version,
                glide: None,
            });
        Ok(instrument.clone())
    }
}
