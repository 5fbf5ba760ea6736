//! Operator controls acting on instruments outside the tick cycle
//!
//! These writes skip the version check; each one issues a new version, so a
//! tick that read the record earlier loses its conditional write and the
//! operator's change survives until the next tick reads it.

use crate::broadcaster::{Broadcaster, PriceTick};
use crate::error::{SimError, SimResult};
use bus::{Publisher, Subscriber};
use common::{
    Glide, Instrument, NewInstrument, Px, Symbol, Trajectory, Ts, UpdateBatch, UpdateEntry,
};
use std::sync::Arc;
use std::time::Duration;
use storage::{AdminPatch, InstrumentStore};
use tracing::{info, warn};

/// Administrative surface over the store and broadcaster
pub struct AdminControls<S, T> {
    store: Arc<S>,
    broadcaster: Arc<Broadcaster<S, T>>,
}

impl<S, T> AdminControls<S, T>
where
    S: InstrumentStore,
    T: Publisher<PriceTick> + Subscriber<PriceTick>,
{
    /// Create controls over `store`, announcing changes through `broadcaster`
    #[must_use]
    pub const fn new(store: Arc<S>, broadcaster: Arc<Broadcaster<S, T>>) -> Self {
        Self { store, broadcaster }
    }

    /// Glide from the current price to `target` over `duration` from `now`
    ///
    /// Allowed while halted; the glide starts moving once resumed.
    ///
    /// # Errors
    /// `SimError::InvalidTarget` for a zero duration or a target below the
    /// price floor, `SimError::Store` if the instrument cannot be read or
    /// written
    pub async fn set_target(
        &self,
        symbol: &Symbol,
        target: Px,
        duration: Duration,
        now: Ts,
    ) -> SimResult<Instrument> {
        if duration.is_zero() {
            return Err(SimError::InvalidTarget {
                symbol: symbol.clone(),
                reason: "duration must be positive".to_string(),
            });
        }
        let current = self.store.get(symbol).await?;
        let glide = Glide::new(current.price, target, now, now.after(duration)).map_err(|e| {
            SimError::InvalidTarget {
                symbol: symbol.clone(),
                reason: e.to_string(),
            }
        })?;
        let updated = self
            .store
            .admin_update(symbol, AdminPatch::glide(Some(glide)))
            .await?;
        info!(
            %symbol,
            from = %current.price,
            %target,
            secs = duration.as_secs(),
            "Target set"
        );
        Ok(updated)
    }

    /// Drop the active glide without moving the price
    ///
    /// # Errors
    /// `SimError::Store` if the instrument cannot be written
    pub async fn clear_target(&self, symbol: &Symbol) -> SimResult<Instrument> {
        let updated = self
            .store
            .admin_update(symbol, AdminPatch::glide(None))
            .await?;
        info!(%symbol, "Target cleared");
        Ok(updated)
    }

    /// Halt or resume; announced immediately
    ///
    /// # Errors
    /// `SimError::Store` if the instrument cannot be written
    pub async fn set_halted(&self, symbol: &Symbol, halted: bool) -> SimResult<Instrument> {
        let updated = self
            .store
            .admin_update(symbol, AdminPatch::halted(halted))
            .await?;
        info!(%symbol, halted, "Halt state changed");
        self.announce(&updated);
        Ok(updated)
    }

    /// Change the directional bias
    ///
    /// # Errors
    /// `SimError::Store` if the instrument cannot be written
    pub async fn set_trajectory(
        &self,
        symbol: &Symbol,
        trajectory: Trajectory,
    ) -> SimResult<Instrument> {
        let updated = self
            .store
            .admin_update(symbol, AdminPatch::trajectory(trajectory))
            .await?;
        info!(%symbol, %trajectory, "Trajectory changed");
        Ok(updated)
    }

    /// Multiply the price by `1 + fraction` now and announce it
    ///
    /// # Errors
    /// `SimError::InvalidNudge` for a zero or non-finite fraction,
    /// `SimError::Store` if the instrument cannot be written
    pub async fn nudge_percent(&self, symbol: &Symbol, fraction: f64) -> SimResult<Instrument> {
        if !fraction.is_finite() || fraction == 0.0 {
            return Err(SimError::InvalidNudge {
                symbol: symbol.clone(),
                reason: format!("{fraction} is not a usable fraction"),
            });
        }
        let updated = self.store.nudge_price(symbol, fraction).await?;
        info!(%symbol, fraction, price = %updated.price, "Price nudged");
        self.announce(&updated);
        Ok(updated)
    }

    /// Create or edit an instrument and announce it
    ///
    /// # Errors
    /// `SimError::Store` if the record is invalid or cannot be written
    pub async fn upsert_instrument(&self, instrument: NewInstrument) -> SimResult<Instrument> {
        let updated = self.store.upsert(instrument).await?;
        info!(symbol = %updated.symbol, price = %updated.price, "Instrument saved");
        self.announce(&updated);
        Ok(updated)
    }

    fn announce(&self, instrument: &Instrument) {
        let batch: UpdateBatch = std::iter::once(UpdateEntry::from(instrument)).collect();
        if let Err(e) = self.broadcaster.publish(&batch) {
            warn!(symbol = %instrument.symbol, error = %e, "Failed to announce change");
        }
    }
}
