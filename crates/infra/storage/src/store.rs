//! The store interface the simulation engine runs against

use crate::error::StoreResult;
use async_trait::async_trait;
use common::{Glide, Instrument, NewInstrument, Px, Symbol, Trajectory, Version};

/// Price write produced by one engine tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceUpdate {
    /// New price
    pub price: Px,
    /// Drop the active glide in the same write (glide reached its end)
    pub clear_glide: bool,
}

impl PriceUpdate {
    /// Plain price move
    #[must_use]
    pub const fn price(price: Px) -> Self {
        Self {
            price,
            clear_glide: false,
        }
    }

    /// Final glide step: snap to `target` and clear the glide
    #[must_use]
    pub const fn finish_glide(target: Px) -> Self {
        Self {
            price: target,
            clear_glide: true,
        }
    }
}

/// Administrative field changes; `None` leaves a field untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminPatch {
    /// New frozen flag
    pub halted: Option<bool>,
    /// New trajectory
    pub trajectory: Option<Trajectory>,
    /// `Some(Some(_))` installs a glide, `Some(None)` clears it
    pub glide: Option<Option<Glide>>,
}

impl AdminPatch {
    /// Patch that only sets the halted flag
    #[must_use]
    pub const fn halted(halted: bool) -> Self {
        Self {
            halted: Some(halted),
            trajectory: None,
            glide: None,
        }
    }

    /// Patch that only sets the trajectory
    #[must_use]
    pub const fn trajectory(trajectory: Trajectory) -> Self {
        Self {
            halted: None,
            trajectory: Some(trajectory),
            glide: None,
        }
    }

    /// Patch that installs or clears a glide
    #[must_use]
    pub const fn glide(glide: Option<Glide>) -> Self {
        Self {
            halted: None,
            trajectory: None,
            glide: Some(glide),
        }
    }

    /// True when the patch changes nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.halted.is_none() && self.trajectory.is_none() && self.glide.is_none()
    }

    /// Apply the patch to an instrument in place
    pub fn apply(&self, instrument: &mut Instrument) {
        if let Some(halted) = self.halted {
            instrument.halted = halted;
        }
        if let Some(trajectory) = self.trajectory {
            instrument.trajectory = trajectory;
        }
        if let Some(glide) = self.glide {
            instrument.glide = glide;
        }
    }
}

/// Persistent instrument storage with optimistic concurrency
///
/// Every accepted write issues a new [`Version`] for the record. Only
/// [`InstrumentStore::conditional_update`] is guarded by the caller's
/// expected version; administrative writes apply unconditionally and rely on
/// the version bump to make any in-flight engine write for the same record
/// lose.
#[async_trait]
pub trait InstrumentStore: Send + Sync + 'static {
    /// All instruments, ordered by symbol
    async fn list_instruments(&self) -> StoreResult<Vec<Instrument>>;

    /// One instrument by symbol
    async fn get(&self, symbol: &Symbol) -> StoreResult<Instrument>;

    /// Apply `update` only if the stored version still equals `expected`
    ///
    /// Returns `Ok(None)` when another writer got there first.
    async fn conditional_update(
        &self,
        symbol: &Symbol,
        update: PriceUpdate,
        expected: Version,
    ) -> StoreResult<Option<Instrument>>;

    /// Apply an administrative patch unconditionally
    async fn admin_update(&self, symbol: &Symbol, patch: AdminPatch) -> StoreResult<Instrument>;

    /// Move the price by `fraction` (0.05 is +5%), rounded to cents and held
    /// at or above [`Px::FLOOR`]
    async fn nudge_price(&self, symbol: &Symbol, fraction: f64) -> StoreResult<Instrument>;

    /// Create an instrument, or overwrite name, price and parameters of an
    /// existing one (which is also resumed if halted)
    async fn upsert(&self, instrument: NewInstrument) -> StoreResult<Instrument>;
}
