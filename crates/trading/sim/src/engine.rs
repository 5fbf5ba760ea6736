//! One simulation step across all instruments

use crate::config::EngineParams;
use crate::error::{SimError, SimResult};
use crate::glide::position_at;
use crate::random_walk::NoiseSource;
use crate::writer::{ConditionalWriter, WriteOutcome};
use common::{Instrument, InstrumentMode, Px, Ts, UpdateBatch, UpdateEntry};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use storage::{InstrumentStore, PriceUpdate};
use tracing::{debug, warn};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Accepted writes, ready to publish
    pub batch: UpdateBatch,
    /// Writes dropped because the record changed after it was read
    pub conflicts: usize,
    /// Writes the store refused for other reasons
    pub failures: usize,
    /// Instruments skipped because they are halted
    pub halted: usize,
}

/// Next price for one instrument, or `None` if it is halted
///
/// Normal mode applies drift, trajectory bias and scaled Gaussian noise, then
/// clamps the move to `max_step` in whole cents. Gliding instruments follow
/// the glide curve with no step cap; a finished glide snaps to its target
/// and is cleared in the same write.
pub fn next_price<N: NoiseSource + ?Sized>(
    instrument: &Instrument,
    now: Ts,
    params: &EngineParams,
    noise: &mut N,
) -> Option<PriceUpdate> {
    match (instrument.mode(), instrument.glide.as_ref()) {
        (InstrumentMode::Halted, _) => None,
        (InstrumentMode::Gliding, Some(glide)) => {
            let jitter = if params.glide_jitter > 0.0 {
                let std_dev = params.noise_std_dev(instrument.volatility_base)
                    * params.noise_mult
                    * params.glide_jitter;
                noise.sample(0.0, std_dev)
            } else {
                0.0
            };
            let position = position_at(glide, now, instrument.price, jitter);
            Some(if position.done {
                PriceUpdate::finish_glide(position.price)
            } else {
                PriceUpdate::price(position.price)
            })
        }
        _ => Some(PriceUpdate::price(random_step(instrument, params, noise))),
    }
}

fn random_step<N: NoiseSource + ?Sized>(
    instrument: &Instrument,
    params: &EngineParams,
    noise: &mut N,
) -> Px {
    let last = instrument.price.as_f64();
    let shock =
        noise.sample(0.0, params.noise_std_dev(instrument.volatility_base)) * params.noise_mult;
    let change = instrument.drift_base + instrument.trajectory.sign() * params.bias_pct + shock;

    let upper = Px::round_down(last * (1.0 + params.max_step));
    let lower = Px::round_up(last * (1.0 - params.max_step));
    Px::new(last * (1.0 + change))
        .max(lower)
        .min(upper)
        .floored()
}

/// Reads every instrument, computes its next price and writes it back under
/// optimistic concurrency
pub struct TickEngine<S, N> {
    store: Arc<S>,
    writer: ConditionalWriter<S>,
    params: EngineParams,
    noise: Mutex<N>,
}

impl<S: InstrumentStore, N: NoiseSource> TickEngine<S, N> {
    /// Create a new engine
    #[must_use]
    pub fn new(store: Arc<S>, params: EngineParams, noise: N) -> Self {
        Self {
            writer: ConditionalWriter::new(Arc::clone(&store)),
            store,
            params,
            noise: Mutex::new(noise),
        }
    }

    /// Model tuning in use
    #[must_use]
    pub const fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Store the engine reads from and writes to
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one tick at `now`
    ///
    /// Instruments are written concurrently. Conflicts and per-instrument
    /// write failures are counted in the report and leave the instrument out
    /// of the batch without affecting the others.
    ///
    /// # Errors
    /// `SimError::Read` if the listing cannot be read; nothing is written.
    pub async fn tick(&self, now: Ts) -> SimResult<TickReport> {
        let instruments = self
            .store
            .list_instruments()
            .await
            .map_err(SimError::Read)?;

        let mut report = TickReport::default();
        let planned: Vec<(&Instrument, PriceUpdate)> = {
            let mut noise = self.noise.lock();
            instruments
                .iter()
                .filter_map(|instrument| {
                    let update = next_price(instrument, now, &self.params, &mut *noise);
                    if update.is_none() {
                        report.halted += 1;
                    }
                    update.map(|update| (instrument, update))
                })
                .collect()
        };

        let writes = planned.into_iter().map(|(instrument, update)| async move {
            let outcome = self
                .writer
                .write(&instrument.symbol, update, instrument.version)
                .await;
            (instrument, outcome)
        });

        for (instrument, outcome) in join_all(writes).await {
            match outcome {
                Ok(WriteOutcome::Accepted(written)) => {
                    report.batch.push(UpdateEntry::from(&written));
                }
                Ok(WriteOutcome::Conflict) => report.conflicts += 1,
                Err(e) => {
                    report.failures += 1;
                    warn!(symbol = %instrument.symbol, error = %e, "Price write failed");
                }
            }
        }

        debug!(
            updated = report.batch.len(),
            conflicts = report.conflicts,
            failures = report.failures,
            halted = report.halted,
            "Tick complete"
        );
        Ok(report)
    }
}
