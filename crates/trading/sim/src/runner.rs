//! Periodic tick scheduler

use crate::broadcaster::{Broadcaster, PriceTick};
use crate::engine::{TickEngine, TickReport};
use crate::error::SimResult;
use crate::random_walk::NoiseSource;
use bus::{Publisher, Subscriber};
use common::Ts;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use storage::InstrumentStore;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// Runner status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    /// Never started
    Idle,
    /// Ticking on schedule
    Running,
    /// Stopped; may be started again
    Stopped,
}

/// Drives a [`TickEngine`] on a fixed interval and publishes each batch
pub struct SimRunner<S, N, T> {
    engine: Arc<TickEngine<S, N>>,
    broadcaster: Arc<Broadcaster<S, T>>,
    interval: Duration,
    status: Arc<Mutex<RunnerStatus>>,
    shutdown: Arc<Notify>,
    ticks: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, N, T> SimRunner<S, N, T>
where
    S: InstrumentStore,
    N: NoiseSource + 'static,
    T: Publisher<PriceTick> + Subscriber<PriceTick> + 'static,
{
    /// Create a new runner
    #[must_use]
    pub fn new(
        engine: TickEngine<S, N>,
        broadcaster: Arc<Broadcaster<S, T>>,
        interval: Duration,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            broadcaster,
            interval,
            status: Arc::new(Mutex::new(RunnerStatus::Idle)),
            shutdown: Arc::new(Notify::new()),
            ticks: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Engine driven by this runner
    #[must_use]
    pub fn engine(&self) -> &TickEngine<S, N> {
        &self.engine
    }

    /// Broadcaster batches go out on
    #[must_use]
    pub const fn broadcaster(&self) -> &Arc<Broadcaster<S, T>> {
        &self.broadcaster
    }

    /// Start ticking: once immediately, then every interval
    ///
    /// A tick that overruns delays the next one rather than triggering a
    /// burst. Calling `start` while running does nothing.
    pub async fn start(&self) {
        {
            let mut status = self.status.lock().await;
            if *status == RunnerStatus::Running {
                return;
            }
            *status = RunnerStatus::Running;
        }

        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Starting price engine"
        );

        let engine = Arc::clone(&self.engine);
        let broadcaster = Arc::clone(&self.broadcaster);
        let shutdown = Arc::clone(&self.shutdown);
        let ticks = Arc::clone(&self.ticks);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.notified() => break,
                    _ = ticker.tick() => {
                        match run_tick(&engine, &broadcaster, Ts::now()).await {
                            Ok(_) => {
                                ticks.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => error!(error = %e, "Tick aborted, retrying next interval"),
                        }
                    }
                }
            }
        });

        *self.task.lock().await = Some(handle);
    }

    /// Stop ticking
    ///
    /// Waits for an in-flight tick to finish; no tick starts after this
    /// returns.
    pub async fn stop(&self) {
        {
            let mut status = self.status.lock().await;
            if *status != RunnerStatus::Running {
                return;
            }
            *status = RunnerStatus::Stopped;
        }

        self.shutdown.notify_one();
        let task = self.task.lock().await.take();
        if let Some(handle) = task {
            if let Err(e) = handle.await {
                error!(error = %e, "Tick loop terminated abnormally");
            }
        }
        info!(ticks = self.ticks_completed(), "Price engine stopped");
    }

    /// Get current status
    pub async fn status(&self) -> RunnerStatus {
        *self.status.lock().await
    }

    /// Ticks that ran to completion
    #[must_use]
    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Run one tick at `now` and publish its batch, outside the schedule
    ///
    /// # Errors
    /// `SimError::Read` if the listing cannot be read
    pub async fn tick_once(&self, now: Ts) -> SimResult<TickReport> {
        let report = run_tick(&self.engine, &self.broadcaster, now).await?;
        self.ticks.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }
}

/// Tick then publish; publish failures are logged since the writes already
/// landed and the subscriber poll will pick them up
async fn run_tick<S, N, T>(
    engine: &TickEngine<S, N>,
    broadcaster: &Broadcaster<S, T>,
    now: Ts,
) -> SimResult<TickReport>
where
    S: InstrumentStore,
    N: NoiseSource,
    T: Publisher<PriceTick> + Subscriber<PriceTick>,
{
    let report = engine.tick(now).await?;
    if let Err(e) = broadcaster.publish(&report.batch) {
        warn!(entries = report.batch.len(), error = %e, "Failed to publish tick batch");
    }
    Ok(report)
}
