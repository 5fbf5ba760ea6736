//! Engine configuration
//!
//! Defaults reproduce the production tuning. Values can be overridden from a
//! TOML file and from `PRICE_ENGINE__*` environment variables, e.g.
//! `PRICE_ENGINE__TICK_INTERVAL_MS=5000` or `PRICE_ENGINE__ENGINE__MAX_STEP=0.002`.

use crate::error::SimResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PRICE_ENGINE";

/// Shortest tick interval the scheduler accepts, in milliseconds
pub const MIN_TICK_INTERVAL_MS: u64 = 2_000;

/// Shortest tick interval the scheduler accepts
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(MIN_TICK_INTERVAL_MS);

/// Tuning of the per-tick price model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// Multiplier turning an instrument's volatility into a noise std-dev
    pub vol_scale: f64,
    /// Multiplier applied to each noise sample
    pub noise_mult: f64,
    /// Largest fractional move allowed in one normal-mode tick
    pub max_step: f64,
    /// Per-tick bias magnitude for `UP` / `DOWN` trajectories
    pub bias_pct: f64,
    /// Secondary jitter while gliding, as a fraction of normal-mode noise
    pub glide_jitter: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            vol_scale: 0.02,
            noise_mult: 0.12,
            max_step: 0.0015,
            bias_pct: 0.0006,
            glide_jitter: 0.0,
        }
    }
}

impl EngineParams {
    /// Normal-mode noise std-dev for an instrument volatility
    #[must_use]
    pub fn noise_std_dev(&self, volatility: f64) -> f64 {
        volatility * self.vol_scale
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Scheduler period in milliseconds
    pub tick_interval_ms: u64,
    /// Subscriber resync poll period in milliseconds
    pub poll_interval_ms: u64,
    /// Transport topic batches are published on
    pub topic: String,
    /// Per-topic broadcast buffer
    pub channel_capacity: usize,
    /// Price model tuning
    pub engine: EngineParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 3_000,
            poll_interval_ms: 5_000,
            topic: "prices".to_string(),
            channel_capacity: 1024,
            engine: EngineParams::default(),
        }
    }
}

impl SimConfig {
    /// Load configuration from an optional file plus environment overrides
    ///
    /// # Errors
    /// Returns `SimError::Config` if the file cannot be read or a value has
    /// the wrong type.
    pub fn load(path: Option<&Path>) -> SimResult<Self> {
        Self::load_from(path, None)
    }

    /// `env` replaces the process environment when given
    fn load_from(path: Option<&Path>, env: Option<config::Map<String, String>>) -> SimResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Tick period, raised to [`MIN_TICK_INTERVAL`] if configured lower
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        let configured = Duration::from_millis(self.tick_interval_ms);
        if configured < MIN_TICK_INTERVAL {
            warn!(
                configured_ms = self.tick_interval_ms,
                min_ms = MIN_TICK_INTERVAL_MS,
                "Tick interval below minimum, clamping"
            );
            MIN_TICK_INTERVAL
        } else {
            configured
        }
    }

    /// Resync poll period (at least one millisecond)
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(3));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.topic, "prices");
        assert!((config.engine.max_step - 0.0015).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(500, 2_000)]
    #[case(1_999, 2_000)]
    #[case(2_000, 2_000)]
    #[case(10_000, 10_000)]
    fn test_tick_interval_floor(#[case] configured: u64, #[case] effective: u64) {
        let config = SimConfig {
            tick_interval_ms: configured,
            ..SimConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(effective));
    }

    #[test]
    fn test_load_from_file_keeps_unset_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            "tick_interval_ms = 4000\ntopic = \"quotes\"\n\n[engine]\nmax_step = 0.002"
        )?;

        let config = SimConfig::load(Some(file.path()))?;
        assert_eq!(config.tick_interval_ms, 4_000);
        assert_eq!(config.topic, "quotes");
        assert_eq!(config.poll_interval_ms, 5_000);
        assert!((config.engine.max_step - 0.002).abs() < f64::EPSILON);
        assert!((config.engine.noise_mult - 0.12).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_env_overrides_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "tick_interval_ms = 4000\n\n[engine]\nmax_step = 0.002")?;

        let env: config::Map<String, String> = [
            ("PRICE_ENGINE__TICK_INTERVAL_MS", "4500"),
            ("PRICE_ENGINE__ENGINE__MAX_STEP", "0.003"),
            ("OTHER_APP__TOPIC", "ignored"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = SimConfig::load_from(Some(file.path()), Some(env))?;
        assert_eq!(config.tick_interval_ms, 4_500);
        assert_eq!(config.topic, "prices");
        assert!((config.engine.max_step - 0.003).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = SimConfig::load(Some(Path::new("/nonexistent/price-engine.toml")));
        assert!(matches!(result, Err(crate::SimError::Config(_))));
    }
}
