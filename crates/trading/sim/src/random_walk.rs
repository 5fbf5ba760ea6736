//! Gaussian noise for the random walk

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Source of normally distributed samples
///
/// Each call is independent; implementations own their RNG state.
pub trait NoiseSource: Send {
    /// Draw one sample from `N(mean, std_dev²)`
    ///
    /// A zero, negative or non-finite `std_dev` yields `mean` exactly.
    fn sample(&mut self, mean: f64, std_dev: f64) -> f64;
}

/// Normal distribution sampler backed by [`StdRng`]
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    rng: StdRng,
}

impl GaussianNoise {
    /// Sampler seeded from OS entropy
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sampler
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for GaussianNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseSource for GaussianNoise {
    fn sample(&mut self, mean: f64, std_dev: f64) -> f64 {
        if !(std_dev.is_finite() && std_dev > 0.0) {
            return mean;
        }
        Normal::new(mean, std_dev).map_or(mean, |normal| normal.sample(&mut self.rng))
    }
}
