//! Deterministic random number source for the drift engine.

use rand::{rngs::SmallRng, Rng, SeedableRng};

// -------------------------------------------------------------------------------------------------

/// Seeded pseudo random number generator, providing the uniform and exponential draws the
/// drift engine needs. Two sources with the same seed produce the same sequence.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: SmallRng,
}

impl RandomSource {
    /// Smallest uniform value fed into the exponential draw, avoiding `ln(0)`.
    const MIN_EXPONENTIAL_UNIFORM: f32 = 0.0001;

    pub fn new(seed: u64) -> Self {
        let rng = SmallRng::seed_from_u64(seed);
        Self { rng }
    }

    /// Restart the sequence from the given seed.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Uniform value in range \[0, 1).
    #[inline]
    pub fn uniform(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    /// Uniform value in range \[-1, 1).
    #[inline]
    pub fn bipolar(&mut self) -> f32 {
        self.uniform() * 2.0 - 1.0
    }

    /// Exponentially distributed value with the given rate (mean `1 / rate`).
    /// Used to draw inter-arrival times of a Poisson process.
    #[inline]
    pub fn exponential(&mut self, rate: f32) -> f32 {
        debug_assert!(rate > 0.0, "Invalid exponential rate");
        let u = self.uniform().max(Self::MIN_EXPONENTIAL_UNIFORM);
        -u.ln() / rate
    }

    /// Returns true with the given probability.
    #[inline]
    pub fn chance(&mut self, probability: f32) -> bool {
        self.uniform() < probability
    }
}

// -------------------------------------------------------------------------------------------------
