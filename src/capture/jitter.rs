//! Named randomness source for the simulated-noise parts of the estimators
//! (respiration, gaze bands). Seeded sources make band membership testable.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

#[derive(Debug, Clone)]
pub struct Jitter {
    rng: StdRng,
}

impl Jitter {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// `base + U[0, span)`; a non-positive span returns `base`.
    pub fn around(&mut self, base: f64, span: f64) -> f64 {
        if span <= 0.0 {
            return base;
        }
        base + self.rng.gen_range(0.0..span)
    }

    /// Independent child stream, e.g. for a background task.
    pub fn fork(&mut self) -> Self {
        Self::seeded(self.rng.next_u64())
    }
}
