#![allow(dead_code)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;
use warmcb::{Example, Label, LinearCostRegressor, LinearRegressorConfig};

/// Install a test subscriber once; `RUST_LOG=warmcb=debug` shows the reduction's events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn learner(dim: usize) -> LinearCostRegressor {
    LinearCostRegressor::new(LinearRegressorConfig {
        dim,
        ..LinearRegressorConfig::default()
    })
}

/// Seeded synthetic stream where one action is always the cheapest.
pub struct Stream {
    rng: ChaCha8Rng,
    pub dim: usize,
    pub best: usize,
}

impl Stream {
    pub fn new(seed: u64, dim: usize, best: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            dim,
            best,
        }
    }

    pub fn features(&mut self) -> Vec<f64> {
        (0..self.dim).map(|_| self.rng.random::<f64>()).collect()
    }

    /// A labeled example naming the best action (full information).
    pub fn labeled(&mut self) -> Example<Vec<f64>> {
        Example::new(self.features(), Label::Multiclass(self.best))
    }

    /// Like [`labeled`](Self::labeled), with some examples carrying no label.
    pub fn mixed(&mut self, unlabeled_rate: f64) -> Example<Vec<f64>> {
        let x = self.features();
        if self.rng.random::<f64>() < unlabeled_rate {
            Example::unlabeled(x)
        } else {
            Example::new(x, Label::Multiclass(self.best))
        }
    }
}
