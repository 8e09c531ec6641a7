//! The delegate learner interface and a default linear implementation.
//!
//! The reduction never owns model weights. It addresses independent models inside a
//! [`BaseLearner`] by *slot* index (one block of slots per candidate: one slot for
//! epsilon-greedy, one per bootstrap copy for bag, one per policy for cover) and only
//! decides when, and with what importance weight, each slot is updated.
//!
//! `&mut T` implements `BaseLearner` whenever `T` does, so a pipeline can keep
//! ownership of its learner and lend it to [`WarmCb`](crate::WarmCb):
//!
//! ```rust
//! use warmcb::{LinearCostRegressor, LinearRegressorConfig, WarmCb, WarmCbConfig};
//!
//! let mut learner = LinearCostRegressor::new(LinearRegressorConfig::default());
//! let cfg = WarmCbConfig { num_actions: 2, ..WarmCbConfig::default() };
//! let mut cb = WarmCb::new(cfg, &mut learner).unwrap();
//! let d = cb.predict(&vec![0.5; 4]);
//! assert!(d.action < 2);
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::WarmCbError;

/// Capability set the reduction needs from a cost-sensitive learner.
///
/// Scores follow the cost convention: lower is better.
pub trait BaseLearner {
    /// Per-example feature representation (opaque to the reduction).
    type Features;
    /// Serializable model state, saved inside reduction checkpoints.
    type State: Serialize + DeserializeOwned;

    /// Make sure `slots` independent models over `num_actions` actions exist.
    fn reserve(&mut self, slots: usize, num_actions: usize);

    /// Write the per-action cost predictions of `slot` into `scores`.
    fn predict(&self, slot: usize, features: &Self::Features, scores: &mut [f64]);

    /// Full-information update of `slot` toward `costs` with importance `weight`.
    fn update(&mut self, slot: usize, features: &Self::Features, costs: &[f64], weight: f64);

    /// Capture the complete model state.
    fn save_state(&self) -> Self::State;

    /// Replace the model state; must leave `self` untouched on error.
    fn load_state(&mut self, state: Self::State) -> Result<(), WarmCbError>;
}

impl<T: BaseLearner + ?Sized> BaseLearner for &mut T {
    type Features = T::Features;
    type State = T::State;

    fn reserve(&mut self, slots: usize, num_actions: usize) {
        (**self).reserve(slots, num_actions);
    }
    fn predict(&self, slot: usize, features: &Self::Features, scores: &mut [f64]) {
        (**self).predict(slot, features, scores);
    }
    fn update(&mut self, slot: usize, features: &Self::Features, costs: &[f64], weight: f64) {
        (**self).update(slot, features, costs, weight);
    }
    fn save_state(&self) -> Self::State {
        (**self).save_state()
    }
    fn load_state(&mut self, state: Self::State) -> Result<(), WarmCbError> {
        (**self).load_state(state)
    }
}

/// Configuration for [`LinearCostRegressor`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearRegressorConfig {
    /// Feature vector dimension (missing entries read as 0, extra entries are ignored).
    pub dim: usize,
    /// Base learning rate (eta, must be finite and > 0).
    pub learning_rate: f64,
    /// Append a constant 1.0 feature.
    pub bias: bool,
}

impl Default for LinearRegressorConfig {
    fn default() -> Self {
        Self {
            dim: 4,
            learning_rate: 0.5,
            bias: true,
        }
    }
}

/// One-against-all linear cost regression: per slot, one weight vector per action.
///
/// Updates use the importance-invariant rule for squared loss (Karampatziakis &
/// Langford 2011): with `h` the importance weight, the prediction moves toward the
/// target by the closed form
///
/// ```text
///   p <- y + (p - y) * exp(-eta * h * |x|^2)
/// ```
///
/// which never overshoots, so the large weights produced by inverse propensity
/// scoring stay bounded.
#[derive(Debug, Clone)]
pub struct LinearCostRegressor {
    cfg: LinearRegressorConfig,
    num_actions: usize,
    slots: usize,
    // Row-major [slot][action][width].
    weights: Vec<f64>,
}

/// Serializable [`LinearCostRegressor`] state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressorState {
    pub cfg: LinearRegressorConfig,
    pub num_actions: usize,
    pub slots: usize,
    pub weights: Vec<f64>,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut s = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        s += x * y;
    }
    s
}

impl LinearCostRegressor {
    pub fn new(cfg: LinearRegressorConfig) -> Self {
        Self {
            cfg,
            num_actions: 0,
            slots: 0,
            weights: Vec::new(),
        }
    }

    fn width(&self) -> usize {
        self.cfg.dim + usize::from(self.cfg.bias)
    }

    fn eta(&self) -> f64 {
        if self.cfg.learning_rate.is_finite() && self.cfg.learning_rate > 0.0 {
            self.cfg.learning_rate
        } else {
            0.5
        }
    }

    fn sanitize_features(&self, features: &[f64]) -> Vec<f64> {
        let mut x = vec![0.0; self.width()];
        for (i, v) in x.iter_mut().take(self.cfg.dim).enumerate() {
            let raw = features.get(i).copied().unwrap_or(0.0);
            *v = if raw.is_finite() { raw } else { 0.0 };
        }
        if self.cfg.bias {
            x[self.cfg.dim] = 1.0;
        }
        x
    }

    fn row(&self, slot: usize, action: usize) -> Option<std::ops::Range<usize>> {
        if slot >= self.slots || action >= self.num_actions {
            return None;
        }
        let w = self.width();
        let start = (slot * self.num_actions + action) * w;
        Some(start..start + w)
    }

    /// Learned weight vector of `(slot, action)`, if allocated.
    pub fn weights(&self, slot: usize, action: usize) -> Option<&[f64]> {
        self.row(slot, action).map(|r| &self.weights[r])
    }
}

impl Default for LinearCostRegressor {
    fn default() -> Self {
        Self::new(LinearRegressorConfig::default())
    }
}

impl BaseLearner for LinearCostRegressor {
    type Features = Vec<f64>;
    type State = LinearRegressorState;

    fn reserve(&mut self, slots: usize, num_actions: usize) {
        if slots <= self.slots && num_actions == self.num_actions {
            return;
        }
        if num_actions != self.num_actions {
            // Action space changed: existing rows no longer line up.
            self.weights.clear();
            self.slots = 0;
            self.num_actions = num_actions;
        }
        let slots = slots.max(self.slots);
        self.weights.resize(slots * num_actions * self.width(), 0.0);
        self.slots = slots;
    }

    fn predict(&self, slot: usize, features: &Vec<f64>, scores: &mut [f64]) {
        let x = self.sanitize_features(features);
        for (a, s) in scores.iter_mut().enumerate() {
            *s = match self.row(slot, a) {
                Some(r) => dot(&self.weights[r], &x),
                None => 0.0,
            };
        }
    }

    fn update(&mut self, slot: usize, features: &Vec<f64>, costs: &[f64], weight: f64) {
        if !(weight.is_finite() && weight > 0.0) {
            return;
        }
        let x = self.sanitize_features(features);
        let xx = dot(&x, &x);
        if xx <= 0.0 {
            return;
        }
        let shrink = 1.0 - (-self.eta() * weight * xx).exp();
        for (a, &y) in costs.iter().enumerate() {
            if !y.is_finite() {
                continue;
            }
            let Some(r) = self.row(slot, a) else {
                continue;
            };
            let w = &mut self.weights[r];
            let p = dot(w, &x);
            let step = (p - y) * shrink / xx;
            if step == 0.0 {
                continue;
            }
            for (wi, xi) in w.iter_mut().zip(x.iter()) {
                *wi -= step * xi;
            }
        }
    }

    fn save_state(&self) -> LinearRegressorState {
        LinearRegressorState {
            cfg: self.cfg,
            num_actions: self.num_actions,
            slots: self.slots,
            weights: self.weights.clone(),
        }
    }

    fn load_state(&mut self, st: LinearRegressorState) -> Result<(), WarmCbError> {
        let width = st.cfg.dim + usize::from(st.cfg.bias);
        let expected = st.slots * st.num_actions * width;
        if st.weights.len() != expected {
            return Err(WarmCbError::CheckpointMismatch {
                what: "linear regressor weights",
                expected,
                found: st.weights.len(),
            });
        }
        if !st.weights.iter().all(|v| v.is_finite()) {
            return Err(WarmCbError::CheckpointCorrupt("linear regressor weights"));
        }
        self.cfg = st.cfg;
        self.num_actions = st.num_actions;
        self.slots = st.slots;
        self.weights = st.weights;
        Ok(())
    }
}
