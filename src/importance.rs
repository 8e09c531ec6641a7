//! Importance weighting of bandit feedback.
//!
//! Turns `(action, cost, probability)` into a full per-action cost estimate:
//!
//! ```text
//!   est[a] = debias(cost) / max(probability, floor)   if a == action
//!   est[a] = 0                                        otherwise
//! ```
//!
//! For `probability >= floor` this is unbiased: the action is observed with
//! probability `p`, so `E[est[a]] = p * cost / p = cost`. Below the floor the
//! estimator trades a small bias for bounded variance.
//!
//! When a label-flip rate `rho` is known, observed costs are first corrected with the
//! standard unbiased transform for symmetric flips of `{0, 1}` costs:
//! `E[observed] = (1 - 2 rho) * cost + rho`, hence `cost = (observed - rho) / (1 - 2 rho)`.

use crate::{BanditFeedback, SkipReason};

/// Corruption-aware inverse-propensity weighter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportanceWeighter {
    probability_floor: f64,
    corruption: Option<f64>,
}

impl ImportanceWeighter {
    /// `probability_floor` must be in `(0, 1]`; `corruption` in `[0, 1)` (validated by config).
    pub fn new(probability_floor: f64, corruption: Option<f64>) -> Self {
        Self {
            probability_floor,
            corruption,
        }
    }

    pub fn probability_floor(&self) -> f64 {
        self.probability_floor
    }

    /// Undo a known label-flip rate. Identity when the rate is unknown or zero.
    #[must_use]
    pub fn debias(&self, cost: f64) -> f64 {
        match self.corruption {
            Some(rho) if rho > 0.0 => {
                let raw = 1.0 - 2.0 * rho;
                // rho = 0.5 carries no signal; keep the correction bounded.
                let denom = if raw.abs() < self.probability_floor {
                    self.probability_floor.copysign(raw)
                } else {
                    raw
                };
                (cost - rho) / denom
            }
            _ => cost,
        }
    }

    /// Inverse-propensity estimate for the observed action.
    pub fn estimate_cost(&self, fb: &BanditFeedback) -> Result<f64, SkipReason> {
        if fb.probability.is_nan() || fb.probability > 1.0 {
            return Err(SkipReason::InvalidProbability(fb.probability));
        }
        if fb.probability <= 0.0 {
            return Err(SkipReason::NonPositiveProbability(fb.probability));
        }
        if !fb.cost.is_finite() {
            return Err(SkipReason::NonFiniteCost);
        }
        Ok(self.debias(fb.cost) / fb.probability.max(self.probability_floor))
    }

    /// Full per-action estimate (zeros for unobserved actions).
    pub fn estimate(&self, fb: &BanditFeedback, num_actions: usize) -> Result<Vec<f64>, SkipReason> {
        if fb.action >= num_actions {
            return Err(SkipReason::ActionOutOfRange {
                action: fb.action,
                num_actions,
            });
        }
        let c = self.estimate_cost(fb)?;
        let mut est = vec![0.0; num_actions];
        est[fb.action] = c;
        Ok(est)
    }
}
