//! Reduction configuration.
//!
//! Everything has a default, so a TOML file only needs the fields it changes:
//!
//! ```toml
//! num_actions = 3
//! warm_start_period = 100
//! lambda_candidates = [0.0, 0.5, 1.0]
//! corruption_probability = 0.0
//!
//! [exploration]
//! strategy = "cover"
//! size = 3
//!
//! [selector]
//! rule = "exp3-ix"
//! ```

use serde::{Deserialize, Serialize};

use crate::corruption::LabelCorruption;
use crate::ensemble::{normalize_lambdas, PhaseWeights, Weighting};
use crate::explore::ExplorationConfig;
use crate::phase::{Interleave, PhaseSchedule};
use crate::selector::SelectorConfig;
use crate::WarmCbError;

/// Which candidate acts while still in warm start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarmStartPrediction {
    /// The largest-λ candidate: the one that trusts the warm-start data most.
    #[default]
    TrustWarmStart,
    /// Sample from the model selector, as during interaction.
    Selector,
}

/// How warm-start examples are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarmStartType {
    /// Full-information cost-sensitive updates.
    #[default]
    Supervised,
    /// Reveal only the cost of the predicted action, as bandit feedback.
    Bandit,
}

/// Configuration for [`WarmCb`](crate::WarmCb).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarmCbConfig {
    pub num_actions: usize,
    pub warm_start_period: u64,
    /// Interaction examples learned from; later ones are only predicted.
    pub interaction_period: Option<u64>,
    pub interleave: Option<Interleave>,
    /// λ grid (sorted and deduplicated at setup).
    pub lambda_candidates: Vec<f64>,
    pub exploration: ExplorationConfig,
    /// Known warm-start label-flip rate in `[0, 1)`; `None` when unknown.
    pub corruption_probability: Option<f64>,
    /// Lower clamp on logged probabilities before dividing by them.
    pub probability_floor: f64,
    pub random_seed: u64,
    pub warm_start_learning_rate: f64,
    pub interaction_learning_rate: f64,
    pub weighting: Weighting,
    pub selector: SelectorConfig,
    pub warm_start_prediction: WarmStartPrediction,
    pub warm_start_type: WarmStartType,
    pub learn_warm_start: bool,
    pub learn_interaction: bool,
    /// Corrupt warm-start multiclass labels before learning (robustness experiments).
    pub warm_start_corruption: Option<LabelCorruption>,
}

impl Default for WarmCbConfig {
    fn default() -> Self {
        Self {
            num_actions: 2,
            warm_start_period: 0,
            interaction_period: None,
            interleave: None,
            lambda_candidates: vec![0.0, 0.25, 0.5, 0.75, 1.0],
            exploration: ExplorationConfig::default(),
            corruption_probability: None,
            probability_floor: 1e-3,
            random_seed: 0,
            warm_start_learning_rate: 1.0,
            interaction_learning_rate: 1.0,
            weighting: Weighting::default(),
            selector: SelectorConfig::default(),
            warm_start_prediction: WarmStartPrediction::default(),
            warm_start_type: WarmStartType::default(),
            learn_warm_start: true,
            learn_interaction: true,
            warm_start_corruption: None,
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), WarmCbError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(WarmCbError::InvalidParameter {
            name,
            value,
            reason: "must be finite and positive",
        })
    }
}

impl WarmCbConfig {
    /// Parse TOML and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, WarmCbError> {
        let cfg: WarmCbConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every setup-time constraint.
    pub fn validate(&self) -> Result<(), WarmCbError> {
        if self.num_actions == 0 {
            return Err(WarmCbError::NoActions);
        }
        let lambdas = normalize_lambdas(&self.lambda_candidates)?;
        if let Some(rho) = self.corruption_probability {
            if !(rho.is_finite() && (0.0..1.0).contains(&rho)) {
                return Err(WarmCbError::CorruptionProbabilityOutOfRange(rho));
            }
        }
        self.exploration.validate()?;
        let floor = self.probability_floor;
        if !(floor.is_finite() && floor > 0.0 && floor <= 1.0) {
            return Err(WarmCbError::InvalidParameter {
                name: "probability_floor",
                value: floor,
                reason: "must lie in (0, 1]",
            });
        }
        positive("warm_start_learning_rate", self.warm_start_learning_rate)?;
        positive("interaction_learning_rate", self.interaction_learning_rate)?;
        self.selector.validate(lambdas.len())?;
        if self.weighting == Weighting::Balanced && self.interaction_period.is_none() {
            return Err(WarmCbError::BalancedWeightingNeedsInteractionPeriod);
        }
        self.schedule().validate()?;
        if let Some(c) = &self.warm_start_corruption {
            c.validate(self.num_actions)?;
        }
        Ok(())
    }

    pub fn schedule(&self) -> PhaseSchedule {
        PhaseSchedule {
            warm_start_period: self.warm_start_period,
            interaction_period: self.interaction_period,
            interleave: self.interleave,
        }
    }

    pub fn phase_weights(&self) -> PhaseWeights {
        PhaseWeights {
            weighting: self.weighting,
            warm_start_learning_rate: self.warm_start_learning_rate,
            interaction_learning_rate: self.interaction_learning_rate,
            warm_start_examples: self.warm_start_period,
            interaction_examples: self.interaction_period.unwrap_or(0),
        }
    }
}
