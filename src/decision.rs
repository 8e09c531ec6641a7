//! Decision envelope for predictions.
//!
//! Every prediction returns a single, audit-friendly record that can be:
//! - logged (debugging / monitoring)
//! - replayed (offline evaluation needs the action *and* its probability)
//! - inspected in tests without reaching into reduction internals
//!
//! Notes are small, typed, and stable. Prefer adding new variants over changing
//! existing semantics.

use serde::{Deserialize, Serialize};

use crate::Phase;

/// How the acting candidate was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionNote {
    /// Warm start: the largest-λ candidate acted without consulting the selector.
    TrustedWarmStart,

    /// The model selector sampled the acting candidate with this probability.
    SampledCandidate { probability: f64 },

    /// The action was sampled from the candidate's exploration distribution.
    SampledFromDistribution,

    /// The greedy policy had several actions within the tie tolerance.
    TiedScores { tied: usize },

    /// CDF fallthrough: the last action with positive mass was taken.
    NumericalFallbackToLastAction,
}

/// A single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Chosen action.
    pub action: usize,
    /// Probability the action was chosen with (what IPS divides by).
    pub probability: f64,
    /// Index of the acting candidate.
    pub candidate: usize,
    /// λ of the acting candidate.
    pub lambda: f64,
    /// Phase the prediction was made in.
    pub phase: Phase,
    /// Full action distribution of the acting candidate.
    pub probs: Vec<f64>,
    /// Audit notes describing why this choice happened.
    pub notes: Vec<DecisionNote>,
}

impl Decision {
    /// Whether a note of the same kind is attached.
    pub fn has_note(&self, note: &DecisionNote) -> bool {
        self.notes
            .iter()
            .any(|n| std::mem::discriminant(n) == std::mem::discriminant(note))
    }
}
