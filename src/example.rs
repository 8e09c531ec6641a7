//! Examples and labels as seen by the reduction.

use serde::{Deserialize, Serialize};

/// Observed bandit feedback: one action, its cost, and the probability it was chosen with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BanditFeedback {
    pub action: usize,
    pub cost: f64,
    /// Must lie in `(0, 1]`.
    pub probability: f64,
}

/// Label payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    /// The correct action: cost 0 for it, 1 for every other action.
    Multiclass(usize),
    /// Explicit per-action costs.
    Costs(Vec<f64>),
    /// Partial information: only the taken action's cost.
    Bandit(BanditFeedback),
}

impl Label {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Label::Multiclass(_) => "multiclass",
            Label::Costs(_) => "cost-vector",
            Label::Bandit(_) => "bandit",
        }
    }

    /// Shorthand for [`Label::Bandit`].
    pub fn bandit(action: usize, cost: f64, probability: f64) -> Self {
        Label::Bandit(BanditFeedback {
            action,
            cost,
            probability,
        })
    }
}

/// One example: features for the base learner plus an optional label.
///
/// Unlabeled examples are prediction-only and do not advance the phase schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Example<F> {
    pub features: F,
    pub label: Option<Label>,
}

impl<F> Example<F> {
    pub fn new(features: F, label: Label) -> Self {
        Self {
            features,
            label: Some(label),
        }
    }

    pub fn unlabeled(features: F) -> Self {
        Self {
            features,
            label: None,
        }
    }
}
