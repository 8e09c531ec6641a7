//! Error types.
//!
//! Two families, matching the two ways things go wrong in a one-pass learner:
//!
//! - [`WarmCbError`]: fatal. Returned from configuration, construction and
//!   checkpoint restore; nothing has been learned (or nothing was mutated).
//! - [`SkipReason`]: recoverable, per example. The example is still predicted,
//!   learning is skipped and counted, and the stream continues.

use thiserror::Error;

use crate::Phase;

/// Setup-time and checkpoint errors.
#[derive(Debug, Error)]
pub enum WarmCbError {
    #[error("num_actions must be positive")]
    NoActions,

    #[error("lambda_candidates must be non-empty")]
    EmptyLambdaCandidates,

    #[error("lambda candidate {0} is outside [0, 1]")]
    LambdaOutOfRange(f64),

    #[error("corruption_probability {0} is outside [0, 1)")]
    CorruptionProbabilityOutOfRange(f64),

    #[error("unknown exploration strategy `{0}` (expected epsilon-greedy, bag or cover)")]
    UnknownExploration(String),

    #[error("invalid {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("balanced weighting needs interaction_period to be set")]
    BalancedWeightingNeedsInteractionPeriod,

    #[error("interleave blocks must both be positive")]
    EmptyInterleaveBlock,

    #[error("overwrite label {label} is outside 0..{num_actions}")]
    OverwriteLabelOutOfRange { label: usize, num_actions: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("checkpoint decode failed: {0}")]
    CheckpointDecode(#[from] serde_json::Error),

    #[error("checkpoint mismatch for {what}: expected {expected}, found {found}")]
    CheckpointMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("checkpoint contains non-finite values in {0}")]
    CheckpointCorrupt(&'static str),
}

/// Why an example was not learned from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("cost vector has {found} entries, expected {expected}")]
    CostVectorLength { expected: usize, found: usize },

    #[error("cost is not finite")]
    NonFiniteCost,

    #[error("selection probability {0} is not positive")]
    NonPositiveProbability(f64),

    #[error("selection probability {0} is not a probability")]
    InvalidProbability(f64),

    #[error("action {action} is outside 0..{num_actions}")]
    ActionOutOfRange { action: usize, num_actions: usize },

    #[error("{label} label cannot be learned during the {phase:?} phase")]
    PhaseMismatch { phase: Phase, label: &'static str },
}
