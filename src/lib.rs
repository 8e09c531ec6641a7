//! `warmcb`: warm-start contextual bandits with an ensemble over warm-start trust.
//!
//! Training data arrives in two regimes:
//!
//! - **warm start**: full information, every action's cost is known (e.g. a labeled
//!   supervised dataset);
//! - **interaction**: bandit feedback, only the cost of the action actually taken is
//!   observed.
//!
//! Warm-start labels may be biased or corrupted, so how much to trust them is learned
//! online rather than fixed up front. The reduction keeps one candidate learner per
//! trust level λ ∈ [0, 1] (warm-start updates weighted by λ, interaction updates by
//! 1 - λ) and runs a bandit over those candidates to pick who acts.
//!
//! **Pieces:**
//! - [`PhaseScheduler`]: tags each labeled example warm start or interaction.
//! - [`full_costs`]: warm-start labels to per-action cost vectors.
//! - [`ImportanceWeighter`]: bandit feedback to an unbiased, floor-clamped cost estimate,
//!   corrected for a known label-flip rate.
//! - [`explore`]: epsilon-greedy, bag and cover exploration over candidate scores.
//! - [`CandidateEnsemble`]: the λ grid sharing one [`BaseLearner`] through slots.
//! - [`ModelSelector`]: Hedge / EXP3-IX / follow-the-leader over candidates.
//! - [`WarmCb`]: the reduction; returns a [`Decision`] per prediction and checkpoints
//!   as a single [`WarmCbSnapshot`].
//!
//! **Determinism:** one seeded `ChaCha8Rng` drives every random choice, and it is part
//! of the checkpoint. Same config, seed and stream give the same decisions.
//!
//! **Non-goals:**
//! - Not a general multiclass classifier.
//! - Single-threaded, one pass; no parallel training.
//!
//! ```rust
//! use warmcb::{Example, Label, LinearCostRegressor, WarmCb, WarmCbConfig};
//!
//! let cfg = WarmCbConfig::from_toml_str(
//!     r#"
//!     num_actions = 3
//!     warm_start_period = 20
//!     lambda_candidates = [0.0, 0.5, 1.0]
//!     "#,
//! )
//! .unwrap();
//! let mut cb = WarmCb::new(cfg, LinearCostRegressor::default()).unwrap();
//!
//! let x = vec![1.0, 0.0, 0.5, 0.0];
//! for _ in 0..20 {
//!     cb.process(&Example::new(x.clone(), Label::Multiclass(2)));
//! }
//! // Interaction: act on a prediction, then report only that action's cost.
//! let d = cb.predict(&x);
//! let cost = if d.action == 2 { 0.0 } else { 1.0 };
//! let feedback = Example::new(x.clone(), Label::bandit(d.action, cost, d.probability));
//! let out = cb.process_feedback(&feedback, &d);
//! assert!(out.learned);
//! assert_eq!(cb.stats().cumulative_interaction_cost, cost);
//! ```

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod phase;
pub use phase::*;

mod example;
pub use example::*;

mod learner;
pub use learner::*;

mod cost_sensitive;
pub use cost_sensitive::*;

mod importance;
pub use importance::*;

mod corruption;
pub use corruption::*;

pub mod explore;
pub use explore::{ExplorationConfig, TIEBREAK_EPS};

mod ensemble;
pub use ensemble::*;

mod selector;
pub use selector::*;

mod decision;
pub use decision::*;

mod config;
pub use config::*;

mod warm_cb;
pub use warm_cb::*;
