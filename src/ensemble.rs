//! The candidate ensemble: one learner per warm-start trust level λ.
//!
//! Candidate `i` owns base-learner slots `i * P .. (i + 1) * P`, where `P` is the
//! number of policies the exploration strategy needs. All candidates see every
//! learned example; they differ only in how much weight each phase gets:
//!
//! ```text
//!   proportional:  w_ws = λ * warm_start_learning_rate
//!                  w_int = (1 - λ) * interaction_learning_rate
//!   balanced:      w_ws = λ * N / W,  w_int = (1 - λ) * N / W   (times the same rates)
//!                  N = n_ws + n_int,  W = λ * n_ws + (1 - λ) * n_int
//! ```
//!
//! A zero weight skips the base-learner call for that candidate.

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::explore::{self, ExplorationConfig};
use crate::learner::BaseLearner;
use crate::{Phase, WarmCbError};

/// How phase weights are normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Weighting {
    #[default]
    Proportional,
    /// Normalise by planned phase sizes (needs an interaction budget).
    Balanced,
}

/// Per-phase importance weights as a function of λ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseWeights {
    pub weighting: Weighting,
    pub warm_start_learning_rate: f64,
    pub interaction_learning_rate: f64,
    /// Planned warm-start examples (`n_ws`).
    pub warm_start_examples: u64,
    /// Planned interaction examples (`n_int`), used by balanced weighting.
    pub interaction_examples: u64,
}

impl PhaseWeights {
    fn balance(&self, lambda: f64) -> f64 {
        match self.weighting {
            Weighting::Proportional => 1.0,
            Weighting::Balanced => {
                let n_ws = self.warm_start_examples as f64;
                let n_int = self.interaction_examples as f64;
                let w = lambda * n_ws + (1.0 - lambda) * n_int;
                if w > 0.0 {
                    (n_ws + n_int) / w
                } else {
                    0.0
                }
            }
        }
    }

    /// Importance weight of a warm-start update for candidate `lambda`.
    pub fn warm_start(&self, lambda: f64) -> f64 {
        lambda * self.balance(lambda) * self.warm_start_learning_rate
    }

    /// Importance weight of an interaction update for candidate `lambda`.
    pub fn interaction(&self, lambda: f64) -> f64 {
        (1.0 - lambda) * self.balance(lambda) * self.interaction_learning_rate
    }

    pub fn for_phase(&self, phase: Phase, lambda: f64) -> f64 {
        match phase {
            Phase::WarmStart => self.warm_start(lambda),
            Phase::Interaction => self.interaction(lambda),
        }
    }
}

/// Where the centre of a generated λ grid sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LambdaScheme {
    /// Centre 0.5, endpoints left at their geometric values.
    #[default]
    Even,
    /// Centre 0.5, endpoints pinned to exactly 0 and 1.
    EvenWithEndpoints,
    /// Centre `n_int / (n_ws + n_int)`.
    Balanced,
    /// Balanced centre, endpoints pinned to exactly 0 and 1.
    BalancedWithEndpoints,
}

/// Generate `count` λ values: a centre, then halving the gap toward 0 below it and
/// toward 1 above it.
///
/// ```text
///   count = 5, centre 0.5:  0.125, 0.25, 0.5, 0.75, 0.875
///   with endpoints:         0,     0.25, 0.5, 0.75, 1
/// ```
pub fn lambda_grid(
    count: usize,
    scheme: LambdaScheme,
    warm_start_examples: u64,
    interaction_examples: u64,
) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let centre = match scheme {
        LambdaScheme::Even | LambdaScheme::EvenWithEndpoints => 0.5,
        LambdaScheme::Balanced | LambdaScheme::BalancedWithEndpoints => {
            let total = warm_start_examples.saturating_add(interaction_examples);
            if total == 0 {
                0.5
            } else {
                interaction_examples as f64 / total as f64
            }
        }
    };
    let mid = (count - 1) / 2;
    let mut grid = vec![0.0; count];
    grid[mid] = centre;
    for i in (0..mid).rev() {
        grid[i] = grid[i + 1] / 2.0;
    }
    for i in mid + 1..count {
        grid[i] = 1.0 - (1.0 - grid[i - 1]) / 2.0;
    }
    let pin = matches!(
        scheme,
        LambdaScheme::EvenWithEndpoints | LambdaScheme::BalancedWithEndpoints
    );
    if pin && count >= 3 {
        grid[0] = 0.0;
        grid[count - 1] = 1.0;
    }
    grid
}

/// Sort ascending, drop duplicates, check range.
pub(crate) fn normalize_lambdas(lambdas: &[f64]) -> Result<Vec<f64>, WarmCbError> {
    if lambdas.is_empty() {
        return Err(WarmCbError::EmptyLambdaCandidates);
    }
    if let Some(&bad) = lambdas
        .iter()
        .find(|l| !(l.is_finite() && (0.0..=1.0).contains(*l)))
    {
        return Err(WarmCbError::LambdaOutOfRange(bad));
    }
    let mut out = lambdas.to_vec();
    out.sort_by(f64::total_cmp);
    out.dedup();
    Ok(out)
}

/// One ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub lambda: f64,
    /// First base-learner slot of this candidate.
    pub slot_base: usize,
    /// Warm-start examples that reached the base learner.
    pub warm_start_updates: u64,
    /// Interaction examples that reached the base learner.
    pub interaction_updates: u64,
}

/// Serializable ensemble bookkeeping (model weights live in the base learner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleState {
    pub candidates: Vec<Candidate>,
    pub interaction_rounds: u64,
}

/// Candidates over a λ grid, sharing one base learner.
#[derive(Debug, Clone)]
pub struct CandidateEnsemble {
    num_actions: usize,
    exploration: ExplorationConfig,
    weights: PhaseWeights,
    candidates: Vec<Candidate>,
    // Learned interaction examples; drives cover's probability floor.
    interaction_rounds: u64,
}

impl CandidateEnsemble {
    pub fn new(
        lambdas: &[f64],
        num_actions: usize,
        exploration: ExplorationConfig,
        weights: PhaseWeights,
    ) -> Result<Self, WarmCbError> {
        if num_actions == 0 {
            return Err(WarmCbError::NoActions);
        }
        exploration.validate()?;
        let lambdas = normalize_lambdas(lambdas)?;
        let per = exploration.policies_per_candidate();
        let candidates = lambdas
            .into_iter()
            .enumerate()
            .map(|(i, lambda)| Candidate {
                lambda,
                slot_base: i * per,
                warm_start_updates: 0,
                interaction_updates: 0,
            })
            .collect();
        Ok(Self {
            num_actions,
            exploration,
            weights,
            candidates,
            interaction_rounds: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn lambdas(&self) -> Vec<f64> {
        self.candidates.iter().map(|c| c.lambda).collect()
    }

    pub fn exploration(&self) -> &ExplorationConfig {
        &self.exploration
    }

    pub fn weights(&self) -> &PhaseWeights {
        &self.weights
    }

    /// Base-learner slots used by the whole ensemble.
    pub fn slots(&self) -> usize {
        self.candidates.len() * self.exploration.policies_per_candidate()
    }

    /// Index of the candidate trusting warm start the most.
    pub fn max_lambda_index(&self) -> usize {
        self.candidates.len().saturating_sub(1)
    }

    fn policy_scores<L: BaseLearner>(
        &self,
        learner: &L,
        slot: usize,
        features: &L::Features,
    ) -> Vec<f64> {
        let mut s = vec![0.0; self.num_actions];
        learner.predict(slot, features, &mut s);
        s
    }

    /// Per-action cost predictions of candidate `i`'s first policy.
    pub fn scores<L: BaseLearner>(&self, learner: &L, i: usize, features: &L::Features) -> Vec<f64> {
        match self.candidates.get(i) {
            Some(c) => self.policy_scores(learner, c.slot_base, features),
            None => vec![0.0; self.num_actions],
        }
    }

    /// Un-mixed greedy distribution of candidate `i`: the arg-min split for
    /// epsilon-greedy, the vote shares for bag and cover.
    pub fn greedy_distribution<L: BaseLearner>(
        &self,
        learner: &L,
        i: usize,
        features: &L::Features,
    ) -> Vec<f64> {
        let Some(c) = self.candidates.get(i) else {
            return vec![1.0 / self.num_actions as f64; self.num_actions];
        };
        let policies = self.exploration.policies_per_candidate();
        let share = 1.0 / policies as f64;
        let mut out = vec![0.0; self.num_actions];
        for p in 0..policies {
            let s = self.policy_scores(learner, c.slot_base + p, features);
            explore::add_greedy_mass(&s, share, &mut out);
        }
        out
    }

    fn cover_floor(&self) -> f64 {
        explore::cover_min_probability(
            self.exploration.epsilon(),
            self.num_actions,
            self.interaction_rounds.saturating_add(1),
        )
    }

    /// Exploration distribution of candidate `i`.
    pub fn distribution<L: BaseLearner>(
        &self,
        learner: &L,
        i: usize,
        features: &L::Features,
    ) -> Vec<f64> {
        let mut p = self.greedy_distribution(learner, i, features);
        match self.exploration {
            ExplorationConfig::EpsilonGreedy { epsilon } | ExplorationConfig::Bag { epsilon, .. } => {
                explore::mix_uniform(&mut p, epsilon);
            }
            ExplorationConfig::Cover { .. } => {
                explore::mix_floor(&mut p, self.cover_floor());
            }
        }
        p
    }

    /// Update every candidate toward `target` (true costs for supervised warm start,
    /// importance-weighted estimates otherwise).
    ///
    /// Bag copies get an extra Poisson(1) bootstrap multiplier. During interaction,
    /// cover's diversity policies are trained on pseudo-costs instead of `target`.
    pub fn learn<L, R>(
        &mut self,
        learner: &mut L,
        features: &L::Features,
        target: &[f64],
        phase: Phase,
        rng: &mut R,
    ) where
        L: BaseLearner,
        R: Rng + ?Sized,
    {
        let cover_floor = self.cover_floor();
        let exploration = self.exploration;
        let weights = self.weights;
        let bootstrap = Poisson::new(1.0).ok();
        for c in &mut self.candidates {
            let w = weights.for_phase(phase, c.lambda);
            if w.is_nan() || w <= 0.0 {
                continue;
            }
            match exploration {
                ExplorationConfig::EpsilonGreedy { .. } => {
                    learner.update(c.slot_base, features, target, w);
                }
                ExplorationConfig::Bag { size, .. } => {
                    for b in 0..size {
                        let m: f64 = match &bootstrap {
                            Some(d) => d.sample(rng),
                            None => 1.0,
                        };
                        if m > 0.0 {
                            learner.update(c.slot_base + b, features, target, w * m);
                        }
                    }
                }
                ExplorationConfig::Cover { size, psi, .. } => {
                    learner.update(c.slot_base, features, target, w);
                    if phase == Phase::WarmStart {
                        for j in 1..=size {
                            learner.update(c.slot_base + j, features, target, w);
                        }
                    } else {
                        let share = 1.0 / (size + 1) as f64;
                        let mut covered = vec![0.0; target.len()];
                        let mut s = vec![0.0; target.len()];
                        learner.predict(c.slot_base, features, &mut s);
                        explore::add_greedy_mass(&s, share, &mut covered);
                        for j in 1..=size {
                            let slot = c.slot_base + j;
                            let pseudo = explore::cover_pseudo_costs(target, &covered, cover_floor, psi);
                            learner.predict(slot, features, &mut s);
                            explore::add_greedy_mass(&s, share, &mut covered);
                            learner.update(slot, features, &pseudo, w);
                        }
                    }
                }
            }
            match phase {
                Phase::WarmStart => c.warm_start_updates += 1,
                Phase::Interaction => c.interaction_updates += 1,
            }
        }
        if phase == Phase::Interaction {
            self.interaction_rounds = self.interaction_rounds.saturating_add(1);
        }
    }

    pub fn state(&self) -> EnsembleState {
        EnsembleState {
            candidates: self.candidates.clone(),
            interaction_rounds: self.interaction_rounds,
        }
    }

    pub(crate) fn check_state(&self, state: &EnsembleState) -> Result<(), WarmCbError> {
        if state.candidates.len() != self.candidates.len() {
            return Err(WarmCbError::CheckpointMismatch {
                what: "candidates",
                expected: self.candidates.len(),
                found: state.candidates.len(),
            });
        }
        for (mine, theirs) in self.candidates.iter().zip(&state.candidates) {
            if mine.lambda.to_bits() != theirs.lambda.to_bits() || mine.slot_base != theirs.slot_base {
                return Err(WarmCbError::CheckpointCorrupt("candidate grid"));
            }
        }
        Ok(())
    }

    pub(crate) fn restore(&mut self, state: EnsembleState) -> Result<(), WarmCbError> {
        self.check_state(&state)?;
        self.candidates = state.candidates;
        self.interaction_rounds = state.interaction_rounds;
        Ok(())
    }
}
