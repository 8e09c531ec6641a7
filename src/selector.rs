//! Online model selection over candidates (bandit over bandits).
//!
//! Each candidate is an arm. After every learned interaction example the selector
//! receives per-candidate loss estimates and reweights:
//!
//! - [`SelectorRule::Hedge`] (default): full information. Every candidate is scored
//!   with the importance-weighted loss of its greedy policy, so no arm has to be
//!   pulled to be evaluated. Weights are `exp(-eta_t * L_i)` with the anytime rate
//!   `eta_t = sqrt(ln K / t)`. Losses must already be normalised into `[-1, 1]`
//!   (the caller divides by the largest estimate it can produce); anything outside
//!   is clamped.
//! - [`SelectorRule::Exp3Ix`]: only the sampled candidate's observed loss is used. It
//!   must be normalised into `[0, 1]` *before* the implicit-exploration estimate
//!   `loss / (p + gamma)`, `gamma = eta / 2` (Neu 2015).
//! - [`SelectorRule::FollowTheLeader`]: one-hot on the smallest cumulative loss, lowest
//!   index on ties.
//!
//! Probabilities are recomputed with a min-shift (`L_i - min L`) so large cumulative
//! losses never underflow to an all-zero vector; a degenerate normalizer falls back to
//! uniform. The randomized rules then mix in `min_probability` uniform mass.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::explore::{self, Sampled, TIEBREAK_EPS};
use crate::WarmCbError;

/// Weight update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorRule {
    #[default]
    Hedge,
    Exp3Ix,
    FollowTheLeader,
}

/// Configuration for [`ModelSelector`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorConfig {
    pub rule: SelectorRule,
    /// Fixed learning rate. `None` uses the anytime schedule of the rule.
    pub learning_rate: Option<f64>,
    /// Exponential decay factor in `(0, 1]` applied to cumulative losses each update.
    ///
    /// - `1.0` means no forgetting.
    /// - Smaller values track a changing best candidate faster.
    pub decay: f64,
    /// Uniform mass floor per candidate (randomized rules only, must be positive).
    pub min_probability: f64,
    /// Largest observed `|cost|`; the reduction normalises selector losses by it.
    pub max_cost: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            rule: SelectorRule::Hedge,
            learning_rate: None,
            decay: 1.0,
            min_probability: 1e-6,
            max_cost: 1.0,
        }
    }
}

impl SelectorConfig {
    pub(crate) fn validate(&self, candidates: usize) -> Result<(), WarmCbError> {
        if let Some(lr) = self.learning_rate {
            if !(lr.is_finite() && lr > 0.0) {
                return Err(WarmCbError::InvalidParameter {
                    name: "selector.learning_rate",
                    value: lr,
                    reason: "must be finite and positive",
                });
            }
        }
        if !(self.decay.is_finite() && self.decay > 0.0 && self.decay <= 1.0) {
            return Err(WarmCbError::InvalidParameter {
                name: "selector.decay",
                value: self.decay,
                reason: "must lie in (0, 1]",
            });
        }
        let mp = self.min_probability;
        if !(mp.is_finite() && mp >= 0.0 && mp * candidates.max(1) as f64 <= 1.0) {
            return Err(WarmCbError::InvalidParameter {
                name: "selector.min_probability",
                value: mp,
                reason: "must be non-negative and at most 1 / candidates",
            });
        }
        if mp == 0.0 && self.rule != SelectorRule::FollowTheLeader {
            return Err(WarmCbError::InvalidParameter {
                name: "selector.min_probability",
                value: mp,
                reason: "must be positive for randomized rules",
            });
        }
        if !(self.max_cost.is_finite() && self.max_cost > 0.0) {
            return Err(WarmCbError::InvalidParameter {
                name: "selector.max_cost",
                value: self.max_cost,
                reason: "must be finite and positive",
            });
        }
        Ok(())
    }
}

/// Serializable selector state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorState {
    pub cum_loss: Vec<f64>,
    pub uses: Vec<u64>,
    pub rounds: u64,
    pub probs: Vec<f64>,
}

impl SelectorState {
    fn uniform(k: usize) -> Self {
        Self {
            cum_loss: vec![0.0; k],
            uses: vec![0; k],
            rounds: 0,
            probs: vec![1.0 / k.max(1) as f64; k],
        }
    }
}

/// Distribution over candidates.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    cfg: SelectorConfig,
    state: SelectorState,
}

impl ModelSelector {
    pub fn new(cfg: SelectorConfig, candidates: usize) -> Result<Self, WarmCbError> {
        if candidates == 0 {
            return Err(WarmCbError::EmptyLambdaCandidates);
        }
        cfg.validate(candidates)?;
        Ok(Self {
            cfg,
            state: SelectorState::uniform(candidates),
        })
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.cfg
    }

    pub fn len(&self) -> usize {
        self.state.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.probs.is_empty()
    }

    /// Current selection probabilities, aligned with candidate indices.
    pub fn probabilities(&self) -> &[f64] {
        &self.state.probs
    }

    /// Cumulative (possibly decayed) loss estimates.
    pub fn cumulative_losses(&self) -> &[f64] {
        &self.state.cum_loss
    }

    pub fn rounds(&self) -> u64 {
        self.state.rounds
    }

    /// Sample a candidate from the current distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Sampled> {
        explore::sample(&self.state.probs, rng)
    }

    /// Current learning rate for the configured rule.
    pub fn learning_rate(&self) -> f64 {
        if let Some(lr) = self.cfg.learning_rate {
            return lr;
        }
        let k = self.len().max(1) as f64;
        let t = self.state.rounds.max(1) as f64;
        match self.cfg.rule {
            SelectorRule::Hedge | SelectorRule::FollowTheLeader => (k.ln() / t).sqrt(),
            SelectorRule::Exp3Ix => (2.0 * (k + 1.0).ln() / (k * t)).sqrt(),
        }
    }

    /// Feed one round of losses.
    ///
    /// `losses[i]` is the normalised loss of candidate `i`; `selected` is the candidate
    /// that made the decision. Full-information rules use every entry (clamped to
    /// `[-1, 1]`), `Exp3Ix` only `losses[selected]` (clamped to `[0, 1]`). Mismatched
    /// lengths, an out-of-range `selected`, or non-finite losses leave the state
    /// untouched.
    pub fn update(&mut self, selected: usize, losses: &[f64]) {
        if losses.len() != self.len() || selected >= self.len() {
            return;
        }
        if !losses.iter().all(|l| l.is_finite()) {
            return;
        }
        match self.cfg.rule {
            SelectorRule::Hedge | SelectorRule::FollowTheLeader => self.update_full(losses),
            SelectorRule::Exp3Ix => self.update_bandit(selected, losses[selected]),
        }
        self.state.uses[selected] = self.state.uses[selected].saturating_add(1);
    }

    fn decay(&mut self) {
        if self.cfg.decay < 1.0 {
            for l in &mut self.state.cum_loss {
                *l *= self.cfg.decay;
            }
        }
    }

    fn update_full(&mut self, losses: &[f64]) {
        self.decay();
        for (l, x) in self.state.cum_loss.iter_mut().zip(losses) {
            *l += x.clamp(-1.0, 1.0);
        }
        self.state.rounds = self.state.rounds.saturating_add(1);
        self.recompute_probs();
    }

    fn update_bandit(&mut self, selected: usize, loss: f64) {
        self.decay();
        let gamma = 0.5 * self.learning_rate();
        let p = self.state.probs[selected];
        let denom = p + gamma;
        // Range restriction happens on the observed loss, ahead of the estimate.
        let loss = loss.clamp(0.0, 1.0);
        let loss_hat = if denom > 0.0 { loss / denom } else { loss };
        self.state.cum_loss[selected] += loss_hat;
        self.state.rounds = self.state.rounds.saturating_add(1);
        self.recompute_probs();
    }

    fn recompute_probs(&mut self) {
        let k = self.len();
        if k == 0 {
            return;
        }
        let min_l = self
            .state
            .cum_loss
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);

        if self.cfg.rule == SelectorRule::FollowTheLeader {
            let leader = self
                .state
                .cum_loss
                .iter()
                .position(|&l| l <= min_l + TIEBREAK_EPS)
                .unwrap_or(0);
            self.state.probs = vec![0.0; k];
            self.state.probs[leader] = 1.0;
            return;
        }

        let eta = self.learning_rate();
        let mut w: Vec<f64> = Vec::with_capacity(k);
        let mut denom = 0.0;
        for &l in &self.state.cum_loss {
            let x = (-eta * (l - min_l)).exp();
            denom += x;
            w.push(x);
        }
        if denom <= 0.0 || !denom.is_finite() {
            self.state.probs = vec![1.0 / k as f64; k];
        } else {
            for (p, wi) in self.state.probs.iter_mut().zip(w) {
                *p = wi / denom;
            }
        }
        explore::mix_floor(&mut self.state.probs, self.cfg.min_probability);
    }

    /// Forget all losses and return to the uniform distribution.
    pub fn reset(&mut self) {
        let k = self.len();
        self.state = SelectorState::uniform(k);
        tracing::debug!(candidates = k, "model selector reset");
    }

    pub fn state(&self) -> &SelectorState {
        &self.state
    }

    /// Validate `state` against this selector's shape, then adopt it.
    pub(crate) fn check_state(&self, state: &SelectorState) -> Result<(), WarmCbError> {
        let k = self.len();
        for (what, found) in [
            ("selector losses", state.cum_loss.len()),
            ("selector uses", state.uses.len()),
            ("selector probabilities", state.probs.len()),
        ] {
            if found != k {
                return Err(WarmCbError::CheckpointMismatch {
                    what,
                    expected: k,
                    found,
                });
            }
        }
        if !state.cum_loss.iter().all(|l| l.is_finite()) {
            return Err(WarmCbError::CheckpointCorrupt("selector losses"));
        }
        let sum: f64 = state.probs.iter().sum();
        if !state.probs.iter().all(|p| p.is_finite() && *p >= 0.0) || (sum - 1.0).abs() > 1e-6 {
            return Err(WarmCbError::CheckpointCorrupt("selector probabilities"));
        }
        Ok(())
    }

    pub(crate) fn restore(&mut self, state: SelectorState) -> Result<(), WarmCbError> {
        self.check_state(&state)?;
        self.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn selector(rule: SelectorRule, k: usize) -> ModelSelector {
        ModelSelector::new(
            SelectorConfig {
                rule,
                ..SelectorConfig::default()
            },
            k,
        )
        .unwrap()
    }

    #[test]
    fn starts_uniform() {
        let s = selector(SelectorRule::Hedge, 4);
        assert_eq!(s.probabilities(), &[0.25; 4]);
    }

    #[test]
    fn hedge_moves_mass_to_the_lowest_loss() {
        let mut s = selector(SelectorRule::Hedge, 3);
        for _ in 0..50 {
            s.update(0, &[0.0, 0.5, 1.0]);
        }
        let p = s.probabilities();
        assert!(p[0] > p[1] && p[1] > p[2], "{p:?}");
        assert!(p[0] > 1.0 / 3.0);
    }

    #[test]
    fn any_positive_gap_beats_the_uniform_share() {
        let mut s = selector(SelectorRule::Hedge, 3);
        s.update(2, &[0.0, 0.0, 1e-3]);
        assert!(s.probabilities()[0] > 1.0 / 3.0);
    }

    #[test]
    fn one_large_estimate_cannot_collapse_a_candidate() {
        let mut s = selector(SelectorRule::Hedge, 3);
        // An explored action under epsilon-greedy(0.1) with cost 1: 1 / (0.1 / 3).
        s.update(0, &[0.0, 30.0, 0.0]);
        let p = s.probabilities();
        assert_eq!(s.cumulative_losses()[1], 1.0);
        assert!(p[1] > 0.1, "{p:?}");
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn randomized_rules_keep_every_candidate_positive() {
        for rule in [SelectorRule::Hedge, SelectorRule::Exp3Ix] {
            let mut s = selector(rule, 2);
            for _ in 0..10_000 {
                s.update(1, &[1.0, 1.0]);
                s.update(0, &[1.0, -1.0]);
            }
            assert!(s.probabilities().iter().all(|&p| p > 5e-7), "{rule:?}");
        }
    }

    #[test]
    fn exp3ix_only_charges_the_selected_candidate() {
        let mut s = selector(SelectorRule::Exp3Ix, 2);
        s.update(1, &[5.0, 5.0]);
        assert_eq!(s.cumulative_losses()[0], 0.0);
        assert!(s.cumulative_losses()[1] > 0.0);
        // Loss clipped to 1 before importance weighting.
        assert!(s.cumulative_losses()[1] <= 1.0 / 0.5 + 1e-12);
        assert!(s.probabilities()[0] > s.probabilities()[1]);
    }

    #[test]
    fn follow_the_leader_is_one_hot_with_lowest_index_ties() {
        let mut s = selector(SelectorRule::FollowTheLeader, 3);
        s.update(0, &[1.0, 0.0, 0.0]);
        assert_eq!(s.probabilities(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn decay_forgets_old_losses() {
        let mut s = ModelSelector::new(
            SelectorConfig {
                decay: 0.5,
                ..SelectorConfig::default()
            },
            2,
        )
        .unwrap();
        s.update(0, &[1.0, 0.0]);
        s.update(0, &[0.0, 0.0]);
        assert!((s.cumulative_losses()[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn malformed_updates_are_ignored() {
        let mut s = selector(SelectorRule::Hedge, 2);
        s.update(0, &[1.0]);
        s.update(0, &[f64::NAN, 0.0]);
        s.update(7, &[1.0, 0.0]);
        assert_eq!(s.rounds(), 0);
        assert_eq!(s.probabilities(), &[0.5, 0.5]);
    }

    #[test]
    fn reset_returns_to_uniform() {
        let mut s = selector(SelectorRule::Hedge, 2);
        s.update(0, &[3.0, 0.0]);
        s.reset();
        assert_eq!(s.probabilities(), &[0.5, 0.5]);
        assert_eq!(s.rounds(), 0);
    }

    #[test]
    fn bad_config_is_rejected() {
        let bad = |cfg: SelectorConfig| ModelSelector::new(cfg, 4).is_err();
        assert!(bad(SelectorConfig { decay: 0.0, ..SelectorConfig::default() }));
        assert!(bad(SelectorConfig { learning_rate: Some(-1.0), ..SelectorConfig::default() }));
        assert!(bad(SelectorConfig { min_probability: 0.3, ..SelectorConfig::default() }));
        assert!(bad(SelectorConfig { min_probability: 0.0, ..SelectorConfig::default() }));
        assert!(bad(SelectorConfig {
            rule: SelectorRule::Exp3Ix,
            min_probability: 0.0,
            ..SelectorConfig::default()
        }));
        assert!(bad(SelectorConfig { max_cost: 0.0, ..SelectorConfig::default() }));
        // A one-hot leader needs no floor.
        assert!(!bad(SelectorConfig {
            rule: SelectorRule::FollowTheLeader,
            min_probability: 0.0,
            ..SelectorConfig::default()
        }));
        assert!(ModelSelector::new(SelectorConfig::default(), 0).is_err());
    }

    #[test]
    fn restore_rejects_wrong_shapes() {
        let mut s = selector(SelectorRule::Hedge, 3);
        let mut st = s.state().clone();
        st.probs.pop();
        assert!(matches!(s.restore(st), Err(WarmCbError::CheckpointMismatch { .. })));
        assert_eq!(s.probabilities().len(), 3);
    }

    #[test]
    fn same_seed_same_choices() {
        let s = selector(SelectorRule::Hedge, 5);
        let mut r1 = ChaCha8Rng::seed_from_u64(9);
        let mut r2 = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..20 {
            assert_eq!(s.sample(&mut r1), s.sample(&mut r2));
        }
    }

    proptest! {
        #[test]
        fn randomized_rules_keep_a_full_support_distribution(
            exp3 in any::<bool>(),
            decay in 0.01f64..1.0,
            rounds in proptest::collection::vec(
                (0usize..4, proptest::collection::vec(0.0f64..50.0, 4)),
                0..100,
            ),
        ) {
            let rule = if exp3 { SelectorRule::Exp3Ix } else { SelectorRule::Hedge };
            let mut s = ModelSelector::new(
                SelectorConfig { rule, decay, ..SelectorConfig::default() },
                4,
            ).unwrap();
            for (sel, losses) in &rounds {
                s.update(*sel, losses);
                let p = s.probabilities();
                let sum: f64 = p.iter().sum();
                prop_assert!((sum - 1.0).abs() < 1e-9, "sum={}", sum);
                for &x in p {
                    prop_assert!(x.is_finite());
                    prop_assert!(x > 0.0);
                }
            }
        }

        #[test]
        fn follow_the_leader_stays_one_hot(
            rounds in proptest::collection::vec(proptest::collection::vec(0.0f64..5.0, 3), 1..50),
        ) {
            let mut s = selector(SelectorRule::FollowTheLeader, 3);
            for losses in &rounds {
                s.update(0, losses);
            }
            let p = s.probabilities();
            prop_assert_eq!(p.iter().filter(|&&x| x == 1.0).count(), 1);
            prop_assert_eq!(p.iter().filter(|&&x| x == 0.0).count(), 2);
        }
    }
}
