//! Exploration strategies: from per-action scores to an action distribution.
//!
//! Scores follow the cost convention (lower is better). Every strategy is built from
//! two primitives:
//!
//! - a *greedy* distribution: uniform over the arg-min set (ties within
//!   [`TIEBREAK_EPS`] split the mass evenly, no randomness involved);
//! - a floor / uniform mix that keeps every action reachable.
//!
//! Sampling is CDF inversion with a single uniform draw from the caller's generator,
//! falling back to the last action with positive mass if rounding leaves `r` past
//! the end of the CDF.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::WarmCbError;

/// Scores within this distance of the minimum count as tied.
pub const TIEBREAK_EPS: f64 = 1e-12;

fn default_epsilon() -> f64 {
    0.05
}
fn default_bag_epsilon() -> f64 {
    0.0
}
fn default_size() -> usize {
    4
}
fn default_psi() -> f64 {
    1.0
}

/// Exploration strategy, tagged by `strategy` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum ExplorationConfig {
    /// `1 - epsilon` on the greedy action, `epsilon` spread uniformly.
    EpsilonGreedy {
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
    /// `size` bootstrap copies voting for their greedy action.
    Bag {
        #[serde(default = "default_size")]
        size: usize,
        #[serde(default = "default_bag_epsilon")]
        epsilon: f64,
    },
    /// One greedy policy plus `size` policies trained to cover neglected actions.
    Cover {
        #[serde(default = "default_size")]
        size: usize,
        #[serde(default = "default_psi")]
        psi: f64,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        ExplorationConfig::EpsilonGreedy {
            epsilon: default_epsilon(),
        }
    }
}

impl ExplorationConfig {
    /// Build a strategy with default parameters from its name.
    pub fn from_name(name: &str) -> Result<Self, WarmCbError> {
        match name {
            "epsilon-greedy" => Ok(Self::default()),
            "bag" => Ok(ExplorationConfig::Bag {
                size: default_size(),
                epsilon: default_bag_epsilon(),
            }),
            "cover" => Ok(ExplorationConfig::Cover {
                size: default_size(),
                psi: default_psi(),
                epsilon: default_epsilon(),
            }),
            other => Err(WarmCbError::UnknownExploration(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExplorationConfig::EpsilonGreedy { .. } => "epsilon-greedy",
            ExplorationConfig::Bag { .. } => "bag",
            ExplorationConfig::Cover { .. } => "cover",
        }
    }

    pub fn epsilon(&self) -> f64 {
        match *self {
            ExplorationConfig::EpsilonGreedy { epsilon }
            | ExplorationConfig::Bag { epsilon, .. }
            | ExplorationConfig::Cover { epsilon, .. } => epsilon,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), WarmCbError> {
        let eps = self.epsilon();
        if !(eps.is_finite() && (0.0..=1.0).contains(&eps)) {
            return Err(WarmCbError::InvalidParameter {
                name: "exploration.epsilon",
                value: eps,
                reason: "must lie in [0, 1]",
            });
        }
        match *self {
            ExplorationConfig::EpsilonGreedy { .. } => {}
            ExplorationConfig::Bag { size, .. } | ExplorationConfig::Cover { size, .. }
                if size == 0 =>
            {
                return Err(WarmCbError::InvalidParameter {
                    name: "exploration.size",
                    value: 0.0,
                    reason: "must be at least 1",
                });
            }
            ExplorationConfig::Cover { psi, .. } if !(psi.is_finite() && psi >= 0.0) => {
                return Err(WarmCbError::InvalidParameter {
                    name: "exploration.psi",
                    value: psi,
                    reason: "must be finite and non-negative",
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Probability every action keeps in every round, independent of the scores.
    ///
    /// Cover's floor shrinks with the round count, so it guarantees nothing fixed.
    pub fn guaranteed_probability(&self, num_actions: usize) -> f64 {
        match *self {
            ExplorationConfig::EpsilonGreedy { epsilon }
            | ExplorationConfig::Bag { epsilon, .. } => epsilon / num_actions.max(1) as f64,
            ExplorationConfig::Cover { .. } => 0.0,
        }
    }

    /// Base-learner slots one candidate needs.
    pub fn policies_per_candidate(&self) -> usize {
        match *self {
            ExplorationConfig::EpsilonGreedy { .. } => 1,
            ExplorationConfig::Bag { size, .. } => size,
            ExplorationConfig::Cover { size, .. } => size + 1,
        }
    }
}

/// Indices of the minimal scores (non-finite scores never win unless all are).
pub fn argmin_set(scores: &[f64]) -> Vec<usize> {
    let key = |s: f64| if s.is_nan() { f64::INFINITY } else { s };
    let min = scores.iter().copied().map(key).fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        // All infinite or NaN: every action is equally bad.
        return (0..scores.len()).collect();
    }
    scores
        .iter()
        .enumerate()
        .filter(|(_, &s)| key(s) <= min + TIEBREAK_EPS)
        .map(|(i, _)| i)
        .collect()
}

/// Add `mass` split evenly over the arg-min set of `scores` into `out`.
pub fn add_greedy_mass(scores: &[f64], mass: f64, out: &mut [f64]) {
    let set = argmin_set(scores);
    if set.is_empty() {
        return;
    }
    let share = mass / set.len() as f64;
    for i in set {
        out[i] += share;
    }
}

/// Uniform over the arg-min set.
pub fn greedy(scores: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; scores.len()];
    add_greedy_mass(scores, 1.0, &mut out);
    out
}

/// Mix `probs` with `epsilon` uniform mass in place.
pub fn mix_uniform(probs: &mut [f64], epsilon: f64) {
    if probs.is_empty() || epsilon <= 0.0 {
        return;
    }
    let eps = epsilon.min(1.0);
    let u = eps / probs.len() as f64;
    for p in probs.iter_mut() {
        *p = (1.0 - eps) * *p + u;
    }
}

/// Guarantee every action at least `floor` (capped at `1/K`) by mixing with uniform:
/// `p' = (1 - K*floor) * p + floor`.
pub fn mix_floor(probs: &mut [f64], floor: f64) {
    if probs.is_empty() || floor.is_nan() || floor <= 0.0 {
        return;
    }
    let k = probs.len() as f64;
    let floor = floor.min(1.0 / k);
    mix_uniform(probs, floor * k);
}

/// `1 - epsilon` on the arg-min set, `epsilon / K` everywhere.
pub fn epsilon_greedy(scores: &[f64], epsilon: f64) -> Vec<f64> {
    let mut out = greedy(scores);
    mix_uniform(&mut out, epsilon);
    out
}

/// Minimum per-action probability kept by cover after `t` interaction rounds.
pub fn cover_min_probability(epsilon: f64, num_actions: usize, t: u64) -> f64 {
    let k = num_actions.max(1) as f64;
    let t = t.max(1) as f64;
    epsilon * (1.0 / k).min(1.0 / (t * k).sqrt())
}

/// Pseudo-costs for a cover diversity policy.
///
/// `covered[a]` is the mass already assigned to `a` by earlier policies. Actions with
/// little coverage get their cost lowered, pulling the next policy toward them.
pub fn cover_pseudo_costs(estimated: &[f64], covered: &[f64], min_prob: f64, psi: f64) -> Vec<f64> {
    let k = estimated.len() as f64;
    let norm = min_prob * k;
    estimated
        .iter()
        .zip(covered.iter())
        .map(|(&c, &p)| {
            let denom = p.max(min_prob);
            if denom > 0.0 {
                c - psi * min_prob * norm / denom
            } else {
                c
            }
        })
        .collect()
}

/// Result of sampling from a distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampled {
    pub index: usize,
    pub probability: f64,
    /// The CDF ran out before `r` and the last positive entry was taken.
    pub fallback: bool,
}

/// Draw an index from `probs` with one uniform variate from `rng`.
///
/// Returns `None` only for an empty distribution.
pub fn sample<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> Option<Sampled> {
    if probs.is_empty() {
        return None;
    }
    let r: f64 = rng.random();
    let mut cdf = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cdf += p;
        if r < cdf && p > 0.0 {
            return Some(Sampled {
                index: i,
                probability: p,
                fallback: false,
            });
        }
    }
    let index = probs.iter().rposition(|&p| p > 0.0).unwrap_or(probs.len() - 1);
    Some(Sampled {
        index,
        probability: probs[index],
        fallback: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sum(p: &[f64]) -> f64 {
        p.iter().sum()
    }

    #[test]
    fn epsilon_greedy_puts_the_bulk_on_the_cheapest_action() {
        let p = epsilon_greedy(&[0.7, 0.1, 0.4], 0.3);
        assert!((p[1] - 0.8).abs() < 1e-12);
        assert!((p[0] - 0.1).abs() < 1e-12);
        assert!((sum(&p) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn guaranteed_probability_matches_the_uniform_share() {
        let eg = ExplorationConfig::EpsilonGreedy { epsilon: 0.3 };
        assert!((eg.guaranteed_probability(3) - 0.1).abs() < 1e-12);
        let p = epsilon_greedy(&[0.7, 0.1, 0.4], 0.3);
        assert!(p.iter().all(|&x| x >= eg.guaranteed_probability(3) - 1e-12));
        assert_eq!(ExplorationConfig::from_name("cover").unwrap().guaranteed_probability(3), 0.0);
    }

    #[test]
    fn ties_split_the_greedy_mass() {
        let p = greedy(&[0.2, 0.2 + 1e-13, 0.9]);
        assert_eq!(p, vec![0.5, 0.5, 0.0]);
        let all = greedy(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(all, vec![0.25; 4]);
    }

    #[test]
    fn nan_scores_lose_to_finite_ones() {
        assert_eq!(argmin_set(&[f64::NAN, 3.0, f64::INFINITY]), vec![1]);
        assert_eq!(argmin_set(&[f64::NAN, f64::NAN]), vec![0, 1]);
    }

    #[test]
    fn floor_mix_lifts_every_action() {
        let mut p = vec![1.0, 0.0, 0.0, 0.0];
        mix_floor(&mut p, 0.05);
        assert!(p.iter().all(|&x| x >= 0.05 - 1e-15));
        assert!((sum(&p) - 1.0).abs() < 1e-12);
        // A floor above 1/K degenerates to uniform.
        let mut q = vec![1.0, 0.0];
        mix_floor(&mut q, 0.9);
        assert_eq!(q, vec![0.5, 0.5]);
    }

    #[test]
    fn cover_min_probability_shrinks_with_time() {
        let early = cover_min_probability(0.05, 4, 1);
        let late = cover_min_probability(0.05, 4, 10_000);
        assert!((early - 0.05 / 4.0).abs() < 1e-15);
        assert!(late < early);
    }

    #[test]
    fn pseudo_costs_favour_uncovered_actions() {
        let pc = cover_pseudo_costs(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0], 0.01, 1.0);
        assert!(pc[1] < pc[0]);
        assert_eq!(pc[1], pc[2]);
    }

    #[test]
    fn from_name_knows_every_strategy() {
        for name in ["epsilon-greedy", "bag", "cover"] {
            let c = ExplorationConfig::from_name(name).unwrap();
            assert_eq!(c.name(), name);
            c.validate().unwrap();
        }
        assert!(matches!(
            ExplorationConfig::from_name("softmax"),
            Err(WarmCbError::UnknownExploration(_))
        ));
    }

    #[test]
    fn policy_counts() {
        assert_eq!(ExplorationConfig::default().policies_per_candidate(), 1);
        assert_eq!(ExplorationConfig::Bag { size: 5, epsilon: 0.0 }.policies_per_candidate(), 5);
        assert_eq!(
            ExplorationConfig::Cover { size: 3, psi: 1.0, epsilon: 0.05 }.policies_per_candidate(),
            4
        );
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(ExplorationConfig::EpsilonGreedy { epsilon: 1.5 }.validate().is_err());
        assert!(ExplorationConfig::Bag { size: 0, epsilon: 0.1 }.validate().is_err());
        assert!(ExplorationConfig::Cover { size: 2, psi: -1.0, epsilon: 0.1 }.validate().is_err());
    }

    #[test]
    fn sampling_never_returns_a_zero_mass_action() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let probs = [0.0, 0.6, 0.0, 0.4];
        for _ in 0..500 {
            let s = sample(&probs, &mut rng).unwrap();
            assert!(s.index == 1 || s.index == 3);
            assert_eq!(s.probability, probs[s.index]);
        }
        assert!(sample(&[], &mut rng).is_none());
    }

    #[test]
    fn short_cdf_falls_back_to_last_positive_entry() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        // Mass sums to zero: every draw runs past the CDF.
        let s = sample(&[0.0, 0.0], &mut rng).unwrap();
        assert!(s.fallback);
        assert_eq!(s.index, 1);
    }

    proptest! {
        #[test]
        fn epsilon_greedy_is_a_distribution_with_a_floor(
            scores in proptest::collection::vec(-10.0f64..10.0, 1..8),
            eps in 0.0f64..1.0,
        ) {
            let p = epsilon_greedy(&scores, eps);
            prop_assert!((sum(&p) - 1.0).abs() < 1e-9);
            let k = scores.len() as f64;
            for &x in &p {
                prop_assert!(x >= eps / k - 1e-12);
            }
        }

        #[test]
        fn sampled_index_has_the_reported_probability(
            seed in any::<u64>(),
            raw in proptest::collection::vec(0.0f64..1.0, 1..6),
        ) {
            let total: f64 = raw.iter().sum();
            prop_assume!(total > 1e-6);
            let probs: Vec<f64> = raw.iter().map(|x| x / total).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let s = sample(&probs, &mut rng).unwrap();
            prop_assert!(s.index < probs.len());
            prop_assert!(s.probability > 0.0);
            prop_assert_eq!(s.probability, probs[s.index]);
        }
    }
}
