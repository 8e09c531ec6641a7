//! The warm-start contextual bandit reduction.
//!
//! Per labeled example, [`WarmCb::process`]:
//!
//! 1. advances the phase scheduler (emitting a transition when interaction begins),
//! 2. predicts: picks a candidate (largest λ during warm start, otherwise sampled from
//!    the model selector), computes its exploration distribution and samples an action,
//! 3. learns:
//!    - warm start: per-action costs from the label (optionally corrupted first), or
//!      simulated bandit feedback for `warm_start_type = bandit`;
//!    - interaction: an importance-weighted cost estimate; the selector is charged with
//!      each candidate's greedy loss *before* the ensemble is updated.
//!
//! When the caller acts on a [`WarmCb::predict`] and later reports the cost, it hands
//! that decision back through [`WarmCb::process_feedback`]: no new decision is drawn
//! and the update is attributed to the candidate that acted. A bandit label given to
//! plain [`WarmCb::process`] is treated as logged by some other policy.
//!
//! Selector losses are normalised before the exponential weights. With `B` the largest
//! estimate the weighter can produce (`max_cost` over the smallest probability any
//! action is guaranteed, after debiasing), Hedge sees `loss / B` in `[-1, 1]` and
//! EXP3-IX sees the observed cost over `max_cost` in `[0, 1]`.
//!
//! Unlabeled examples are predicted without consuming a schedule position.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::{WarmCbConfig, WarmStartPrediction, WarmStartType};
use crate::cost_sensitive::full_costs;
use crate::decision::{Decision, DecisionNote};
use crate::ensemble::{CandidateEnsemble, EnsembleState};
use crate::explore;
use crate::importance::ImportanceWeighter;
use crate::learner::BaseLearner;
use crate::phase::{PhaseScheduler, PhaseStep, PhaseTransition, SchedulerState};
use crate::selector::{ModelSelector, SelectorRule, SelectorState};
use crate::{BanditFeedback, Example, Label, Phase, SkipReason, WarmCbError};

/// Checkpoint format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Running counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WarmCbStats {
    /// Every example passed to `process`, labeled or not.
    pub examples: u64,
    /// Examples without a label (predicted only).
    pub unlabeled: u64,
    /// Labeled examples scheduled in warm start.
    pub warm_start_examples: u64,
    /// Labeled examples scheduled in interaction.
    pub interaction_examples: u64,
    /// Warm-start examples that updated the ensemble.
    pub warm_start_learned: u64,
    /// Interaction examples that updated the ensemble and the selector.
    pub interaction_learned: u64,
    /// Examples whose label could not be used.
    pub skipped: u64,
    /// Warm-start labels changed by the corruption simulator.
    pub corrupted_labels: u64,
    /// Sum of every revealed interaction cost.
    pub cumulative_interaction_cost: f64,
    /// Entries into the interaction phase.
    pub transitions: u64,
}

/// Outcome of [`WarmCb::process`].
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub decision: Decision,
    /// `None` for unlabeled examples.
    pub step: Option<PhaseStep>,
    pub transition: Option<PhaseTransition>,
    /// Why learning was skipped, if it was.
    pub skipped: Option<SkipReason>,
    /// Whether the ensemble was updated.
    pub learned: bool,
}

/// Everything needed to resume a run, as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmCbSnapshot<S> {
    pub version: u32,
    pub config: WarmCbConfig,
    pub learner: S,
    pub ensemble: EnsembleState,
    pub selector: SelectorState,
    pub scheduler: SchedulerState,
    pub rng: ChaCha8Rng,
    pub stats: WarmCbStats,
}

/// Warm-start contextual bandit over a λ-indexed ensemble.
#[derive(Debug)]
pub struct WarmCb<L: BaseLearner> {
    cfg: WarmCbConfig,
    learner: L,
    scheduler: PhaseScheduler,
    ensemble: CandidateEnsemble,
    selector: ModelSelector,
    weighter: ImportanceWeighter,
    rng: ChaCha8Rng,
    stats: WarmCbStats,
}

struct Parts {
    scheduler: PhaseScheduler,
    ensemble: CandidateEnsemble,
    selector: ModelSelector,
    weighter: ImportanceWeighter,
}

fn build_parts(cfg: &WarmCbConfig) -> Result<Parts, WarmCbError> {
    cfg.validate()?;
    let scheduler = PhaseScheduler::new(cfg.schedule())?;
    let ensemble = CandidateEnsemble::new(
        &cfg.lambda_candidates,
        cfg.num_actions,
        cfg.exploration,
        cfg.phase_weights(),
    )?;
    let selector = ModelSelector::new(cfg.selector, ensemble.len())?;
    let weighter = ImportanceWeighter::new(cfg.probability_floor, cfg.corruption_probability);
    Ok(Parts {
        scheduler,
        ensemble,
        selector,
        weighter,
    })
}

impl<L: BaseLearner> WarmCb<L> {
    /// Validate `cfg` and set up the ensemble over `learner`.
    pub fn new(cfg: WarmCbConfig, mut learner: L) -> Result<Self, WarmCbError> {
        let parts = build_parts(&cfg)?;
        learner.reserve(parts.ensemble.slots(), cfg.num_actions);
        info!(
            num_actions = cfg.num_actions,
            candidates = parts.ensemble.len(),
            exploration = cfg.exploration.name(),
            warm_start_period = cfg.warm_start_period,
            seed = cfg.random_seed,
            "warm-start contextual bandit ready"
        );
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(cfg.random_seed),
            cfg,
            learner,
            scheduler: parts.scheduler,
            ensemble: parts.ensemble,
            selector: parts.selector,
            weighter: parts.weighter,
            stats: WarmCbStats::default(),
        })
    }

    pub fn config(&self) -> &WarmCbConfig {
        &self.cfg
    }

    pub fn learner(&self) -> &L {
        &self.learner
    }

    pub fn into_learner(self) -> L {
        self.learner
    }

    /// Phase the next labeled example will be in.
    pub fn phase(&self) -> Phase {
        self.scheduler.peek()
    }

    /// Schedule position of the next labeled example.
    pub fn position(&self) -> u64 {
        self.scheduler.position()
    }

    pub fn stats(&self) -> &WarmCbStats {
        &self.stats
    }

    pub fn ensemble(&self) -> &CandidateEnsemble {
        &self.ensemble
    }

    /// λ of every candidate, ascending.
    pub fn lambdas(&self) -> Vec<f64> {
        self.ensemble.lambdas()
    }

    /// Current model-selector distribution over candidates.
    pub fn selector_probabilities(&self) -> &[f64] {
        self.selector.probabilities()
    }

    /// Per-candidate, per-action cost predictions for `features`.
    pub fn candidate_scores(&self, features: &L::Features) -> Vec<Vec<f64>> {
        (0..self.ensemble.len())
            .map(|i| self.ensemble.scores(&self.learner, i, features))
            .collect()
    }

    /// Forget the selector's accumulated losses.
    pub fn reset_selector(&mut self) {
        self.selector.reset();
    }

    /// Predict without learning or advancing the schedule.
    pub fn predict(&mut self, features: &L::Features) -> Decision {
        let phase = self.scheduler.peek();
        self.decide(features, phase)
    }

    fn decide(&mut self, features: &L::Features, phase: Phase) -> Decision {
        let mut notes = Vec::new();
        let trust = phase == Phase::WarmStart
            && self.cfg.warm_start_prediction == WarmStartPrediction::TrustWarmStart;
        let candidate = if trust {
            notes.push(DecisionNote::TrustedWarmStart);
            self.ensemble.max_lambda_index()
        } else {
            match self.selector.sample(&mut self.rng) {
                Some(s) => {
                    notes.push(DecisionNote::SampledCandidate {
                        probability: s.probability,
                    });
                    s.index
                }
                None => self.ensemble.max_lambda_index(),
            }
        };

        let scores = self.ensemble.scores(&self.learner, candidate, features);
        let tied = explore::argmin_set(&scores).len();
        if tied > 1 {
            notes.push(DecisionNote::TiedScores { tied });
        }

        let probs = self.ensemble.distribution(&self.learner, candidate, features);
        let (action, probability) = match explore::sample(&probs, &mut self.rng) {
            Some(s) => {
                notes.push(DecisionNote::SampledFromDistribution);
                if s.fallback {
                    notes.push(DecisionNote::NumericalFallbackToLastAction);
                }
                (s.index, s.probability)
            }
            None => (0, 1.0),
        };
        let lambda = self
            .ensemble
            .candidates()
            .get(candidate)
            .map_or(0.0, |c| c.lambda);
        trace!(action, probability, candidate, lambda, ?phase, "decision");
        Decision {
            action,
            probability,
            candidate,
            lambda,
            phase,
            probs,
            notes,
        }
    }

    /// Predict on one example, then learn from it.
    pub fn process(&mut self, example: &Example<L::Features>) -> Processed {
        self.step(example, None)
    }

    /// Learn from the outcome of `decision`, an earlier [`predict`](Self::predict) on
    /// the same features. No new decision is drawn; the returned one is `decision`.
    pub fn process_feedback(
        &mut self,
        example: &Example<L::Features>,
        decision: &Decision,
    ) -> Processed {
        self.step(example, Some(decision.clone()))
    }

    fn step(&mut self, example: &Example<L::Features>, decided: Option<Decision>) -> Processed {
        self.stats.examples += 1;
        let Some(label) = &example.label else {
            self.stats.unlabeled += 1;
            let decision = match decided {
                Some(d) => d,
                None => self.predict(&example.features),
            };
            return Processed {
                decision,
                step: None,
                transition: None,
                skipped: None,
                learned: false,
            };
        };

        let step = self.scheduler.advance();
        if let Some(t) = step.transition {
            self.stats.transitions += 1;
            info!(
                index = t.index,
                warm_start_examples = t.warm_start_examples,
                ordinal = t.ordinal,
                "entering interaction phase"
            );
        }

        let decision = match decided {
            Some(d) => d,
            None => self.decide(&example.features, step.phase),
        };
        let outcome = match step.phase {
            Phase::WarmStart => {
                self.stats.warm_start_examples += 1;
                self.learn_warm_start(&example.features, label, &decision, step.learn)
            }
            Phase::Interaction => {
                self.stats.interaction_examples += 1;
                self.learn_interaction(&example.features, label, &decision, step.learn)
            }
        };

        let (learned, skipped) = match outcome {
            Ok(learned) => (learned, None),
            Err(reason) => {
                self.stats.skipped += 1;
                warn!(index = step.index, phase = ?step.phase, %reason, "skipping example");
                (false, Some(reason))
            }
        };
        Processed {
            decision,
            step: Some(step),
            transition: step.transition,
            skipped,
            learned,
        }
    }

    fn corrupt(&mut self, label: &Label) -> Label {
        match (label, &self.cfg.warm_start_corruption) {
            (Label::Multiclass(c), Some(corruption)) => {
                let out = corruption.corrupt(*c, self.cfg.num_actions, &mut self.rng);
                if out != *c {
                    self.stats.corrupted_labels += 1;
                }
                Label::Multiclass(out)
            }
            _ => label.clone(),
        }
    }

    /// Bandit feedback for the decision's action, from a full label.
    fn simulate(
        &self,
        label: &Label,
        decision: &Decision,
    ) -> Result<BanditFeedback, SkipReason> {
        match label {
            Label::Bandit(fb) => Ok(*fb),
            full => {
                let costs = full_costs(full, self.cfg.num_actions)?.unwrap_or_default();
                let cost = costs.get(decision.action).copied().ok_or(
                    SkipReason::ActionOutOfRange {
                        action: decision.action,
                        num_actions: costs.len(),
                    },
                )?;
                Ok(BanditFeedback {
                    action: decision.action,
                    cost,
                    probability: decision.probability,
                })
            }
        }
    }

    fn learn_warm_start(
        &mut self,
        features: &L::Features,
        label: &Label,
        decision: &Decision,
        learn: bool,
    ) -> Result<bool, SkipReason> {
        let label = self.corrupt(label);
        let target = match self.cfg.warm_start_type {
            WarmStartType::Supervised => match full_costs(&label, self.cfg.num_actions)? {
                Some(costs) => costs,
                None => {
                    return Err(SkipReason::PhaseMismatch {
                        phase: Phase::WarmStart,
                        label: label.kind(),
                    })
                }
            },
            WarmStartType::Bandit => {
                let fb = self.simulate(&label, decision)?;
                self.weighter.estimate(&fb, self.cfg.num_actions)?
            }
        };
        if !(learn && self.cfg.learn_warm_start) {
            return Ok(false);
        }
        self.ensemble.learn(
            &mut self.learner,
            features,
            &target,
            Phase::WarmStart,
            &mut self.rng,
        );
        self.stats.warm_start_learned += 1;
        Ok(true)
    }

    fn learn_interaction(
        &mut self,
        features: &L::Features,
        label: &Label,
        decision: &Decision,
        learn: bool,
    ) -> Result<bool, SkipReason> {
        let fb = self.simulate(label, decision)?;
        let estimate = self.weighter.estimate(&fb, self.cfg.num_actions)?;
        self.stats.cumulative_interaction_cost += fb.cost;
        if !(learn && self.cfg.learn_interaction) {
            return Ok(false);
        }

        // Charge candidates before anyone learns from this example.
        if let Some(losses) = self.selector_losses(features, &fb, &estimate, decision) {
            self.selector.update(decision.candidate, &losses);
        }

        self.ensemble.learn(
            &mut self.learner,
            features,
            &estimate,
            Phase::Interaction,
            &mut self.rng,
        );
        self.stats.interaction_learned += 1;
        Ok(true)
    }

    /// Largest `|estimate|` the weighter produces for costs within `selector.max_cost`
    /// on actions chosen by this reduction.
    fn loss_bound(&self) -> f64 {
        let max_cost = self.cfg.selector.max_cost;
        let spread = self
            .weighter
            .debias(max_cost)
            .abs()
            .max(self.weighter.debias(-max_cost).abs());
        let p_min = self
            .cfg
            .exploration
            .guaranteed_probability(self.cfg.num_actions)
            .max(self.weighter.probability_floor());
        spread / p_min
    }

    /// Normalised per-candidate losses, or `None` when the round reveals nothing about
    /// the candidate that acted (EXP3-IX on feedback for a different action).
    fn selector_losses(
        &self,
        features: &L::Features,
        fb: &BanditFeedback,
        estimate: &[f64],
        decision: &Decision,
    ) -> Option<Vec<f64>> {
        let k = self.ensemble.len();
        match self.cfg.selector.rule {
            SelectorRule::Exp3Ix => {
                if fb.action != decision.action {
                    return None;
                }
                let mut losses = vec![0.0; k];
                *losses.get_mut(decision.candidate)? =
                    self.weighter.debias(fb.cost) / self.cfg.selector.max_cost;
                Some(losses)
            }
            SelectorRule::Hedge | SelectorRule::FollowTheLeader => {
                let bound = self.loss_bound();
                let losses = (0..k)
                    .map(|i| {
                        let raw: f64 = self
                            .ensemble
                            .greedy_distribution(&self.learner, i, features)
                            .iter()
                            .zip(estimate)
                            .map(|(g, c)| g * c)
                            .sum();
                        raw / bound
                    })
                    .collect();
                Some(losses)
            }
        }
    }

    /// Capture the complete state.
    pub fn snapshot(&self) -> WarmCbSnapshot<L::State> {
        WarmCbSnapshot {
            version: SNAPSHOT_VERSION,
            config: self.cfg.clone(),
            learner: self.learner.save_state(),
            ensemble: self.ensemble.state(),
            selector: self.selector.state().clone(),
            scheduler: self.scheduler.state(),
            rng: self.rng.clone(),
            stats: self.stats,
        }
    }

    /// Replace the complete state. On error nothing is changed.
    pub fn restore(&mut self, snap: WarmCbSnapshot<L::State>) -> Result<(), WarmCbError> {
        if snap.version != SNAPSHOT_VERSION {
            return Err(WarmCbError::CheckpointMismatch {
                what: "format version",
                expected: SNAPSHOT_VERSION as usize,
                found: snap.version as usize,
            });
        }
        let mut parts = build_parts(&snap.config)?;
        parts.ensemble.restore(snap.ensemble)?;
        parts.selector.restore(snap.selector)?;
        parts.scheduler.restore(snap.scheduler);
        if !snap.stats.cumulative_interaction_cost.is_finite() {
            return Err(WarmCbError::CheckpointCorrupt("stats"));
        }
        // Last fallible step; the learner leaves itself untouched on error.
        self.learner.load_state(snap.learner)?;
        self.learner
            .reserve(parts.ensemble.slots(), snap.config.num_actions);

        self.cfg = snap.config;
        self.scheduler = parts.scheduler;
        self.ensemble = parts.ensemble;
        self.selector = parts.selector;
        self.weighter = parts.weighter;
        self.rng = snap.rng;
        self.stats = snap.stats;
        debug!(
            position = self.scheduler.position(),
            phase = ?self.scheduler.peek(),
            "restored from snapshot"
        );
        Ok(())
    }

    /// Serialize [`snapshot`](Self::snapshot) to JSON bytes.
    pub fn save_state(&self) -> Result<Vec<u8>, WarmCbError> {
        Ok(serde_json::to_vec(&self.snapshot())?)
    }

    /// Decode bytes written by [`save_state`](Self::save_state) and restore them.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), WarmCbError> {
        let snap: WarmCbSnapshot<L::State> = serde_json::from_slice(bytes)?;
        self.restore(snap)
    }
}
