//! Phase scheduling: which examples are warm start and which are interaction.
//!
//! The schedule is a pure function of the example index ([`PhaseSchedule::classify`]).
//! The stateful [`PhaseScheduler`] walks the stream one index at a time and reports a
//! [`PhaseTransition`] exactly once per crossing from warm start into interaction.
//!
//! Default schedule (no `interleave`):
//!
//! ```text
//!   index:  0 .. warm_start_period   | warm_start_period ..
//!   phase:  WarmStart                | Interaction (never returns)
//! ```
//!
//! With `interleave = { interaction_block = I, warm_start_block = W }` the stream
//! continues after the initial warm start as `I` interaction examples, `W` warm-start
//! examples, `I` interaction examples, and so on.

use serde::{Deserialize, Serialize};

use crate::WarmCbError;

/// Training regime of one example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Full-information examples: every action's cost is known.
    WarmStart,
    /// Bandit examples: only the taken action's cost is observed.
    Interaction,
}

/// Repeated warm-start / interaction blocks after the initial warm start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interleave {
    /// Interaction examples per block (must be > 0).
    pub interaction_block: u64,
    /// Warm-start examples per block (must be > 0).
    pub warm_start_block: u64,
}

/// Deterministic phase schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseSchedule {
    /// Length of the initial warm-start phase.
    pub warm_start_period: u64,
    /// Number of interaction examples that are learned from (`None` = unbounded).
    ///
    /// Interaction examples past this budget are still predicted.
    pub interaction_period: Option<u64>,
    /// Optional repeated blocks.
    pub interleave: Option<Interleave>,
}

impl PhaseSchedule {
    pub(crate) fn validate(&self) -> Result<(), WarmCbError> {
        if let Some(il) = self.interleave {
            if il.interaction_block == 0 || il.warm_start_block == 0 {
                return Err(WarmCbError::EmptyInterleaveBlock);
            }
        }
        Ok(())
    }

    /// Phase of the example at `index` (0-based position in the labeled stream).
    #[must_use]
    pub fn classify(&self, index: u64) -> Phase {
        if index < self.warm_start_period {
            return Phase::WarmStart;
        }
        match self.interleave {
            None => Phase::Interaction,
            Some(il) => {
                let cycle = il.interaction_block.saturating_add(il.warm_start_block).max(1);
                if (index - self.warm_start_period) % cycle < il.interaction_block {
                    Phase::Interaction
                } else {
                    Phase::WarmStart
                }
            }
        }
    }

    /// Number of interaction examples strictly before `index`.
    #[must_use]
    pub fn interactions_before(&self, index: u64) -> u64 {
        if index <= self.warm_start_period {
            return 0;
        }
        let m = index - self.warm_start_period;
        match self.interleave {
            None => m,
            Some(il) => {
                let cycle = il.interaction_block.saturating_add(il.warm_start_block).max(1);
                (m / cycle) * il.interaction_block + (m % cycle).min(il.interaction_block)
            }
        }
    }

    /// Whether the example at `index` should be learned from.
    #[must_use]
    pub fn learns(&self, index: u64) -> bool {
        match self.classify(index) {
            Phase::WarmStart => true,
            Phase::Interaction => self
                .interaction_period
                .map_or(true, |budget| self.interactions_before(index) < budget),
        }
    }
}

/// Emitted when the stream crosses from warm start into interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Index of the first interaction example of this block.
    pub index: u64,
    /// Warm-start examples seen before this point.
    pub warm_start_examples: u64,
    /// 1 for the first crossing, 2 for the next (interleaved schedules only), ...
    pub ordinal: u64,
}

/// One scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseStep {
    pub index: u64,
    pub phase: Phase,
    /// `false` when the interaction budget is exhausted.
    pub learn: bool,
    pub transition: Option<PhaseTransition>,
}

/// Serializable scheduler position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerState {
    /// Index of the next example.
    pub position: u64,
    /// Transitions emitted so far.
    pub transitions: u64,
    /// Phase of the previous example.
    pub last_phase: Option<Phase>,
}

/// Walks the schedule one example at a time.
#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    schedule: PhaseSchedule,
    state: SchedulerState,
}

impl PhaseScheduler {
    pub fn new(schedule: PhaseSchedule) -> Result<Self, WarmCbError> {
        schedule.validate()?;
        Ok(Self {
            schedule,
            state: SchedulerState::default(),
        })
    }

    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    /// Index the next call to [`advance`](Self::advance) will return.
    pub fn position(&self) -> u64 {
        self.state.position
    }

    /// Phase of the next example, without consuming it.
    pub fn peek(&self) -> Phase {
        self.schedule.classify(self.state.position)
    }

    /// Consume one index.
    pub fn advance(&mut self) -> PhaseStep {
        let index = self.state.position;
        let phase = self.schedule.classify(index);
        let transition = if phase == Phase::Interaction
            && self.state.last_phase != Some(Phase::Interaction)
        {
            self.state.transitions += 1;
            Some(PhaseTransition {
                index,
                warm_start_examples: index - self.schedule.interactions_before(index),
                ordinal: self.state.transitions,
            })
        } else {
            None
        };
        self.state.position = index.saturating_add(1);
        self.state.last_phase = Some(phase);
        PhaseStep {
            index,
            phase,
            learn: self.schedule.learns(index),
            transition,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub(crate) fn restore(&mut self, state: SchedulerState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn schedule(ws: u64) -> PhaseSchedule {
        PhaseSchedule {
            warm_start_period: ws,
            ..PhaseSchedule::default()
        }
    }

    #[test]
    fn warm_start_then_interaction_forever() {
        let s = schedule(3);
        let phases: Vec<Phase> = (0..6).map(|i| s.classify(i)).collect();
        assert_eq!(
            phases,
            vec![
                Phase::WarmStart,
                Phase::WarmStart,
                Phase::WarmStart,
                Phase::Interaction,
                Phase::Interaction,
                Phase::Interaction,
            ]
        );
        assert_eq!(s.classify(u64::MAX), Phase::Interaction);
    }

    #[test]
    fn transition_fires_exactly_once() {
        let mut sch = PhaseScheduler::new(schedule(2)).unwrap();
        let steps: Vec<PhaseStep> = (0..10).map(|_| sch.advance()).collect();
        let fired: Vec<&PhaseStep> = steps.iter().filter(|s| s.transition.is_some()).collect();
        assert_eq!(fired.len(), 1);
        let t = fired[0].transition.unwrap();
        assert_eq!(t.index, 2);
        assert_eq!(t.warm_start_examples, 2);
        assert_eq!(t.ordinal, 1);
    }

    #[test]
    fn empty_warm_start_still_signals_the_start_of_interaction() {
        let mut sch = PhaseScheduler::new(schedule(0)).unwrap();
        let first = sch.advance();
        assert_eq!(first.phase, Phase::Interaction);
        assert_eq!(first.transition.map(|t| t.warm_start_examples), Some(0));
        assert!(sch.advance().transition.is_none());
    }

    #[test]
    fn interaction_budget_stops_learning_but_not_the_phase() {
        let s = PhaseSchedule {
            warm_start_period: 2,
            interaction_period: Some(3),
            interleave: None,
        };
        let learns: Vec<bool> = (0..7).map(|i| s.learns(i)).collect();
        assert_eq!(learns, vec![true, true, true, true, true, false, false]);
        assert_eq!(s.classify(6), Phase::Interaction);
    }

    #[test]
    fn interleaved_blocks_alternate_and_signal_each_crossing() {
        let s = PhaseSchedule {
            warm_start_period: 2,
            interaction_period: None,
            interleave: Some(Interleave {
                interaction_block: 2,
                warm_start_block: 1,
            }),
        };
        let mut sch = PhaseScheduler::new(s).unwrap();
        let steps: Vec<PhaseStep> = (0..11).map(|_| sch.advance()).collect();
        let phases: Vec<Phase> = steps.iter().map(|s| s.phase).collect();
        use Phase::{Interaction as I, WarmStart as W};
        assert_eq!(phases, vec![W, W, I, I, W, I, I, W, I, I, W]);
        let crossings: Vec<u64> = steps
            .iter()
            .filter_map(|s| s.transition.map(|t| t.index))
            .collect();
        assert_eq!(crossings, vec![2, 5, 8]);
        assert_eq!(steps[5].transition.unwrap().warm_start_examples, 3);
    }

    #[test]
    fn empty_interleave_block_is_rejected() {
        let s = PhaseSchedule {
            warm_start_period: 1,
            interaction_period: None,
            interleave: Some(Interleave {
                interaction_block: 0,
                warm_start_block: 3,
            }),
        };
        assert!(matches!(
            PhaseScheduler::new(s),
            Err(WarmCbError::EmptyInterleaveBlock)
        ));
    }

    proptest! {
        #[test]
        fn interactions_before_matches_a_direct_count(
            ws in 0u64..20,
            ib in 1u64..5,
            wb in 1u64..5,
            interleave in any::<bool>(),
            n in 0u64..80,
        ) {
            let s = PhaseSchedule {
                warm_start_period: ws,
                interaction_period: None,
                interleave: interleave.then_some(Interleave { interaction_block: ib, warm_start_block: wb }),
            };
            let direct = (0..n).filter(|&i| s.classify(i) == Phase::Interaction).count() as u64;
            prop_assert_eq!(s.interactions_before(n), direct);
        }

        #[test]
        fn classify_is_pure(ws in 0u64..50, idx in 0u64..200) {
            let s = schedule(ws);
            prop_assert_eq!(s.classify(idx), s.classify(idx));
            prop_assert_eq!(s.classify(idx) == Phase::WarmStart, idx < ws);
        }
    }
}
