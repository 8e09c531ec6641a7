//! Seeded corruption of warm-start labels.
//!
//! Used to study how the reduction behaves when warm-start supervision is
//! systematically wrong. Corruption only touches `Multiclass` warm-start labels.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::WarmCbError;

/// How a corrupted label is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CorruptionKind {
    /// Replace with an action drawn uniformly from all actions (may keep the label).
    Uniform,
    /// Shift to the next action, wrapping around.
    Circular,
    /// Replace with a fixed action.
    Overwrite { label: usize },
}

/// Corrupt each warm-start label independently with `probability`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelCorruption {
    #[serde(flatten)]
    pub kind: CorruptionKind,
    pub probability: f64,
}

impl LabelCorruption {
    pub(crate) fn validate(&self, num_actions: usize) -> Result<(), WarmCbError> {
        if !(self.probability.is_finite() && (0.0..=1.0).contains(&self.probability)) {
            return Err(WarmCbError::InvalidParameter {
                name: "warm_start_corruption.probability",
                value: self.probability,
                reason: "must lie in [0, 1]",
            });
        }
        if let CorruptionKind::Overwrite { label } = self.kind {
            if label >= num_actions {
                return Err(WarmCbError::OverwriteLabelOutOfRange { label, num_actions });
            }
        }
        Ok(())
    }

    /// Possibly rewrite `label`. Draws exactly one coin per call, plus one action
    /// draw for a corrupted `Uniform` label.
    pub fn corrupt<R: Rng + ?Sized>(&self, label: usize, num_actions: usize, rng: &mut R) -> usize {
        if num_actions == 0 {
            return label;
        }
        let coin: f64 = rng.random();
        if coin >= self.probability {
            return label;
        }
        match self.kind {
            CorruptionKind::Uniform => rng.random_range(0..num_actions),
            CorruptionKind::Circular => (label + 1) % num_actions,
            CorruptionKind::Overwrite { label: fixed } => fixed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    #[test]
    fn zero_probability_never_corrupts() {
        let c = LabelCorruption {
            kind: CorruptionKind::Circular,
            probability: 0.0,
        };
        let mut r = rng();
        for l in 0..50 {
            assert_eq!(c.corrupt(l % 3, 3, &mut r), l % 3);
        }
    }

    #[test]
    fn certain_circular_corruption_shifts_every_label() {
        let c = LabelCorruption {
            kind: CorruptionKind::Circular,
            probability: 1.0,
        };
        let mut r = rng();
        assert_eq!(c.corrupt(0, 3, &mut r), 1);
        assert_eq!(c.corrupt(2, 3, &mut r), 0);
    }

    #[test]
    fn overwrite_pins_the_label() {
        let c = LabelCorruption {
            kind: CorruptionKind::Overwrite { label: 2 },
            probability: 1.0,
        };
        let mut r = rng();
        assert_eq!(c.corrupt(0, 3, &mut r), 2);
        assert!(matches!(
            LabelCorruption {
                kind: CorruptionKind::Overwrite { label: 3 },
                probability: 0.5,
            }
            .validate(3),
            Err(WarmCbError::OverwriteLabelOutOfRange { .. })
        ));
    }

    #[test]
    fn uniform_corruption_stays_in_range() {
        let c = LabelCorruption {
            kind: CorruptionKind::Uniform,
            probability: 1.0,
        };
        let mut r = rng();
        for _ in 0..200 {
            assert!(c.corrupt(1, 4, &mut r) < 4);
        }
    }

    #[test]
    fn probability_must_be_a_probability() {
        let c = LabelCorruption {
            kind: CorruptionKind::Uniform,
            probability: 1.5,
        };
        assert!(c.validate(3).is_err());
    }

    #[test]
    fn parses_from_toml() {
        let c: LabelCorruption = toml::from_str("kind = \"overwrite\"\nlabel = 1\nprobability = 0.3").unwrap();
        assert_eq!(c.kind, CorruptionKind::Overwrite { label: 1 });
        assert_eq!(c.probability, 0.3);
    }
}
