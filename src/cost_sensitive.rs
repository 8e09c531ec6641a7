//! Full-information targets: turning warm-start labels into per-action costs.

use crate::{Label, SkipReason};

/// Cost vector for a multiclass label: 0 for `correct`, 1 elsewhere.
pub fn multiclass_costs(correct: usize, num_actions: usize) -> Result<Vec<f64>, SkipReason> {
    if correct >= num_actions {
        return Err(SkipReason::ActionOutOfRange {
            action: correct,
            num_actions,
        });
    }
    let mut costs = vec![1.0; num_actions];
    costs[correct] = 0.0;
    Ok(costs)
}

/// Validate an explicit cost vector against the action space.
pub fn check_costs(costs: &[f64], num_actions: usize) -> Result<(), SkipReason> {
    if costs.len() != num_actions {
        return Err(SkipReason::CostVectorLength {
            expected: num_actions,
            found: costs.len(),
        });
    }
    if !costs.iter().all(|c| c.is_finite()) {
        return Err(SkipReason::NonFiniteCost);
    }
    Ok(())
}

/// Full-information cost vector for a label.
///
/// Returns `Ok(None)` for bandit labels, which carry no full-information target.
pub fn full_costs(label: &Label, num_actions: usize) -> Result<Option<Vec<f64>>, SkipReason> {
    match label {
        Label::Multiclass(c) => multiclass_costs(*c, num_actions).map(Some),
        Label::Costs(v) => {
            check_costs(v, num_actions)?;
            Ok(Some(v.clone()))
        }
        Label::Bandit(_) => Ok(None),
    }
}
