//! This module contains the weighted random scheduling policy and the metrics
//! it can weigh states by.

use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    constant::{
        COVERING_NEW_GRACE_INSTRUCTIONS,
        MINIMUM_QUERY_COST_SECONDS,
        UNKNOWN_UNCOVERED_DISTANCE,
    },
    data::weighted_tree::WeightedTree,
    error::{scheduling::Error, Result},
    scheduler::{check_update, Scheduler},
    state::{StateId, StateView},
};

/// The metrics by which a [`WeightedScheduler`] weighs live states.
///
/// Higher weights make a state more likely to be selected.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMetric {
    /// Prefer deep states, weighing each by its depth.
    Depth,

    /// Weigh each state by `0.5^depth`, which gives the same distribution as
    /// a random walk down a balanced fork history.
    RandomPath,

    /// Prefer states about to execute rarely executed instructions.
    InstructionCount,

    /// Prefer states whose call path has executed few instructions.
    CallPathInstructionCount,

    /// Prefer states whose solver queries have been cheap.
    QueryCost,

    /// Prefer states close to code that no state has executed yet.
    MinDistanceToUncovered,

    /// Like [`Self::MinDistanceToUncovered`], but additionally prefer states
    /// that covered new code recently.
    CoveringNew,
}

impl WeightMetric {
    /// Computes the weight of the state described by `view`.
    ///
    /// Every weight is finite and non-negative.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Counters far below 2^52 in practice
    pub fn weight(self, view: &StateView) -> f64 {
        match self {
            Self::Depth => f64::from(view.depth),
            Self::RandomPath => 0.5f64.powi(i32::try_from(view.depth).unwrap_or(i32::MAX)),
            Self::InstructionCount => {
                let inverse = 1.0 / view.instruction_visits.max(1) as f64;
                inverse * inverse
            }
            Self::CallPathInstructionCount => 1.0 / view.call_path_instructions.max(1) as f64,
            Self::QueryCost => {
                let cost = view.query_cost.as_secs_f64();
                if cost < MINIMUM_QUERY_COST_SECONDS {
                    1.0
                } else {
                    1.0 / cost
                }
            }
            Self::MinDistanceToUncovered => inverse_distance_squared(view),
            Self::CoveringNew => {
                let since = view.instructions_since_new_coverage;
                let recency = if since == 0 {
                    0.0
                } else {
                    1.0 / since.saturating_sub(COVERING_NEW_GRACE_INSTRUCTIONS).max(1) as f64
                };
                inverse_distance_squared(view) + recency * recency
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn inverse_distance_squared(view: &StateView) -> f64 {
    let distance = match view.distance_to_uncovered {
        0 => UNKNOWN_UNCOVERED_DISTANCE,
        d => d,
    };
    let inverse = 1.0 / distance as f64;
    inverse * inverse
}

/// A scheduler that advances a random live state, with each state chosen with
/// probability proportional to its weight under a [`WeightMetric`].
///
/// Added states are weighed when they are added, and the advanced state is
/// re-weighed every time it is reported as `current`.
#[derive(Clone, Debug)]
pub struct WeightedScheduler {
    /// The distribution over live states.
    states: WeightedTree<StateId>,

    /// How states are weighed.
    metric: WeightMetric,

    /// The source of randomness for selection.
    rng: StdRng,
}

impl WeightedScheduler {
    /// Constructs a new scheduler holding no states that weighs states by
    /// `metric` and draws from `rng`.
    #[must_use]
    pub fn new(metric: WeightMetric, rng: StdRng) -> Self {
        let states = WeightedTree::new();
        Self {
            states,
            metric,
            rng,
        }
    }

    /// Gets the metric by which states are weighed.
    #[must_use]
    pub fn metric(&self) -> WeightMetric {
        self.metric
    }

    /// Gets the current weight of `state`, if it is held.
    #[must_use]
    pub fn weight_of(&self, state: StateId) -> Option<f64> {
        self.states.weight(&state).ok()
    }
}

impl Scheduler for WeightedScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        if self.states.is_empty() {
            return Err(Error::NoLiveStates.into());
        }
        let fraction: f64 = self.rng.gen();

        Ok(self.states.choose(fraction)?)
    }

    fn update(
        &mut self,
        current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        check_update(|s| self.states.contains(&s), added, removed)?;

        if let Some(current) = current {
            if self.states.contains(&current.id) && !removed.contains(&current.id) {
                self.states.update(&current.id, self.metric.weight(&current))?;
            }
        }

        for view in added {
            self.states.insert(view.id, self.metric.weight(view))?;
        }

        for state in removed {
            self.states.remove(state)?;
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn name(&self) -> String {
        format!("Weighted({:?})", self.metric)
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, time::Duration};

    use rand::{rngs::StdRng, SeedableRng};

    use crate::{
        scheduler::{Scheduler, WeightMetric, WeightedScheduler},
        state::{StateId, StateView},
    };

    #[test]
    fn metrics_follow_their_formulas() {
        let view = StateView::new(0, 3, 100);
        assert_eq!(WeightMetric::Depth.weight(&view), 3.0);
        assert_eq!(WeightMetric::RandomPath.weight(&view), 0.125);

        assert_eq!(WeightMetric::InstructionCount.weight(&view), 1.0);
        let visited = view.with_instruction_visits(4);
        assert_eq!(WeightMetric::InstructionCount.weight(&visited), 1.0 / 16.0);

        let call_path = view.with_call_path_instructions(8);
        assert_eq!(WeightMetric::CallPathInstructionCount.weight(&call_path), 0.125);

        let cheap = view.with_query_cost(Duration::from_millis(50));
        assert_eq!(WeightMetric::QueryCost.weight(&cheap), 1.0);
        let costly = view.with_query_cost(Duration::from_secs(4));
        assert_eq!(WeightMetric::QueryCost.weight(&costly), 0.25);

        assert!((WeightMetric::MinDistanceToUncovered.weight(&view) - 1e-8).abs() < 1e-20);
        let near = view.with_distance_to_uncovered(2);
        assert_eq!(WeightMetric::MinDistanceToUncovered.weight(&near), 0.25);

        // Without recent coverage only the distance term remains.
        assert_eq!(WeightMetric::CoveringNew.weight(&near), 0.25);
        let recent = near.with_instructions_since_new_coverage(500);
        assert_eq!(WeightMetric::CoveringNew.weight(&recent), 1.25);
        let stale = near.with_instructions_since_new_coverage(1002);
        assert_eq!(WeightMetric::CoveringNew.weight(&stale), 0.5);
    }

    #[test]
    fn selection_frequency_matches_weight_share() -> anyhow::Result<()> {
        let mut scheduler = WeightedScheduler::new(WeightMetric::Depth, StdRng::seed_from_u64(3));
        let added = [
            StateView::new(0, 1, 0),
            StateView::new(1, 2, 0),
            StateView::new(2, 5, 0),
        ];
        scheduler.update(None, &added, &[])?;

        let trials = 40_000;
        let mut counts: HashMap<StateId, usize> = HashMap::new();
        for _ in 0..trials {
            *counts.entry(scheduler.select_state()?).or_default() += 1;
        }
        for (view, expected) in added.iter().zip([0.125, 0.25, 0.625]) {
            let observed = counts[&view.id] as f64 / f64::from(trials);
            assert!((observed - expected).abs() < 0.02, "{observed} vs {expected}");
        }

        Ok(())
    }

    #[test]
    fn current_is_reweighed() -> anyhow::Result<()> {
        let mut scheduler = WeightedScheduler::new(WeightMetric::Depth, StdRng::seed_from_u64(4));
        scheduler.update(None, &[StateView::new(0, 1, 0), StateView::new(1, 1, 0)], &[])?;
        assert_eq!(scheduler.weight_of(StateId(0)), Some(1.0));

        scheduler.update(Some(StateView::new(0, 4, 30)), &[], &[])?;
        assert_eq!(scheduler.weight_of(StateId(0)), Some(4.0));

        // A current state that was removed is simply dropped.
        scheduler.update(Some(StateView::new(1, 9, 30)), &[], &[StateId(1)])?;
        assert_eq!(scheduler.weight_of(StateId(1)), None);
        assert_eq!(scheduler.select_state()?, StateId(0));
        assert_eq!(scheduler.name(), "Weighted(Depth)");

        Ok(())
    }
}
