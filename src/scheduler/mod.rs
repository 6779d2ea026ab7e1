//! This module contains the scheduling policies that choose which execution
//! state the engine advances next.
//!
//! # Driving a Scheduler
//!
//! The engine alternates between two calls. It asks for a state with
//! [`Scheduler::select_state`], advances that state by one step, and then
//! reports the consequences through [`Scheduler::update`]: the state it just
//! advanced, any states that were forked off during the step, and any states
//! that disappeared. Every update for a step is delivered before the next
//! selection, and a state may disappear without ever having been selected.
//!
//! # Composition
//!
//! The core policies ([`DepthFirstScheduler`], [`BreadthFirstScheduler`],
//! [`RandomStateScheduler`], [`WeightedScheduler`] and
//! [`RandomPathScheduler`]) hold live states directly. The decorators
//! ([`BatchingScheduler`], [`IterativeDeepeningScheduler`] and
//! [`InterleavedScheduler`]) wrap other schedulers and change when or which
//! of them is consulted. [`build`] assembles the combination described by a
//! [`Config`].

pub mod batching;
pub mod breadth_first;
pub mod depth_first;
pub mod interleaved;
pub mod iterative_deepening;
pub mod random_path;
pub mod random_state;
pub mod weighted;

use std::{collections::HashSet, fmt::Debug, time::Duration};

pub use batching::BatchingScheduler;
pub use breadth_first::BreadthFirstScheduler;
pub use depth_first::DepthFirstScheduler;
pub use interleaved::InterleavedScheduler;
pub use iterative_deepening::IterativeDeepeningScheduler;
pub use random_path::RandomPathScheduler;
pub use random_state::RandomStateScheduler;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
pub use weighted::{WeightMetric, WeightedScheduler};

use crate::{
    clock::DynClock,
    constant::{
        DEFAULT_BATCH_INSTRUCTIONS,
        DEFAULT_BATCH_TIME,
        DEFAULT_BOUNDED_MERGE_ENABLED,
        DEFAULT_SEED,
    },
    error::{scheduling::Error, Result},
    forest::SharedForest,
    state::{StateId, StateView},
};

/// A dynamically dispatched [`Scheduler`] instance.
pub type DynScheduler = Box<dyn Scheduler>;

/// The interface shared by every scheduling policy.
pub trait Scheduler
where
    Self: Debug,
{
    /// Chooses the live state that the engine should advance next.
    ///
    /// Calling this repeatedly without an intervening [`Self::update`] may or
    /// may not return the same state, depending on the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the scheduler holds no live states.
    fn select_state(&mut self) -> Result<StateId>;

    /// Informs the scheduler of the outcome of the last step.
    ///
    /// `current` is the state that was just advanced, if any. `added` contains
    /// the states that came into existence during the step, and `removed` the
    /// states that disappeared. A state may be reported as `current` and as
    /// removed at the same time.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a state is added twice or an unknown state is
    /// removed. The scheduler is left unchanged in that case.
    fn update(
        &mut self,
        current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()>;

    /// Checks whether the scheduler holds no live states.
    #[must_use]
    fn is_empty(&self) -> bool;

    /// Gets a human-readable name for the policy, used in log output.
    #[must_use]
    fn name(&self) -> String;

    /// Boxes the scheduler for dynamic dispatch.
    #[must_use]
    fn boxed(self) -> DynScheduler
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl<S> Scheduler for Box<S>
where
    S: Scheduler + ?Sized,
{
    fn select_state(&mut self) -> Result<StateId> {
        (**self).select_state()
    }

    fn update(
        &mut self,
        current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        (**self).update(current, added, removed)
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/// Checks that an update is consistent with the states held by a scheduler,
/// where `holds` reports whether a state is already held.
///
/// Added states are applied before removed ones, so a state may be both added
/// and removed in the same update.
pub(crate) fn check_update(
    holds: impl Fn(StateId) -> bool,
    added: &[StateView],
    removed: &[StateId],
) -> Result<()> {
    let mut fresh = HashSet::with_capacity(added.len());
    for view in added {
        if holds(view.id) || !fresh.insert(view.id) {
            return Err(Error::DuplicateState { state: view.id }.into());
        }
    }

    let mut gone = HashSet::with_capacity(removed.len());
    for &state in removed {
        if !(holds(state) || fresh.contains(&state)) || !gone.insert(state) {
            return Err(Error::UnknownState { state }.into());
        }
    }

    Ok(())
}

/// The core scheduling policies.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Always advance the most recently added state.
    DepthFirst,

    /// Advance states in the order they were added.
    BreadthFirst,

    /// Advance a uniformly random state.
    RandomState,

    /// Walk the fork-history forest from a root, choosing a random child at
    /// every fork point.
    RandomPath,

    /// Advance a random state with probability proportional to its weight
    /// under the provided metric.
    Weighted(WeightMetric),
}

/// The configuration for the batching decorator.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BatchingConfig {
    /// How long the same state keeps being returned.
    ///
    /// Defaults to [`DEFAULT_BATCH_TIME`].
    pub time_budget: Duration,

    /// How many steps the same state keeps being returned for.
    ///
    /// Defaults to [`DEFAULT_BATCH_INSTRUCTIONS`].
    pub instruction_budget: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        let time_budget = DEFAULT_BATCH_TIME;
        let instruction_budget = DEFAULT_BATCH_INSTRUCTIONS;
        Self {
            time_budget,
            instruction_budget,
        }
    }
}

/// The configuration for merge-aware scheduling.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MergeConfig {
    /// Whether merge regions are given up on once their states run too far
    /// past the open point, instead of waiting for every state to close.
    ///
    /// Defaults to [`DEFAULT_BOUNDED_MERGE_ENABLED`].
    pub bounded: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        let bounded = DEFAULT_BOUNDED_MERGE_ENABLED;
        Self { bounded }
    }
}

/// The configuration for a complete scheduler.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// The core policies. A single policy is used directly, while several are
    /// interleaved in order.
    ///
    /// Defaults to [`SchedulerKind::RandomPath`] interleaved with a weighted
    /// policy using [`WeightMetric::CoveringNew`].
    pub core: Vec<SchedulerKind>,

    /// Whether and how to batch selections.
    ///
    /// Defaults to batching with the default [`BatchingConfig`].
    pub batching: Option<BatchingConfig>,

    /// Whether states are paused once they exceed a growing time budget.
    ///
    /// Defaults to `false`.
    pub iterative_deepening: bool,

    /// Whether and how to make scheduling merge-aware.
    ///
    /// Defaults to `None`.
    pub merge: Option<MergeConfig>,

    /// The seed from which every randomised policy derives its own random
    /// source.
    ///
    /// Defaults to [`DEFAULT_SEED`].
    pub seed: u64,
}

impl Config {
    /// Sets the `core` config parameter to `value`.
    #[must_use]
    pub fn with_core(mut self, value: Vec<SchedulerKind>) -> Self {
        self.core = value;
        self
    }

    /// Sets the `batching` config parameter to `value`.
    #[must_use]
    pub fn with_batching(mut self, value: Option<BatchingConfig>) -> Self {
        self.batching = value;
        self
    }

    /// Sets the `iterative_deepening` config parameter to `value`.
    #[must_use]
    pub fn with_iterative_deepening(mut self, value: bool) -> Self {
        self.iterative_deepening = value;
        self
    }

    /// Sets the `merge` config parameter to `value`.
    #[must_use]
    pub fn with_merge(mut self, value: Option<MergeConfig>) -> Self {
        self.merge = value;
        self
    }

    /// Sets the `seed` config parameter to `value`.
    #[must_use]
    pub fn with_seed(mut self, value: u64) -> Self {
        self.seed = value;
        self
    }

    /// Checks whether any configured policy walks the fork-history forest.
    #[must_use]
    pub fn needs_forest(&self) -> bool {
        self.core.contains(&SchedulerKind::RandomPath)
    }
}

impl Default for Config {
    fn default() -> Self {
        let core = vec![
            SchedulerKind::RandomPath,
            SchedulerKind::Weighted(WeightMetric::CoveringNew),
        ];
        let batching = Some(BatchingConfig::default());
        let iterative_deepening = false;
        let merge = None;
        let seed = DEFAULT_SEED;
        Self {
            core,
            batching,
            iterative_deepening,
            merge,
            seed,
        }
    }
}

/// Builds the scheduler described by `config`.
///
/// The core policies come first, interleaved if there are several of them,
/// then batching, and finally iterative deepening. Merge-awareness is added
/// on top by [`crate::merge::MergingScheduler::from_config`].
///
/// # Errors
///
/// Returns [`Err`] if no core policy is configured, or if a policy needs a
/// `forest` and none was provided.
pub fn build(
    config: &Config,
    forest: Option<SharedForest>,
    clock: DynClock,
) -> Result<DynScheduler> {
    if config.core.is_empty() {
        return Err(Error::NoCorePolicy.into());
    }

    let mut cores = config
        .core
        .iter()
        .enumerate()
        .map(|(position, kind)| build_core(*kind, seeded(config.seed, position), forest.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut scheduler = if cores.len() == 1 {
        cores.remove(0)
    } else {
        InterleavedScheduler::new(cores).boxed()
    };

    if let Some(batching) = config.batching {
        scheduler = BatchingScheduler::new(
            scheduler,
            batching.time_budget,
            batching.instruction_budget,
            clock.clone(),
        )
        .boxed();
    }

    if config.iterative_deepening {
        scheduler = IterativeDeepeningScheduler::new(scheduler, clock).boxed();
    }

    tracing::debug!(scheduler = scheduler.name(), "Built scheduler");

    Ok(scheduler)
}

/// Builds a single core policy of the provided `kind`.
fn build_core(
    kind: SchedulerKind,
    rng: StdRng,
    forest: Option<&SharedForest>,
) -> Result<DynScheduler> {
    let scheduler = match kind {
        SchedulerKind::DepthFirst => DepthFirstScheduler::new().boxed(),
        SchedulerKind::BreadthFirst => BreadthFirstScheduler::new().boxed(),
        SchedulerKind::RandomState => RandomStateScheduler::new(rng).boxed(),
        SchedulerKind::Weighted(metric) => WeightedScheduler::new(metric, rng).boxed(),
        SchedulerKind::RandomPath => {
            let forest = forest.ok_or(Error::MissingForest)?;
            RandomPathScheduler::new(forest.clone(), rng)?.boxed()
        }
    };

    Ok(scheduler)
}

/// Derives the random source for the policy at `position` from `seed`.
fn seeded(seed: u64, position: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(position as u64))
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        clock::ManualClock,
        error::{scheduling, Error},
        forest::ForkForest,
        scheduler::{
            build,
            check_update,
            BatchingConfig,
            Config,
            SchedulerKind,
            WeightMetric,
        },
        state::{StateId, StateView},
    };

    #[test]
    fn updates_are_checked_against_held_states() {
        let held = |s: StateId| s == StateId(0);
        let view = |id: u64| StateView::new(id, 0, 0);

        assert!(check_update(held, &[view(1)], &[StateId(0), StateId(1)]).is_ok());
        assert_eq!(
            check_update(held, &[view(0)], &[]),
            Err(scheduling::Error::DuplicateState { state: StateId(0) }.into())
        );
        assert_eq!(
            check_update(held, &[view(1), view(1)], &[]),
            Err(scheduling::Error::DuplicateState { state: StateId(1) }.into())
        );
        assert_eq!(
            check_update(held, &[], &[StateId(0), StateId(0)]),
            Err(scheduling::Error::UnknownState { state: StateId(0) }.into())
        );
        assert_eq!(
            check_update(held, &[], &[StateId(2)]),
            Err(scheduling::Error::UnknownState { state: StateId(2) }.into())
        );
    }

    #[test]
    fn build_composes_decorators_in_order() -> anyhow::Result<()> {
        let clock = ManualClock::new();
        let config = Config::default()
            .with_core(vec![
                SchedulerKind::DepthFirst,
                SchedulerKind::Weighted(WeightMetric::Depth),
            ])
            .with_batching(Some(BatchingConfig::default()))
            .with_iterative_deepening(true);

        let scheduler = build(&config, None, clock.in_rc())?;
        assert_eq!(
            scheduler.name(),
            "IterativeDeepening(Batching(Interleaved(DepthFirst, Weighted(Depth))))"
        );
        assert!(scheduler.is_empty());

        Ok(())
    }

    #[test]
    fn build_rejects_incomplete_configurations() {
        let clock = ManualClock::new();

        let config = Config::default().with_core(vec![]);
        assert_eq!(
            build(&config, None, clock.in_rc()).unwrap_err(),
            Error::from(scheduling::Error::NoCorePolicy)
        );

        let config = Config::default().with_core(vec![SchedulerKind::RandomPath]);
        assert!(config.needs_forest());
        assert_eq!(
            build(&config, None, clock.in_rc()).unwrap_err(),
            Error::from(scheduling::Error::MissingForest)
        );

        let forest = ForkForest::new().into_shared();
        assert!(build(&config, Some(forest), clock.in_rc()).is_ok());
    }

    #[test]
    fn configurations_deserialize() -> anyhow::Result<()> {
        let config: Config = serde_json::from_str(
            r#"{
                "core": ["breadth_first", {"weighted": "query_cost"}],
                "batching": {
                    "time_budget": {"secs": 2, "nanos": 0},
                    "instruction_budget": 500
                },
                "merge": {"bounded": true},
                "seed": 7
            }"#,
        )?;

        assert_eq!(
            config.core,
            vec![
                SchedulerKind::BreadthFirst,
                SchedulerKind::Weighted(WeightMetric::QueryCost)
            ]
        );
        assert_eq!(
            config.batching.map(|b| b.time_budget),
            Some(Duration::from_secs(2))
        );
        assert!(config.merge.is_some_and(|m| m.bounded));
        assert!(!config.iterative_deepening);
        assert_eq!(config.seed, 7);

        let defaults: Config = serde_json::from_str("{}")?;
        assert_eq!(defaults, Config::default());

        Ok(())
    }
}
