//! This module contains the merge-aware scheduler, which owns the merge
//! regions and keeps parked states away from the scheduler it wraps.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    clock::DynClock,
    data::vector_map::VectorMap,
    error::{merge::Error, Result},
    forest::SharedForest,
    merge::{ClosePoint, CloseOutcome, DynMergeExecutor, MergeHandler, RegionId},
    scheduler::{self, Config, DynScheduler, Scheduler},
    state::{StateId, StateView},
};

/// A scheduler that wraps a base scheduler and implements merge regions on
/// top of it.
///
/// The engine reports open-merges through [`Self::open_merge`] and
/// close-merges through [`Self::close_merge`]. States that are parked at a
/// close point are removed from the base scheduler until their region is
/// released, and updates that mention them are filtered accordingly.
///
/// In bounded mode, every selection first looks at the regions that have
/// parked states. It returns an open state of such a region that is likely to
/// close soon, and releases the region early if there is none.
#[derive(Debug)]
pub struct MergingScheduler {
    base: DynScheduler,

    /// The engine operations used for merging.
    executor: DynMergeExecutor,

    /// Whether regions are released early.
    bounded: bool,

    /// The live regions.
    regions: VectorMap<RegionId, MergeHandler>,

    /// The identity of the next region to be opened.
    next_region: u64,

    /// The regions each state is open in, innermost last.
    stacks: HashMap<StateId, Vec<RegionId>>,

    /// The parked states, as they were when they reached their close point.
    paused: BTreeMap<StateId, StateView>,

    /// The states that have reached a close point and not yet been resumed.
    closing: HashSet<StateId>,
}

impl MergingScheduler {
    /// Wraps `base`, merging states through `executor`.
    #[must_use]
    pub fn new(base: DynScheduler, executor: DynMergeExecutor, bounded: bool) -> Self {
        Self {
            base,
            executor,
            bounded,
            regions: VectorMap::new(),
            next_region: 0,
            stacks: HashMap::new(),
            paused: BTreeMap::new(),
            closing: HashSet::new(),
        }
    }

    /// Builds the scheduler described by `config` using [`scheduler::build`]
    /// and wraps it, taking the bounded setting from `config.merge`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the base scheduler cannot be built.
    pub fn from_config(
        config: &Config,
        forest: Option<SharedForest>,
        clock: DynClock,
        executor: DynMergeExecutor,
    ) -> Result<Self> {
        let base = scheduler::build(config, forest, clock)?;
        let bounded = config.merge.unwrap_or_default().bounded;

        Ok(Self::new(base, executor, bounded))
    }

    /// Gets the region record for `region`, if it is live.
    #[must_use]
    pub fn region(&self, region: RegionId) -> Option<&MergeHandler> {
        self.regions.get(&region)
    }

    /// Gets the identities of every live region.
    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys()
    }

    /// Checks whether `state` is parked at a close point.
    #[must_use]
    pub fn is_paused(&self, state: StateId) -> bool {
        self.paused.contains_key(&state)
    }

    /// Gets the engine operations used for merging.
    #[must_use]
    pub fn executor(&self) -> &DynMergeExecutor {
        &self.executor
    }

    /// Gets the engine operations used for merging.
    pub fn executor_mut(&mut self) -> &mut DynMergeExecutor {
        &mut self.executor
    }

    /// Opens a new region at `state`, which becomes its only open state.
    pub fn open_merge(&mut self, state: &StateView) -> RegionId {
        let region = RegionId(self.next_region);
        self.next_region += 1;

        self.regions.insert(&region, MergeHandler::new(region, state));
        self.stacks.entry(state.id).or_default().push(region);
        tracing::trace!(%region, state = %state.id, "Opened merge region");

        region
    }

    /// Handles `state` reaching the close-merge at `point`, closing the
    /// innermost region it is open in.
    ///
    /// A state that is not open in any region is left alone with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `state` already reached a close point and has not
    /// been resumed since.
    pub fn close_merge(&mut self, state: &StateView, point: ClosePoint) -> Result<CloseOutcome> {
        if self.closing.contains(&state.id) {
            return Err(Error::AlreadyClosing { state: state.id }.into());
        }

        let Some(region) = self.stacks.get_mut(&state.id).and_then(Vec::pop) else {
            tracing::warn!(state = %state.id, ?point, "Close-merge reached without an open region");
            return Ok(CloseOutcome::Unmatched);
        };
        let handler = self
            .regions
            .get_mut(&region)
            .ok_or(Error::NoSuchRegion { region })?;

        let outcome = handler.add_closed_state(state, point, self.executor.as_mut())?;
        if outcome == CloseOutcome::Parked {
            self.base.update(None, &[], &[state.id])?;
            self.paused.insert(state.id, *state);
            self.closing.insert(state.id);
            self.executor.paused(state.id);
        }

        self.retire_if_finished(region)?;

        Ok(outcome)
    }

    /// Resumes every state parked in `region`, at every close point.
    ///
    /// The region itself stays live while it has open states. A region that
    /// has already been retired has released everything, so releasing it
    /// again does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `region` was never opened.
    pub fn release_states(&mut self, region: RegionId) -> Result<()> {
        if region.0 >= self.next_region {
            return Err(Error::NoSuchRegion { region }.into());
        }
        let Some(handler) = self.regions.get_mut(&region) else {
            tracing::trace!(%region, "Region already retired, nothing to release");
            return Ok(());
        };
        let released = handler.release_states();
        self.resume(&released)
    }

    /// Resumes every parked state in every region.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the base scheduler rejects a resumed state.
    pub fn release_all(&mut self) -> Result<()> {
        let regions: Vec<RegionId> = self.regions.keys().collect();
        for region in regions {
            self.release_states(region)?;
        }

        Ok(())
    }

    /// Chooses an open state of `region` that is worth advancing so that the
    /// region can finish, if there is one.
    #[must_use]
    pub fn prioritize_state(&self, region: RegionId) -> Option<StateId> {
        self.regions
            .get(&region)
            .and_then(|handler| handler.prioritize_state(&self.closing))
    }

    /// Hands the `released` states back to the base scheduler.
    fn resume(&mut self, released: &[StateView]) -> Result<()> {
        if released.is_empty() {
            return Ok(());
        }

        self.base.update(None, released, &[])?;
        for view in released {
            self.paused.remove(&view.id);
            self.closing.remove(&view.id);
            self.executor.resumed(view.id);
        }
        tracing::debug!(count = released.len(), "Resumed parked states");

        Ok(())
    }

    /// Releases and forgets `region` if it has no open states left.
    fn retire_if_finished(&mut self, region: RegionId) -> Result<()> {
        let finished = self
            .regions
            .get(&region)
            .is_some_and(|handler| handler.open_count() == 0);
        if finished {
            self.release_states(region)?;
            self.regions.remove(&region);
            tracing::trace!(%region, "Retired merge region");
        }

        Ok(())
    }
}

impl Scheduler for MergingScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        if self.base.is_empty() && !self.paused.is_empty() {
            tracing::debug!("Only parked states remain, releasing every region");
            self.release_all()?;
        }

        if self.bounded {
            let waiting: Vec<RegionId> = self
                .regions
                .values()
                .filter(|handler| handler.parked_count() > 0)
                .map(MergeHandler::id)
                .collect();
            for region in waiting {
                if let Some(state) = self.prioritize_state(region) {
                    return Ok(state);
                }
                tracing::debug!(%region, "No state can finish the region in time, releasing");
                self.release_states(region)?;
            }
        }

        self.base.select_state()
    }

    fn update(
        &mut self,
        current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        // Parked states are not in the base scheduler.
        let forwarded_current = current.filter(|view| !self.paused.contains_key(&view.id));
        let forwarded_removed: Vec<StateId> = removed
            .iter()
            .copied()
            .filter(|state| !self.paused.contains_key(state))
            .collect();
        self.base.update(forwarded_current, added, &forwarded_removed)?;

        // Forked states are open wherever their parent is.
        let inherited = current
            .and_then(|view| self.stacks.get(&view.id).cloned())
            .unwrap_or_default();
        if let Some(view) = forwarded_current {
            for region in &inherited {
                if let Some(handler) = self.regions.get_mut(region) {
                    handler.observe(view.id, view.instructions);
                }
            }
        }
        if !inherited.is_empty() {
            for view in added {
                for region in &inherited {
                    if let Some(handler) = self.regions.get_mut(region) {
                        handler.add_open_state(view.id, view.instructions);
                    }
                }
                self.stacks.insert(view.id, inherited.clone());
            }
        }

        let mut touched = HashSet::new();
        for state in removed {
            self.paused.remove(state);
            self.closing.remove(state);
            self.stacks.remove(state);
            for handler in self.regions.values_mut() {
                if handler.is_open(*state) || handler.is_parked(*state) {
                    handler.remove_state(*state);
                    touched.insert(handler.id());
                }
            }
        }
        for region in touched {
            self.retire_if_finished(region)?;
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.base.is_empty() && self.paused.is_empty()
    }

    fn name(&self) -> String {
        if self.bounded {
            format!("BoundedMerging({})", self.base.name())
        } else {
            format!("Merging({})", self.base.name())
        }
    }
}
