//! This module contains the record kept for a single merge region.

use std::collections::{BTreeMap, HashSet};

use crate::{
    constant::MERGE_PRIORITY_DISTANCE_FACTOR,
    error::{merge::Error, Result},
    merge::{ClosePoint, CloseOutcome, MergeExecutor, RegionId},
    state::{StateId, StateView},
};

/// The record of one merge region.
///
/// A state is either open in the region, parked at one of its close points,
/// or not part of it at all, but never both open and parked.
#[derive(Clone, Debug)]
pub struct MergeHandler {
    id: RegionId,

    /// The instruction count of the state that opened the region, at the time
    /// it did so.
    open_instruction: u64,

    /// The mean distance from the open point over every closed state.
    closed_mean: f64,

    /// The number of states that have closed.
    closed_count: u64,

    /// The states still open, along with their last known instruction count.
    open: BTreeMap<StateId, u64>,

    /// The states parked at each close point, in order of arrival.
    reached: BTreeMap<ClosePoint, Vec<StateView>>,
}

impl MergeHandler {
    /// Constructs the record for region `id`, opened by `opener`.
    #[must_use]
    pub fn new(id: RegionId, opener: &StateView) -> Self {
        let open_instruction = opener.instructions;
        let mut open = BTreeMap::new();
        open.insert(opener.id, opener.instructions);
        Self {
            id,
            open_instruction,
            closed_mean: 0.0,
            closed_count: 0,
            open,
            reached: BTreeMap::new(),
        }
    }

    /// Gets the identity of the region.
    #[must_use]
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Gets the instruction count at which the region was opened.
    #[must_use]
    pub fn open_instruction(&self) -> u64 {
        self.open_instruction
    }

    /// Gets the mean distance from the open point at which states closed.
    #[must_use]
    pub fn mean_distance(&self) -> f64 {
        self.closed_mean
    }

    /// Gets the number of states that have closed.
    #[must_use]
    pub fn closed_count(&self) -> u64 {
        self.closed_count
    }

    /// Gets the number of states still open.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Gets the number of states parked across every close point.
    #[must_use]
    pub fn parked_count(&self) -> usize {
        self.reached.values().map(Vec::len).sum()
    }

    /// Checks whether `state` is open in the region.
    #[must_use]
    pub fn is_open(&self, state: StateId) -> bool {
        self.open.contains_key(&state)
    }

    /// Checks whether `state` is parked at one of the region's close points.
    #[must_use]
    pub fn is_parked(&self, state: StateId) -> bool {
        self.reached.values().flatten().any(|view| view.id == state)
    }

    /// Gets the states parked at `point`, in order of arrival.
    #[must_use]
    pub fn parked_at(&self, point: ClosePoint) -> &[StateView] {
        self.reached.get(&point).map(Vec::as_slice).unwrap_or_default()
    }

    /// Makes `state` open in the region, as last seen at `instructions`.
    pub fn add_open_state(&mut self, state: StateId, instructions: u64) {
        self.open.insert(state, instructions);
    }

    /// Records that the open `state` has now executed `instructions`.
    pub fn observe(&mut self, state: StateId, instructions: u64) {
        if let Some(seen) = self.open.get_mut(&state) {
            *seen = instructions;
        }
    }

    /// Forgets `state` entirely, whether it was open or parked.
    pub fn remove_state(&mut self, state: StateId) {
        self.open.remove(&state);
        for group in self.reached.values_mut() {
            group.retain(|view| view.id != state);
        }
        self.reached.retain(|_, group| !group.is_empty());
    }

    /// Handles the open `state` reaching the close-merge at `point`.
    ///
    /// The state stops being open. It is then merged, in order of arrival, into
    /// the first state parked at `point` that `executor` manages to merge it
    /// with, in which case it is terminated. If there is no such state it is
    /// parked at `point` instead.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `state` is not open in the region.
    #[allow(clippy::cast_precision_loss)]
    pub fn add_closed_state(
        &mut self,
        state: &StateView,
        point: ClosePoint,
        executor: &mut dyn MergeExecutor,
    ) -> Result<CloseOutcome> {
        if self.open.remove(&state.id).is_none() {
            return Err(Error::NotOpen {
                state:  state.id,
                region: self.id,
            }
            .into());
        }

        self.closed_count += 1;
        let distance = state.instructions.saturating_sub(self.open_instruction) as f64;
        self.closed_mean += (distance - self.closed_mean) / self.closed_count as f64;

        let group = self.reached.entry(point).or_default();
        if let Some(into) = group
            .iter()
            .map(|view| view.id)
            .find(|parked| executor.try_merge(*parked, state.id))
        {
            executor.terminate(state.id);
            tracing::debug!(region = %self.id, %into, incoming = %state.id, "Merged states");
            return Ok(CloseOutcome::Merged { into });
        }

        group.push(*state);
        tracing::debug!(region = %self.id, state = %state.id, ?point, "Parked state");

        Ok(CloseOutcome::Parked)
    }

    /// Chooses an open state that is worth advancing to finish the region.
    ///
    /// Only states that are not in the middle of closing some region, and
    /// whose distance from the open point is below twice the mean closing
    /// distance, qualify.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn prioritize_state(&self, closing: &HashSet<StateId>) -> Option<StateId> {
        let limit = MERGE_PRIORITY_DISTANCE_FACTOR * self.closed_mean;
        self.open
            .iter()
            .find(|(state, seen)| {
                let distance = seen.saturating_sub(self.open_instruction) as f64;
                !closing.contains(state) && distance < limit
            })
            .map(|(state, _)| *state)
    }

    /// Takes every parked state out of the region, ordered by close point and
    /// then by arrival.
    ///
    /// Open states are kept. They are still running, so they may yet reach a
    /// close point of the region, and the region is only retired once none
    /// are left.
    pub fn release_states(&mut self) -> Vec<StateView> {
        std::mem::take(&mut self.reached).into_values().flatten().collect()
    }
}
