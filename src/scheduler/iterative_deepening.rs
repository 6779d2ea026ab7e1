//! This module contains the iterative deepening decorator, which pauses states
//! that run for too long in a single step.

use std::{collections::BTreeMap, time::Duration};

use crate::{
    clock::DynClock,
    constant::DEFAULT_ITERATIVE_DEEPENING_TIME,
    error::Result,
    scheduler::{DynScheduler, Scheduler},
    state::{StateId, StateView},
};

/// A scheduler that pauses any state whose step took longer than a time
/// budget, and resumes every paused state with double the budget once the
/// inner scheduler has nothing else left to run.
#[derive(Debug)]
pub struct IterativeDeepeningScheduler {
    inner: DynScheduler,

    /// The time source for the budget.
    clock: DynClock,

    /// How long a state may run before being paused.
    time_budget: Duration,

    /// When the last selected state was handed out.
    started: Option<Duration>,

    /// The states taken out of the inner scheduler, as last reported.
    paused: BTreeMap<StateId, StateView>,
}

impl IterativeDeepeningScheduler {
    /// Wraps `inner`, starting with the default time budget and measuring
    /// against `clock`.
    #[must_use]
    pub fn new(inner: DynScheduler, clock: DynClock) -> Self {
        Self::with_budget(inner, DEFAULT_ITERATIVE_DEEPENING_TIME, clock)
    }

    /// Wraps `inner`, starting with `time_budget` and measuring against
    /// `clock`.
    #[must_use]
    pub fn with_budget(inner: DynScheduler, time_budget: Duration, clock: DynClock) -> Self {
        let started = None;
        let paused = BTreeMap::new();
        Self {
            inner,
            clock,
            time_budget,
            started,
            paused,
        }
    }

    /// Gets the current time budget.
    #[must_use]
    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    /// Checks whether `state` is currently paused.
    #[must_use]
    pub fn is_paused(&self, state: StateId) -> bool {
        self.paused.contains_key(&state)
    }
}

impl Scheduler for IterativeDeepeningScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        let state = self.inner.select_state()?;
        self.started = Some(self.clock.now());

        Ok(state)
    }

    fn update(
        &mut self,
        current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        let elapsed = self
            .started
            .map_or(Duration::ZERO, |started| self.clock.now().saturating_sub(started));

        // Paused states are no longer in the inner scheduler.
        let forwarded_current = current.filter(|view| !self.paused.contains_key(&view.id));
        let forwarded: Vec<StateId> = removed
            .iter()
            .copied()
            .filter(|state| !self.paused.contains_key(state))
            .collect();
        self.inner.update(forwarded_current, added, &forwarded)?;
        for state in removed {
            self.paused.remove(state);
        }

        if let Some(current) = forwarded_current {
            if elapsed > self.time_budget && !removed.contains(&current.id) {
                tracing::trace!(state = %current.id, ?elapsed, "Pausing a slow state");
                self.inner.update(None, &[], &[current.id])?;
                self.paused.insert(current.id, current);
            }
        }

        if self.inner.is_empty() && !self.paused.is_empty() {
            self.time_budget *= 2;
            tracing::debug!(
                budget = ?self.time_budget,
                resumed = self.paused.len(),
                "Resuming paused states with a larger budget"
            );
            let resumed: Vec<StateView> =
                std::mem::take(&mut self.paused).into_values().collect();
            self.inner.update(None, &resumed, &[])?;
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty() && self.paused.is_empty()
    }

    fn name(&self) -> String {
        format!("IterativeDeepening({})", self.inner.name())
    }
}
