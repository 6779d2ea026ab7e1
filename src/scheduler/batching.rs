//! This module contains the batching decorator, which keeps advancing the same
//! state for a while before consulting the scheduler it wraps again.

use std::time::Duration;

use crate::{
    clock::DynClock,
    constant::BATCH_TIME_TOLERANCE,
    error::Result,
    scheduler::{DynScheduler, Scheduler},
    state::{StateId, StateView},
};

/// A scheduler that keeps returning the state last chosen by its inner
/// scheduler until either a time budget or a step budget is used up.
///
/// Batches that overrun the time budget by more than
/// [`BATCH_TIME_TOLERANCE`] (typically because a single step was very slow)
/// grow the budget to the observed batch duration, so that slow steps do not
/// end up re-consulting the inner scheduler after every step.
#[derive(Debug)]
pub struct BatchingScheduler {
    inner: DynScheduler,

    /// The time source for the time budget.
    clock: DynClock,

    /// How long a batch may last.
    time_budget: Duration,

    /// How many steps a batch may last.
    instruction_budget: u64,

    /// The state of the current batch, if a batch is running.
    batch: Option<Batch>,
}

#[derive(Clone, Copy, Debug)]
struct Batch {
    state:   StateId,
    started: Duration,
    steps:   u64,
}

impl BatchingScheduler {
    /// Wraps `inner` in batches of at most `time_budget` and at most
    /// `instruction_budget` steps, measured against `clock`.
    #[must_use]
    pub fn new(
        inner: DynScheduler,
        time_budget: Duration,
        instruction_budget: u64,
        clock: DynClock,
    ) -> Self {
        let batch = None;
        Self {
            inner,
            clock,
            time_budget,
            instruction_budget,
            batch,
        }
    }

    /// Gets the current time budget, which may have grown since construction.
    #[must_use]
    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    /// Gets the inner scheduler.
    #[must_use]
    pub fn inner(&self) -> &DynScheduler {
        &self.inner
    }
}

impl Scheduler for BatchingScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        let now = self.clock.now();

        if let Some(batch) = self.batch {
            let elapsed = now.saturating_sub(batch.started);
            if elapsed <= self.time_budget && batch.steps < self.instruction_budget {
                return Ok(batch.state);
            }

            if elapsed > self.time_budget.mul_f64(BATCH_TIME_TOLERANCE) {
                tracing::debug!(
                    old = ?self.time_budget,
                    new = ?elapsed,
                    "Growing the batch time budget"
                );
                self.time_budget = elapsed;
            }
        }

        let state = self.inner.select_state()?;
        self.batch = Some(Batch {
            state,
            started: now,
            steps: 0,
        });

        Ok(state)
    }

    fn update(
        &mut self,
        current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        self.inner.update(current, added, removed)?;

        if let Some(batch) = &mut self.batch {
            if removed.contains(&batch.state) {
                self.batch = None;
            } else if current.is_some() {
                batch.steps += 1;
            }
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn name(&self) -> String {
        format!("Batching({})", self.inner.name())
    }
}
