//! This module contains the interleaving decorator, which takes turns between
//! several schedulers.

use itertools::Itertools;

use crate::{
    error::{scheduling::Error, Result},
    scheduler::{DynScheduler, Scheduler},
    state::{StateId, StateView},
};

/// A scheduler that asks each of its inner schedulers for a state in turn,
/// while telling all of them about every update.
///
/// Since every inner scheduler sees the same updates, they all hold the same
/// live states and only differ in which of them they prefer.
#[derive(Debug)]
pub struct InterleavedScheduler {
    inners: Vec<DynScheduler>,

    /// The inner scheduler whose turn it is.
    next: usize,
}

impl InterleavedScheduler {
    /// Constructs a scheduler that takes turns between `inners` in order.
    #[must_use]
    pub fn new(inners: Vec<DynScheduler>) -> Self {
        let next = 0;
        Self { inners, next }
    }

    /// Gets the number of inner schedulers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inners.len()
    }
}

impl Scheduler for InterleavedScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        let count = self.inners.len();
        for offset in 0..count {
            let index = (self.next + offset) % count;
            if self.inners[index].is_empty() {
                continue;
            }
            self.next = (index + 1) % count;
            return self.inners[index].select_state();
        }

        Err(Error::NoLiveStates.into())
    }

    fn update(
        &mut self,
        current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        for inner in &mut self.inners {
            inner.update(current, added, removed)?;
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.inners.iter().all(|inner| inner.is_empty())
    }

    fn name(&self) -> String {
        format!(
            "Interleaved({})",
            self.inners.iter().map(|inner| inner.name()).join(", ")
        )
    }
}
