//! This module contains the depth-first scheduling policy.

use std::collections::HashSet;

use crate::{
    error::{scheduling::Error, Result},
    scheduler::{check_update, Scheduler},
    state::{StateId, StateView},
};

/// A scheduler that always advances the most recently added live state, so
/// that exploration follows one path down as far as it goes before backing
/// up.
#[derive(Clone, Debug, Default)]
pub struct DepthFirstScheduler {
    /// The live states, most recently added last.
    stack: Vec<StateId>,

    /// The states present in `stack`.
    members: HashSet<StateId>,
}

impl DepthFirstScheduler {
    /// Constructs a new scheduler holding no states.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for DepthFirstScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| Error::NoLiveStates.into())
    }

    fn update(
        &mut self,
        _current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        check_update(|s| self.members.contains(&s), added, removed)?;

        for view in added {
            self.stack.push(view.id);
            self.members.insert(view.id);
        }

        for state in removed {
            self.members.remove(state);
            if let Some(position) = self.stack.iter().rposition(|s| s == state) {
                self.stack.remove(position);
            }
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    fn name(&self) -> String {
        "DepthFirst".into()
    }
}
