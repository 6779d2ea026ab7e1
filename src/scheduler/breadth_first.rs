//! This module contains the breadth-first scheduling policy.

use std::collections::{HashSet, VecDeque};

use crate::{
    error::{scheduling::Error, Result},
    scheduler::{check_update, Scheduler},
    state::{StateId, StateView},
};

/// A scheduler that advances live states in the order they were added.
///
/// The state at the front of the queue keeps being selected until it forks.
/// At that point it moves to the back of the queue behind the states that
/// were already waiting, and its children follow it.
#[derive(Clone, Debug, Default)]
pub struct BreadthFirstScheduler {
    /// The live states in the order they will be advanced.
    queue: VecDeque<StateId>,

    /// The states present in `queue`.
    members: HashSet<StateId>,
}

impl BreadthFirstScheduler {
    /// Constructs a new scheduler holding no states.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for BreadthFirstScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        self.queue
            .front()
            .copied()
            .ok_or_else(|| Error::NoLiveStates.into())
    }

    fn update(
        &mut self,
        current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        check_update(|s| self.members.contains(&s), added, removed)?;

        // A state that forked has finished its level, so it goes to the back.
        if let Some(current) = current {
            if !added.is_empty() && !removed.contains(&current.id) {
                if let Some(position) = self.queue.iter().position(|s| *s == current.id) {
                    self.queue.remove(position);
                    self.queue.push_back(current.id);
                }
            }
        }

        for view in added {
            self.queue.push_back(view.id);
            self.members.insert(view.id);
        }

        for state in removed {
            self.members.remove(state);
            if let Some(position) = self.queue.iter().position(|s| s == state) {
                self.queue.remove(position);
            }
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn name(&self) -> String {
        "BreadthFirst".into()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        scheduler::{BreadthFirstScheduler, Scheduler},
        state::{StateId, StateView},
    };

    #[test]
    fn forking_states_move_to_the_back() -> anyhow::Result<()> {
        let mut scheduler = BreadthFirstScheduler::new();
        scheduler.update(
            None,
            &[StateView::new(0, 0, 0), StateView::new(1, 0, 0)],
            &[],
        )?;
        assert_eq!(scheduler.select_state()?, StateId(0));

        // Stepping without forking keeps the same state at the front.
        scheduler.update(Some(StateView::new(0, 0, 1)), &[], &[])?;
        assert_eq!(scheduler.select_state()?, StateId(0));

        scheduler.update(
            Some(StateView::new(0, 1, 2)),
            &[StateView::new(2, 1, 2)],
            &[],
        )?;
        assert_eq!(scheduler.select_state()?, StateId(1));

        scheduler.update(Some(StateView::new(1, 0, 1)), &[], &[StateId(1)])?;
        assert_eq!(scheduler.select_state()?, StateId(0));
        scheduler.update(Some(StateView::new(0, 1, 3)), &[], &[StateId(0)])?;
        assert_eq!(scheduler.select_state()?, StateId(2));

        Ok(())
    }

    #[test]
    fn order_depends_only_on_updates() -> anyhow::Result<()> {
        let history: Vec<(Option<StateView>, Vec<StateView>, Vec<StateId>)> = vec![
            (None, vec![StateView::new(0, 0, 0)], vec![]),
            (
                Some(StateView::new(0, 1, 5)),
                vec![StateView::new(1, 1, 5)],
                vec![],
            ),
            (
                Some(StateView::new(1, 2, 9)),
                vec![StateView::new(2, 2, 9)],
                vec![],
            ),
            (Some(StateView::new(0, 1, 7)), vec![], vec![StateId(0)]),
        ];

        let mut sparse = BreadthFirstScheduler::new();
        let mut eager = BreadthFirstScheduler::new();
        let mut sparse_order = Vec::new();
        let mut eager_order = Vec::new();
        for (current, added, removed) in &history {
            sparse.update(*current, added, removed)?;
            eager.update(*current, added, removed)?;
            for _ in 0..3 {
                eager.select_state()?;
            }
            sparse_order.push(sparse.select_state()?);
            eager_order.push(eager.select_state()?);
        }
        assert_eq!(sparse_order, eager_order);

        Ok(())
    }
}
