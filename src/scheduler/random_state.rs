//! This module contains the uniform random scheduling policy.

use std::collections::HashMap;

use rand::{rngs::StdRng, Rng};

use crate::{
    error::{scheduling::Error, Result},
    scheduler::{check_update, Scheduler},
    state::{StateId, StateView},
};

/// A scheduler that advances a uniformly random live state.
#[derive(Clone, Debug)]
pub struct RandomStateScheduler {
    /// The live states in no particular order.
    states: Vec<StateId>,

    /// The position of each live state in `states`.
    positions: HashMap<StateId, usize>,

    /// The source of randomness for selection.
    rng: StdRng,
}

impl RandomStateScheduler {
    /// Constructs a new scheduler holding no states that draws from `rng`.
    #[must_use]
    pub fn new(rng: StdRng) -> Self {
        let states = Vec::new();
        let positions = HashMap::new();
        Self {
            states,
            positions,
            rng,
        }
    }
}

impl Scheduler for RandomStateScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        if self.states.is_empty() {
            return Err(Error::NoLiveStates.into());
        }
        let index = self.rng.gen_range(0..self.states.len());

        Ok(self.states[index])
    }

    fn update(
        &mut self,
        _current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        check_update(|s| self.positions.contains_key(&s), added, removed)?;

        for view in added {
            self.positions.insert(view.id, self.states.len());
            self.states.push(view.id);
        }

        for state in removed {
            if let Some(position) = self.positions.remove(state) {
                self.states.swap_remove(position);
                if let Some(moved) = self.states.get(position) {
                    self.positions.insert(*moved, position);
                }
            }
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn name(&self) -> String {
        "RandomState".into()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use rand::{rngs::StdRng, SeedableRng};

    use crate::{
        scheduler::{RandomStateScheduler, Scheduler},
        state::{StateId, StateView},
    };

    #[test]
    fn selection_is_roughly_uniform() -> anyhow::Result<()> {
        let mut scheduler = RandomStateScheduler::new(StdRng::seed_from_u64(1));
        let added = (0..4).map(|i| StateView::new(i, 0, 0)).collect::<Vec<_>>();
        scheduler.update(None, &added, &[])?;

        let mut counts: HashMap<StateId, usize> = HashMap::new();
        for _ in 0..8000 {
            *counts.entry(scheduler.select_state()?).or_default() += 1;
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|c| (1700..2300).contains(c)));

        Ok(())
    }

    #[test]
    fn removed_states_are_never_selected() -> anyhow::Result<()> {
        let mut scheduler = RandomStateScheduler::new(StdRng::seed_from_u64(2));
        let added = (0..5).map(|i| StateView::new(i, 0, 0)).collect::<Vec<_>>();
        scheduler.update(None, &added, &[StateId(0), StateId(3)])?;

        for _ in 0..200 {
            let state = scheduler.select_state()?;
            assert!(![StateId(0), StateId(3)].contains(&state));
        }

        scheduler.update(None, &[], &[StateId(4), StateId(1), StateId(2)])?;
        assert!(scheduler.is_empty());
        assert!(scheduler.select_state().is_err());

        Ok(())
    }

    #[test]
    fn sparse_identities_are_held() -> anyhow::Result<()> {
        let mut scheduler = RandomStateScheduler::new(StdRng::seed_from_u64(3));
        let sparse = [StateId(u64::MAX), StateId(1 << 40)];
        let added = sparse.map(|id| StateView::new(id, 0, 0));
        scheduler.update(None, &added, &[])?;

        for _ in 0..50 {
            assert!(sparse.contains(&scheduler.select_state()?));
        }

        scheduler.update(None, &[], &[StateId(u64::MAX)])?;
        assert_eq!(scheduler.select_state()?, StateId(1 << 40));

        Ok(())
    }
}
