//! This module contains the random path scheduling policy, which chooses
//! states by walking the fork-history forest.
//!
//! # Bias
//!
//! Walking from a root and flipping a coin at every fork point selects a
//! state with probability `0.5^depth` within its tree. States that sit close
//! to the root, and which therefore forked rarely, are strongly favoured over
//! the members of a large family of siblings, which keeps exploration from
//! being dominated by a single loop that forks over and over.

use std::collections::HashSet;

use rand::{rngs::StdRng, seq::SliceRandom, Rng};

use crate::{
    error::{forest::Error as ForestError, scheduling::Error, Result},
    forest::{ForkForest, NodeId, Observer, SharedForest},
    scheduler::{check_update, Scheduler},
    state::{StateId, StateView},
};

/// A scheduler that selects a state by walking a [`ForkForest`] from a random
/// root down to a leaf, choosing a random child at every fork point.
///
/// The forest is shared with the engine, which must [`ForkForest::attach`]
/// forked states before reporting them as added, and must only
/// [`ForkForest::remove`] terminated states after reporting them as removed.
///
/// # Variants
///
/// The [`Self::new`] variant only walks towards the states it was given,
/// tracking them with an [`Observer`] of the forest so that any number of
/// these schedulers can share a forest.
///
/// The [`Self::ignoring`] variant walks towards any live state in the forest
/// except those in an ignore set, backtracking out of subtrees that turn out
/// to contain only ignored states. Its updates only maintain the ignore set,
/// as the forest already knows which states are live.
#[derive(Debug)]
pub struct RandomPathScheduler {
    /// The forest to walk.
    forest: SharedForest,

    /// How the scheduler decides which leaves are its own.
    mode: Mode,

    /// The source of randomness for the walk.
    rng: StdRng,
}

#[derive(Clone, Debug)]
enum Mode {
    /// Walk towards the leaves marked by `observer`.
    Observed {
        observer: Observer,
        owned:    HashSet<StateId>,
    },

    /// Walk towards any leaf not in `ignored`.
    Ignoring { ignored: HashSet<StateId> },
}

/// How much of a fork point's subtree a backtracking walk has explored.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Visit {
    Unvisited,
    Left,
    Right,
    Both,
}

impl RandomPathScheduler {
    /// Constructs a new scheduler holding no states that walks `forest` and
    /// draws from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `forest` already has the maximum number of
    /// observers.
    pub fn new(forest: SharedForest, rng: StdRng) -> Result<Self> {
        let observer = forest.borrow_mut().register_observer()?;
        let owned = HashSet::new();
        let mode = Mode::Observed { observer, owned };

        Ok(Self { forest, mode, rng })
    }

    /// Constructs a new scheduler that walks towards every live state in
    /// `forest` that has not been ignored, drawing from `rng`.
    #[must_use]
    pub fn ignoring(forest: SharedForest, rng: StdRng) -> Self {
        let ignored = HashSet::new();
        let mode = Mode::Ignoring { ignored };

        Self { forest, mode, rng }
    }

    /// Excludes `state` from selection until it is un-ignored or added.
    ///
    /// This has no effect unless the scheduler was built by [`Self::ignoring`].
    pub fn ignore(&mut self, state: StateId) {
        if let Mode::Ignoring { ignored } = &mut self.mode {
            ignored.insert(state);
        }
    }

    /// Allows `state` to be selected again.
    pub fn unignore(&mut self, state: StateId) {
        if let Mode::Ignoring { ignored } = &mut self.mode {
            ignored.remove(&state);
        }
    }

    /// Checks whether `state` is currently ignored.
    #[must_use]
    pub fn is_ignored(&self, state: StateId) -> bool {
        matches!(&self.mode, Mode::Ignoring { ignored } if ignored.contains(&state))
    }

    /// Walks from a random marked root, preferring marked children.
    fn select_observed(
        forest: &ForkForest,
        observer: Observer,
        rng: &mut StdRng,
    ) -> Result<StateId> {
        let observed = |id: NodeId| {
            forest
                .node(id)
                .map_or(false, |node| node.observers().contains(observer))
        };
        let roots: Vec<NodeId> = forest.roots().filter(|root| observed(*root)).collect();
        let mut current = *roots.choose(rng).ok_or(Error::NoLiveStates)?;

        loop {
            let node = forest.node(current)?;
            let (Some(left), Some(right)) = (node.left(), node.right()) else {
                return node.state().ok_or_else(|| Error::NoLiveStates.into());
            };

            current = match (observed(left), observed(right)) {
                (true, true) => {
                    if rng.gen() {
                        right
                    } else {
                        left
                    }
                }
                (true, false) => left,
                (false, true) => right,
                (false, false) => return Err(Error::NoLiveStates.into()),
            };
        }
    }

    /// Walks from a random root, flipping a coin at every fork point.
    fn select_unconstrained(forest: &ForkForest, rng: &mut StdRng) -> Result<StateId> {
        let roots: Vec<NodeId> = forest.roots().collect();
        let mut current = *roots.choose(rng).ok_or(Error::NoLiveStates)?;

        loop {
            let node = forest.node(current)?;
            let (Some(left), Some(right)) = (node.left(), node.right()) else {
                return node.state().ok_or_else(|| Error::NoLiveStates.into());
            };
            current = if rng.gen() { right } else { left };
        }
    }

    /// Walks from the roots in random order, backing out of subtrees whose
    /// leaves are all ignored.
    fn select_avoiding(
        forest: &ForkForest,
        ignored: &HashSet<StateId>,
        rng: &mut StdRng,
    ) -> Result<StateId> {
        let mut roots: Vec<NodeId> = forest.roots().collect();
        roots.shuffle(rng);

        for root in roots {
            let mut stack = vec![(root, Visit::Unvisited)];
            while let Some((id, visit)) = stack.last_mut() {
                let node = forest.node(*id)?;
                let (Some(left), Some(right)) = (node.left(), node.right()) else {
                    match node.state() {
                        Some(state) if !ignored.contains(&state) => return Ok(state),
                        _ => {
                            stack.pop();
                            continue;
                        }
                    }
                };

                let explored = *visit;
                let next = match explored {
                    Visit::Unvisited => {
                        if rng.gen() {
                            *visit = Visit::Right;
                            right
                        } else {
                            *visit = Visit::Left;
                            left
                        }
                    }
                    Visit::Left => {
                        *visit = Visit::Both;
                        right
                    }
                    Visit::Right => {
                        *visit = Visit::Both;
                        left
                    }
                    Visit::Both => {
                        stack.pop();
                        continue;
                    }
                };
                stack.push((next, Visit::Unvisited));
            }
        }

        Err(Error::NoLiveStates.into())
    }
}

impl Scheduler for RandomPathScheduler {
    fn select_state(&mut self) -> Result<StateId> {
        let forest = self.forest.borrow();
        match &self.mode {
            Mode::Observed { observer, .. } => {
                Self::select_observed(&forest, *observer, &mut self.rng)
            }
            Mode::Ignoring { ignored } if ignored.is_empty() => {
                Self::select_unconstrained(&forest, &mut self.rng)
            }
            Mode::Ignoring { ignored } => Self::select_avoiding(&forest, ignored, &mut self.rng),
        }
    }

    fn update(
        &mut self,
        _current: Option<StateView>,
        added: &[StateView],
        removed: &[StateId],
    ) -> Result<()> {
        let mut forest = self.forest.borrow_mut();
        match &mut self.mode {
            Mode::Observed { observer, owned } => {
                check_update(|s| owned.contains(&s), added, removed)?;
                if let Some(view) = added.iter().find(|v| forest.leaf_of(v.id).is_none()) {
                    return Err(ForestError::UnknownState { state: view.id }.into());
                }

                for view in added {
                    forest.mark(view.id, *observer)?;
                    owned.insert(view.id);
                }
                for state in removed {
                    owned.remove(state);
                    if forest.leaf_of(*state).is_some() {
                        forest.unmark(*state, *observer)?;
                    }
                }
            }
            Mode::Ignoring { ignored } => {
                for view in added {
                    ignored.remove(&view.id);
                }
                // States that leave this scheduler but stay in the forest must
                // not be walked to.
                for state in removed {
                    if forest.leaf_of(*state).is_some() {
                        ignored.insert(*state);
                    }
                }
                ignored.retain(|state| forest.leaf_of(*state).is_some());
            }
        }

        Ok(())
    }

    fn is_empty(&self) -> bool {
        let forest = self.forest.borrow();
        match &self.mode {
            Mode::Observed { owned, .. } => owned.is_empty(),
            Mode::Ignoring { ignored } => {
                let live_ignored = ignored
                    .iter()
                    .filter(|state| forest.leaf_of(**state).is_some())
                    .count();
                forest.state_count() <= live_ignored
            }
        }
    }

    fn name(&self) -> String {
        match self.mode {
            Mode::Observed { .. } => "RandomPath".into(),
            Mode::Ignoring { .. } => "RandomPath(ignoring)".into(),
        }
    }
}

impl Drop for RandomPathScheduler {
    fn drop(&mut self) {
        if let Mode::Observed { observer, .. } = self.mode {
            if let Ok(mut forest) = self.forest.try_borrow_mut() {
                forest.release_observer(observer);
            } else {
                tracing::warn!(?observer, "Forest is borrowed, observer slot is leaked");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use rand::{rngs::StdRng, SeedableRng};

    use crate::{
        forest::{ForkForest, SharedForest},
        scheduler::{RandomPathScheduler, Scheduler},
        state::{StateId, StateView},
    };

    /// Builds a forest where state 0 forked off 1, and then 1 forked off 2.
    fn lopsided() -> anyhow::Result<SharedForest> {
        let mut forest = ForkForest::new();
        let tree = forest.add_root(StateId(0))?;
        let root = forest.root(tree)?.unwrap();
        let (_, right) = forest.attach(root, StateId(0), StateId(1))?;
        forest.attach(right, StateId(1), StateId(2))?;

        Ok(forest.into_shared())
    }

    fn views(ids: &[u64]) -> Vec<StateView> {
        ids.iter().map(|i| StateView::new(*i, 0, 0)).collect()
    }

    #[test]
    fn shallow_states_are_favoured() -> anyhow::Result<()> {
        let forest = lopsided()?;
        let mut scheduler = RandomPathScheduler::new(forest, StdRng::seed_from_u64(5))?;
        scheduler.update(None, &views(&[0, 1, 2]), &[])?;

        let mut counts: HashMap<StateId, usize> = HashMap::new();
        for _ in 0..8000 {
            *counts.entry(scheduler.select_state()?).or_default() += 1;
        }
        assert!((3700..4300).contains(&counts[&StateId(0)]));
        assert!((1700..2300).contains(&counts[&StateId(1)]));
        assert!((1700..2300).contains(&counts[&StateId(2)]));

        Ok(())
    }

    #[test]
    fn schedulers_sharing_a_forest_keep_to_their_own_states() -> anyhow::Result<()> {
        let forest = lopsided()?;
        let mut first = RandomPathScheduler::new(forest.clone(), StdRng::seed_from_u64(6))?;
        let mut second = RandomPathScheduler::new(forest.clone(), StdRng::seed_from_u64(7))?;
        first.update(None, &views(&[0, 2]), &[])?;
        second.update(None, &views(&[1]), &[])?;

        for _ in 0..100 {
            assert_ne!(first.select_state()?, StateId(1));
            assert_eq!(second.select_state()?, StateId(1));
        }

        // Terminating a state is reported before it leaves the forest.
        second.update(None, &[], &[StateId(1)])?;
        forest.borrow_mut().remove_state(StateId(1))?;
        assert!(second.is_empty());
        assert!(second.select_state().is_err());
        assert!(!first.is_empty());

        Ok(())
    }

    #[test]
    fn forked_states_inherit_their_parents_place() -> anyhow::Result<()> {
        let forest = ForkForest::new().into_shared();
        forest.borrow_mut().add_root(StateId(0))?;
        let mut scheduler = RandomPathScheduler::new(forest.clone(), StdRng::seed_from_u64(8))?;
        scheduler.update(None, &views(&[0]), &[])?;

        let leaf = forest.borrow().leaf_of(StateId(0)).unwrap();
        forest.borrow_mut().attach(leaf, StateId(0), StateId(1))?;
        scheduler.update(Some(StateView::new(0, 1, 5)), &views(&[1]), &[])?;

        let mut seen = [false, false];
        for _ in 0..100 {
            let state = scheduler.select_state()?;
            seen[state.0 as usize] = true;
        }
        assert_eq!(seen, [true, true]);

        Ok(())
    }

    #[test]
    fn added_states_must_be_in_the_forest() -> anyhow::Result<()> {
        let forest = ForkForest::new().into_shared();
        let mut scheduler = RandomPathScheduler::new(forest, StdRng::seed_from_u64(9))?;
        assert!(scheduler.update(None, &views(&[3]), &[]).is_err());
        assert!(scheduler.is_empty());

        Ok(())
    }

    #[test]
    fn ignoring_walk_backs_out_of_ignored_subtrees() -> anyhow::Result<()> {
        let forest = lopsided()?;
        let mut scheduler = RandomPathScheduler::ignoring(forest.clone(), StdRng::seed_from_u64(10));
        scheduler.ignore(StateId(1));
        scheduler.ignore(StateId(2));

        // The only reachable state sits on the other side of the root.
        for _ in 0..100 {
            assert_eq!(scheduler.select_state()?, StateId(0));
        }

        scheduler.ignore(StateId(0));
        assert!(scheduler.is_empty());
        assert!(scheduler.select_state().is_err());

        // Adding a state makes it selectable again.
        scheduler.update(None, &views(&[2]), &[])?;
        for _ in 0..100 {
            assert_eq!(scheduler.select_state()?, StateId(2));
        }

        Ok(())
    }

    #[test]
    fn ignoring_update_maintains_only_the_ignore_set() -> anyhow::Result<()> {
        let forest = lopsided()?;
        let mut scheduler = RandomPathScheduler::ignoring(forest.clone(), StdRng::seed_from_u64(11));

        // A state removed from the scheduler while still live is ignored.
        scheduler.update(None, &[], &[StateId(1)])?;
        assert!(scheduler.is_ignored(StateId(1)));

        // Once it leaves the forest the entry is dropped.
        forest.borrow_mut().remove_state(StateId(1))?;
        scheduler.update(None, &[], &[])?;
        assert!(!scheduler.is_ignored(StateId(1)));

        scheduler.unignore(StateId(1));
        assert_eq!(scheduler.name(), "RandomPath(ignoring)");
        assert!(!scheduler.is_empty());

        Ok(())
    }

    #[test]
    fn dropping_a_scheduler_frees_its_observer() -> anyhow::Result<()> {
        let forest = ForkForest::new().into_shared();
        for _ in 0..20 {
            let scheduler = RandomPathScheduler::new(forest.clone(), StdRng::seed_from_u64(12))?;
            drop(scheduler);
        }

        Ok(())
    }

    #[test]
    fn dropping_while_the_forest_is_borrowed_leaks_the_observer() -> anyhow::Result<()> {
        let forest = ForkForest::new().into_shared();
        let scheduler = RandomPathScheduler::new(forest.clone(), StdRng::seed_from_u64(3))?;
        let guard = forest.borrow();
        drop(scheduler);
        drop(guard);

        // The leaked slot stays taken, so only seven more fit.
        let mut forest = forest.borrow_mut();
        for _ in 1..crate::constant::MAXIMUM_FOREST_OBSERVERS {
            forest.register_observer()?;
        }
        assert!(forest.register_observer().is_err());

        Ok(())
    }
}
