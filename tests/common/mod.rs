//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.
//!
//! The [`ToyEngine`] stands in for a real symbolic execution engine. Its
//! states run a fixed [`Program`] that forks at regular intervals and ends
//! after a fixed number of instructions, which is enough to drive the
//! scheduling core through realistic sequences of forks and terminations.

#![cfg(test)]

use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use anyhow::anyhow;
use fork_scheduler::{
    forest::{ForkForest, SharedForest},
    merge::MergeExecutor,
    scheduler::Scheduler,
    state::{StateId, StateView},
};

/// The behaviour shared by every state of a [`ToyEngine`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Program {
    /// A state forks each time its instruction count is a multiple of this.
    pub fork_every: u64,

    /// States at this depth no longer fork.
    pub max_depth: u32,

    /// A state terminates once it has executed this many instructions.
    pub length: u64,
}

/// An engine that steps toy states, keeping a fork-history forest and a
/// scheduler consistent with each other.
#[derive(Debug)]
pub struct ToyEngine<S> {
    pub scheduler: S,
    pub forest:    SharedForest,
    program:       Program,
    states:        BTreeMap<StateId, StateView>,
    next:          u64,
    created:       usize,
    terminated:    usize,
}

#[allow(unused)] // It is actually
impl<S> ToyEngine<S>
where
    S: Scheduler,
{
    /// Constructs an engine that runs `program` under `scheduler`, starting
    /// from a single state in `forest`.
    pub fn new(scheduler: S, forest: SharedForest, program: Program) -> anyhow::Result<Self> {
        let mut engine = Self {
            scheduler,
            forest,
            program,
            states: BTreeMap::new(),
            next: 0,
            created: 0,
            terminated: 0,
        };

        let root = engine.allocate(0, 0);
        engine.forest.borrow_mut().add_root(root.id)?;
        engine.scheduler.update(None, &[root], &[])?;

        Ok(engine)
    }

    /// Gets the last known view of `state`, if it is live.
    pub fn view(&self, state: StateId) -> Option<StateView> {
        self.states.get(&state).copied()
    }

    /// Gets the number of live states.
    pub fn live(&self) -> usize {
        self.states.len()
    }

    /// Gets the number of states ever created.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Gets the number of states that terminated.
    pub fn terminated(&self) -> usize {
        self.terminated
    }

    /// Advances the state chosen by the scheduler by one instruction, returning
    /// it, or returns [`None`] if no states are left.
    pub fn step(&mut self) -> anyhow::Result<Option<StateId>> {
        if self.scheduler.is_empty() {
            return Ok(None);
        }

        let id = self.scheduler.select_state()?;
        let mut view = self
            .view(id)
            .ok_or_else(|| anyhow!("Scheduler selected dead state {id}"))?;
        view.instructions += 1;

        let mut added = Vec::new();
        let mut removed = Vec::new();
        if view.instructions >= self.program.length {
            removed.push(id);
        } else if view.instructions % self.program.fork_every == 0
            && view.depth < self.program.max_depth
        {
            view.depth += 1;
            let child = self.allocate(view.depth, view.instructions);
            let leaf = self
                .forest
                .borrow()
                .leaf_of(id)
                .ok_or_else(|| anyhow!("{id} is missing from the forest"))?;
            self.forest.borrow_mut().attach(leaf, id, child.id)?;
            added.push(child);
        }
        self.states.insert(id, view);

        self.scheduler.update(Some(view), &added, &removed)?;
        for state in removed {
            self.forest.borrow_mut().remove_state(state)?;
            self.states.remove(&state);
            self.terminated += 1;
        }

        Ok(Some(id))
    }

    /// Steps until no states are left or `limit` steps were taken, returning
    /// the states in the order they were stepped.
    pub fn run(&mut self, limit: usize) -> anyhow::Result<Vec<StateId>> {
        let mut trace = Vec::new();
        while trace.len() < limit {
            let Some(state) = self.step()? else {
                break;
            };
            trace.push(state);
        }

        Ok(trace)
    }

    fn allocate(&mut self, depth: u32, instructions: u64) -> StateView {
        let view = StateView::new(self.next, depth, instructions);
        self.next += 1;
        self.created += 1;
        self.states.insert(view.id, view);
        view
    }
}

/// Creates an empty shared forest.
#[allow(unused)] // It is actually
pub fn new_forest() -> SharedForest {
    ForkForest::new().into_shared()
}

/// The record of everything a [`ToyMerger`] was asked to do.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MergeLog {
    pub attempts:   Vec<(StateId, StateId)>,
    pub terminated: Vec<StateId>,
    pub paused:     Vec<StateId>,
    pub resumed:    Vec<StateId>,
}

/// A merge executor whose merges either always or never succeed.
#[derive(Debug)]
pub struct ToyMerger {
    succeed: bool,
    log:     Rc<RefCell<MergeLog>>,
}

#[allow(unused)] // It is actually
impl ToyMerger {
    /// Constructs an executor along with a handle to its log.
    pub fn new(succeed: bool) -> (Box<Self>, Rc<RefCell<MergeLog>>) {
        let log = Rc::new(RefCell::new(MergeLog::default()));
        let executor = Box::new(Self {
            succeed,
            log: log.clone(),
        });
        (executor, log)
    }
}

impl MergeExecutor for ToyMerger {
    fn try_merge(&mut self, into: StateId, incoming: StateId) -> bool {
        self.log.borrow_mut().attempts.push((into, incoming));
        self.succeed
    }

    fn terminate(&mut self, state: StateId) {
        self.log.borrow_mut().terminated.push(state);
    }

    fn paused(&mut self, state: StateId) {
        self.log.borrow_mut().paused.push(state);
    }

    fn resumed(&mut self, state: StateId) {
        self.log.borrow_mut().resumed.push(state);
    }
}
