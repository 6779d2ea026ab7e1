//! This module contains the definition of the [`StateView`] type, the only
//! picture of an engine execution state that the scheduling core ever sees.
//!
//! The surrounding engine creates, steps, forks and destroys states. The core
//! only needs to tell states apart and to read the handful of counters that
//! scheduling policies base their decisions on, so the engine hands it a cheap
//! copyable summary of each state whenever it reports that state in an update.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// The identity of an execution state, as allocated by the engine.
///
/// Identities must be unique among live states but are otherwise opaque, so
/// any `u64` will do.
#[derive(
    Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[repr(transparent)]
pub struct StateId(pub u64);

impl StateId {
    /// Gets the raw numeric identity.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state#{}", self.0)
    }
}

impl From<u64> for StateId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A summary of an execution state at the moment it is reported to the core.
///
/// Only `id`, `depth` and `instructions` are required. The remaining counters
/// feed the weighted scheduling metrics and default to zero for engines that
/// do not track them.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StateView {
    /// The identity of the state.
    pub id: StateId,

    /// The number of forks on the state's ancestry.
    pub depth: u32,

    /// The number of instructions the state has executed.
    pub instructions: u64,

    /// The total time spent answering solver queries on behalf of the state.
    pub query_cost: Duration,

    /// How many times the instruction the state is about to execute has been
    /// executed by any state.
    pub instruction_visits: u64,

    /// How many instructions have been executed under the state's current
    /// call path.
    pub call_path_instructions: u64,

    /// The minimum number of instructions between the state's position and
    /// an instruction no state has executed yet, or zero if unknown.
    pub distance_to_uncovered: u64,

    /// The number of instructions the state has executed since it last
    /// covered a new instruction, or zero if it never has.
    pub instructions_since_new_coverage: u64,
}

impl StateView {
    /// Constructs a view of the state `id` at `depth` that has executed
    /// `instructions` instructions, with every optional counter zeroed.
    #[must_use]
    pub fn new(id: impl Into<StateId>, depth: u32, instructions: u64) -> Self {
        Self {
            id: id.into(),
            depth,
            instructions,
            query_cost: Duration::ZERO,
            instruction_visits: 0,
            call_path_instructions: 0,
            distance_to_uncovered: 0,
            instructions_since_new_coverage: 0,
        }
    }

    /// Sets the `query_cost` counter to `value`.
    #[must_use]
    pub fn with_query_cost(mut self, value: Duration) -> Self {
        self.query_cost = value;
        self
    }

    /// Sets the `instruction_visits` counter to `value`.
    #[must_use]
    pub fn with_instruction_visits(mut self, value: u64) -> Self {
        self.instruction_visits = value;
        self
    }

    /// Sets the `call_path_instructions` counter to `value`.
    #[must_use]
    pub fn with_call_path_instructions(mut self, value: u64) -> Self {
        self.call_path_instructions = value;
        self
    }

    /// Sets the `distance_to_uncovered` counter to `value`.
    #[must_use]
    pub fn with_distance_to_uncovered(mut self, value: u64) -> Self {
        self.distance_to_uncovered = value;
        self
    }

    /// Sets the `instructions_since_new_coverage` counter to `value`.
    #[must_use]
    pub fn with_instructions_since_new_coverage(mut self, value: u64) -> Self {
        self.instructions_since_new_coverage = value;
        self
    }
}
