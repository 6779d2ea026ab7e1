//! This module contains errors pertaining to the scheduling policies.

use thiserror::Error;

use crate::state::StateId;

/// Errors that occur when driving a [`crate::scheduler::Scheduler`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("A state was requested from a scheduler with no live states")]
    NoLiveStates,

    #[error("{state} was added to a scheduler that already holds it")]
    DuplicateState { state: StateId },

    #[error("{state} was removed from a scheduler that does not hold it")]
    UnknownState { state: StateId },

    #[error("The random path policy requires a fork-history forest")]
    MissingForest,

    #[error("At least one core scheduling policy must be configured")]
    NoCorePolicy,
}
