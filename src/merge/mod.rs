//! This module contains the region merge subsystem, which recombines states
//! that diverged between an open-merge and a matching close-merge.
//!
//! # Regions
//!
//! When a state executes an open-merge it starts a region, described by a
//! [`MergeHandler`]. Every state forked off a state that is open in the region
//! becomes open in it as well. When an open state reaches a close-merge it
//! stops being open and, at that [`ClosePoint`], either merges into a state
//! that got there earlier or waits there for others to arrive. Waiting states
//! are taken out of scheduling entirely.
//!
//! Once no open states remain, every waiting state is resumed and the region
//! is retired. The bounded variant of [`MergingScheduler`] does not always
//! wait that long: it steers scheduling towards open states that are likely to
//! close soon, and gives up on the region as soon as none are left.
//!
//! # Callbacks
//!
//! Merging two states and terminating the absorbed one are engine operations,
//! so the subsystem calls back into the engine through a [`MergeExecutor`].

pub mod handler;
pub mod scheduler;

use std::{fmt, fmt::Debug};

pub use handler::MergeHandler;
pub use scheduler::MergingScheduler;
use serde::{Deserialize, Serialize};

use crate::{
    data::vector_map::{FromUniqueIndex, ToUniqueIndex},
    state::StateId,
};

/// The identity of a merge region.
///
/// Regions are numbered from zero in the order they are opened.
#[derive(
    Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

impl ToUniqueIndex for RegionId {
    fn index(&self) -> usize {
        // Identities that do not fit can never have been handed out.
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl FromUniqueIndex for RegionId {
    fn from_index(index: usize) -> Self {
        Self(index as u64)
    }
}

/// The identity of a close-merge site, as chosen by the engine.
///
/// States only ever merge with states that reached the same close point.
#[derive(
    Copy, Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct ClosePoint(pub u64);

/// What happened to a state that reached a close-merge.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloseOutcome {
    /// The state was merged into `into`, and the engine was asked to
    /// terminate it.
    Merged { into: StateId },

    /// The state is now waiting at its close point and will not be scheduled
    /// until it is released.
    Parked,

    /// The state was not open in any region, so nothing happened.
    Unmatched,
}

/// A dynamically dispatched [`MergeExecutor`] instance.
pub type DynMergeExecutor = Box<dyn MergeExecutor>;

/// The operations the engine performs on behalf of the region merge
/// subsystem.
pub trait MergeExecutor
where
    Self: Debug,
{
    /// Tries to merge `incoming` into `into`, returning whether it worked.
    ///
    /// On success `into` must now represent both paths. On failure neither
    /// state may have changed.
    fn try_merge(&mut self, into: StateId, incoming: StateId) -> bool;

    /// Terminates `state`, which was merged into another state.
    ///
    /// The engine must report `state` as removed in its next update.
    fn terminate(&mut self, state: StateId);

    /// Called when `state` starts waiting at a close point.
    fn paused(&mut self, _state: StateId) {}

    /// Called when `state` is resumed after waiting at a close point.
    fn resumed(&mut self, _state: StateId) {}
}
