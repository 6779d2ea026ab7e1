//! This module contains errors pertaining to the fork-history forest.

use thiserror::Error;

use crate::{
    forest::{NodeId, TreeId},
    state::StateId,
};

/// Errors that occur when operating on a [`crate::forest::ForkForest`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Node {node:?} does not exist in the forest")]
    NoSuchNode { node: NodeId },

    #[error("Tree {tree:?} does not exist in the forest")]
    NoSuchTree { tree: TreeId },

    #[error("Node {node:?} is a fork point and cannot be used as a leaf")]
    NotALeaf { node: NodeId },

    #[error("{state} already occupies a leaf of the forest")]
    DuplicateState { state: StateId },

    #[error("{state} does not occupy any leaf of the forest")]
    UnknownState { state: StateId },

    #[error("A forest supports at most {maximum} observers")]
    TooManyObservers { maximum: usize },
}

/// The result type for functions that may return forest errors.
pub type Result<T> = std::result::Result<T, Error>;
