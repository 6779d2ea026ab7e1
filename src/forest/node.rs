//! This module contains the node type of the fork-history forest and the small
//! identifier types used to address it.

use std::fmt;

use crate::state::StateId;

/// The handle to a node in a [`crate::forest::ForkForest`].
///
/// Handles carry the generation of the arena slot they were issued for, so a
/// handle to a node that has since been removed never aliases a newer node
/// that reuses the same slot.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId {
    pub(crate) index:      u32,
    pub(crate) generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.index)
    }
}

/// The stable identity of one tree in a [`crate::forest::ForkForest`].
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TreeId(pub u32);

/// One of the (at most [`crate::constant::MAXIMUM_FOREST_OBSERVERS`]) parties
/// that track their own subset of the forest's leaves.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Observer(pub(crate) u8);

impl Observer {
    /// Gets the bit that represents this observer in an [`ObserverMask`].
    #[must_use]
    pub fn bit(self) -> ObserverMask {
        ObserverMask(1 << self.0)
    }
}

/// A set of observers, stored as a bitmask.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ObserverMask(pub(crate) u8);

impl ObserverMask {
    /// The set containing no observers.
    pub const EMPTY: ObserverMask = ObserverMask(0);

    /// Checks if `observer` is in the set.
    #[must_use]
    pub fn contains(self, observer: Observer) -> bool {
        self.0 & observer.bit().0 != 0
    }

    /// Checks if the set is empty.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Gets the union of `self` and `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Gets `self` with `observer` added.
    #[must_use]
    pub fn with(self, observer: Observer) -> Self {
        Self(self.0 | observer.bit().0)
    }

    /// Gets `self` with `observer` removed.
    #[must_use]
    pub fn without(self, observer: Observer) -> Self {
        Self(self.0 & !observer.bit().0)
    }
}

/// A node of the fork-history forest.
///
/// A node is either a leaf holding exactly one live state, or a fork point
/// with exactly two children and no state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub(crate) parent:    Option<NodeId>,
    pub(crate) children:  Option<[NodeId; 2]>,
    pub(crate) state:     Option<StateId>,
    pub(crate) tree:      TreeId,
    pub(crate) observers: ObserverMask,
}

impl Node {
    /// Constructs a new leaf in `tree` holding `state`.
    pub(crate) fn leaf(tree: TreeId, parent: Option<NodeId>, state: StateId) -> Self {
        Self {
            parent,
            children: None,
            state: Some(state),
            tree,
            observers: ObserverMask::EMPTY,
        }
    }

    /// Gets the parent of this node, or [`None`] for the root of a tree.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Gets the left child, taken by the first state passed to a fork.
    #[must_use]
    pub fn left(&self) -> Option<NodeId> {
        self.children.map(|[left, _]| left)
    }

    /// Gets the right child, taken by the second state passed to a fork.
    #[must_use]
    pub fn right(&self) -> Option<NodeId> {
        self.children.map(|[_, right]| right)
    }

    /// Gets the live state held by this node if it is a leaf.
    #[must_use]
    pub fn state(&self) -> Option<StateId> {
        self.state
    }

    /// Gets the tree that this node belongs to.
    #[must_use]
    pub fn tree(&self) -> TreeId {
        self.tree
    }

    /// Checks whether this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Gets the observers that own a leaf in the subtree rooted here.
    #[must_use]
    pub fn observers(&self) -> ObserverMask {
        self.observers
    }
}

#[cfg(test)]
mod test {
    use crate::forest::node::{Observer, ObserverMask};

    #[test]
    fn observer_masks_behave_as_sets() {
        let a = Observer(0);
        let b = Observer(5);
        let mask = ObserverMask::EMPTY.with(a).with(b);

        assert!(mask.contains(a));
        assert!(mask.contains(b));
        assert!(!mask.without(a).contains(a));
        assert!(mask.without(a).without(b).is_empty());
        assert_eq!(ObserverMask::EMPTY.with(a).union(ObserverMask::EMPTY.with(b)), mask);
    }
}
