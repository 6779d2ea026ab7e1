//! This module contains the fork-history forest, recording every split and
//! termination of the execution states explored by the engine.
//!
//! # Trees and Observers
//!
//! The forest is a disjoint union of independently-rooted binary trees, each
//! started by [`ForkForest::add_root`] and identified by a stable [`TreeId`].
//! Every leaf holds exactly one live state and every other node is a fork
//! point with exactly two children. The engine keeps the structure current by
//! calling [`ForkForest::attach`] whenever a state forks and
//! [`ForkForest::remove`] whenever one terminates.
//!
//! Several schedulers can walk the same forest while each only considers the
//! states that belong to it. Such a scheduler registers as an [`Observer`] and
//! marks the leaves it owns; every node caches the set of observers that own
//! at least one leaf beneath it, so a walk can avoid subtrees that contain
//! nothing of interest to it.
//!
//! # Handles
//!
//! Nodes live in an arena and are addressed by [`NodeId`]s. Removing a node
//! invalidates its handle and recycles the slot, and stale handles are
//! rejected rather than silently resolving to whatever reuses the slot.

pub mod dot;
pub mod node;

use std::{cell::RefCell, collections::HashMap, rc::Rc};

pub use node::{Node, NodeId, Observer, ObserverMask, TreeId};

use crate::{
    constant::MAXIMUM_FOREST_OBSERVERS,
    error::forest::{Error, Result},
    state::StateId,
};

/// A forest that is shared between the engine and the schedulers that walk it.
pub type SharedForest = Rc<RefCell<ForkForest>>;

/// The fork-history forest.
#[derive(Clone, Debug, Default)]
pub struct ForkForest {
    /// The node arena.
    slots: Vec<Slot>,

    /// Arena indices that can be reused.
    free: Vec<u32>,

    /// The root of every tree, indexed by [`TreeId`]. Emptied trees keep their
    /// entry so that their identifiers stay stable.
    roots: Vec<Option<NodeId>>,

    /// The leaf holding each live state.
    leaves: HashMap<StateId, NodeId>,

    /// The observers that have been handed out.
    registered: ObserverMask,

    /// The number of live nodes.
    live: usize,
}

/// One entry in the node arena.
#[derive(Clone, Debug, Default)]
struct Slot {
    generation: u32,
    node:       Option<Node>,
}

impl ForkForest {
    /// Constructs a new, empty, forest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the forest so that it can be shared with schedulers.
    #[must_use]
    pub fn into_shared(self) -> SharedForest {
        Rc::new(RefCell::new(self))
    }

    /// Starts a new tree consisting of a single leaf holding `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `state` already occupies a leaf.
    pub fn add_root(&mut self, state: StateId) -> Result<TreeId> {
        if self.leaves.contains_key(&state) {
            return Err(Error::DuplicateState { state });
        }

        let tree = TreeId(
            u32::try_from(self.roots.len()).expect("Tree count should not exceed u32::MAX"),
        );
        let root = self.allocate(Node::leaf(tree, None, state));
        self.roots.push(Some(root));
        self.leaves.insert(state, root);

        Ok(tree)
    }

    /// Splits the leaf `leaf` into a fork point with two new leaves holding
    /// `left` and `right` respectively, returning the new leaves.
    ///
    /// One of the two states is usually the one that occupied `leaf` before
    /// the split. That child inherits the observers of `leaf`, while the other
    /// child starts out unobserved.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `leaf` does not exist or is not a leaf, or if either
    /// state already occupies some other leaf.
    pub fn attach(
        &mut self,
        leaf: NodeId,
        left: StateId,
        right: StateId,
    ) -> Result<(NodeId, NodeId)> {
        let node = self.node(leaf)?;
        if !node.is_leaf() {
            return Err(Error::NotALeaf { node: leaf });
        }
        let occupant = node.state;
        let tree = node.tree;
        let inherited = node.observers;

        if left == right {
            return Err(Error::DuplicateState { state: left });
        }
        for state in [left, right] {
            if Some(state) != occupant && self.leaves.contains_key(&state) {
                return Err(Error::DuplicateState { state });
            }
        }

        let mut left_node = Node::leaf(tree, Some(leaf), left);
        let mut right_node = Node::leaf(tree, Some(leaf), right);
        if occupant == Some(left) {
            left_node.observers = inherited;
        } else if occupant == Some(right) {
            right_node.observers = inherited;
        }
        let left_id = self.allocate(left_node);
        let right_id = self.allocate(right_node);

        if let Some(occupant) = occupant {
            self.leaves.remove(&occupant);
        }
        self.leaves.insert(left, left_id);
        self.leaves.insert(right, right_id);

        let fork = self.node_mut(leaf);
        fork.children = Some([left_id, right_id]);
        fork.state = None;
        self.refresh_observers(Some(leaf));

        Ok((left_id, right_id))
    }

    /// Removes the leaf `leaf` along with the state it holds.
    ///
    /// The fork point above `leaf` would be left with a single child, so that
    /// child takes the fork point's place. Removing the only leaf of a tree
    /// leaves that tree empty without affecting any other tree.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `leaf` does not exist or is not a leaf.
    pub fn remove(&mut self, leaf: NodeId) -> Result<()> {
        let node = self.node(leaf)?;
        if !node.is_leaf() {
            return Err(Error::NotALeaf { node: leaf });
        }
        let state = node.state;
        let parent = node.parent;
        let tree = node.tree;

        if let Some(state) = state {
            self.leaves.remove(&state);
        }
        self.release(leaf);

        match parent {
            None => self.roots[tree.0 as usize] = None,
            Some(parent) => {
                let [first, second] = self
                    .node_ref(parent)
                    .children
                    .expect("The parent of a node is always a fork point");
                let sibling = if first == leaf { second } else { first };
                let grandparent = self.node_ref(parent).parent;

                self.node_mut(sibling).parent = grandparent;
                self.replace_child(tree, grandparent, parent, sibling);
                self.release(parent);
                self.refresh_observers(grandparent);
            }
        }

        Ok(())
    }

    /// Removes the leaf holding `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `state` does not occupy a leaf.
    pub fn remove_state(&mut self, state: StateId) -> Result<()> {
        let leaf = self.leaf_of(state).ok_or(Error::UnknownState { state })?;
        self.remove(leaf)
    }

    /// Gets the leaf currently holding `state`, if any.
    #[must_use]
    pub fn leaf_of(&self, state: StateId) -> Option<NodeId> {
        self.leaves.get(&state).copied()
    }

    /// Gets the node addressed by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `id` does not address a live node.
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(Error::NoSuchNode { node: id })
    }

    /// Gets the identifier of the tree containing `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `id` does not address a live node.
    pub fn tree_id(&self, id: NodeId) -> Result<TreeId> {
        self.node(id).map(Node::tree)
    }

    /// Gets the root of `tree`, or [`None`] if every leaf of it was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `tree` was never created.
    pub fn root(&self, tree: TreeId) -> Result<Option<NodeId>> {
        self.roots
            .get(tree.0 as usize)
            .copied()
            .ok_or(Error::NoSuchTree { tree })
    }

    /// Gets the identifiers of all trees ever created, including empty ones.
    pub fn trees(&self) -> impl Iterator<Item = TreeId> + '_ {
        (0..self.roots.len()).map(|i| TreeId(i as u32))
    }

    /// Gets the roots of all non-empty trees.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.iter().flatten().copied()
    }

    /// Gets the states held by the leaves of `tree`, from left to right.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `tree` was never created.
    pub fn leaves(&self, tree: TreeId) -> Result<Vec<StateId>> {
        let mut states = Vec::new();
        let mut stack: Vec<NodeId> = self.root(tree)?.into_iter().collect();
        while let Some(id) = stack.pop() {
            let node = self.node_ref(id);
            match node.children {
                Some([left, right]) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => states.extend(node.state),
            }
        }

        Ok(states)
    }

    /// Gets the number of trees ever created.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.roots.len()
    }

    /// Gets the number of live states in the forest.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.leaves.len()
    }

    /// Gets the number of live nodes in the forest.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Checks if the forest contains no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Hands out a new observer that can mark its own subset of leaves.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if every observer slot is in use.
    pub fn register_observer(&mut self) -> Result<Observer> {
        let observer = (0..MAXIMUM_FOREST_OBSERVERS)
            .map(|bit| Observer(bit as u8))
            .find(|observer| !self.registered.contains(*observer))
            .ok_or(Error::TooManyObservers {
                maximum: MAXIMUM_FOREST_OBSERVERS,
            })?;
        self.registered = self.registered.with(observer);

        Ok(observer)
    }

    /// Returns `observer` to the pool, clearing every mark it made.
    pub fn release_observer(&mut self, observer: Observer) {
        self.registered = self.registered.without(observer);
        for node in self.slots.iter_mut().filter_map(|slot| slot.node.as_mut()) {
            node.observers = node.observers.without(observer);
        }
    }

    /// Marks the leaf holding `state` as owned by `observer`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `state` does not occupy a leaf.
    pub fn mark(&mut self, state: StateId, observer: Observer) -> Result<()> {
        let leaf = self.leaf_of(state).ok_or(Error::UnknownState { state })?;
        let node = self.node_mut(leaf);
        node.observers = node.observers.with(observer);
        let parent = node.parent;
        self.refresh_observers(parent);

        Ok(())
    }

    /// Clears the mark that `observer` placed on the leaf holding `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `state` does not occupy a leaf.
    pub fn unmark(&mut self, state: StateId, observer: Observer) -> Result<()> {
        let leaf = self.leaf_of(state).ok_or(Error::UnknownState { state })?;
        let node = self.node_mut(leaf);
        node.observers = node.observers.without(observer);
        let parent = node.parent;
        self.refresh_observers(parent);

        Ok(())
    }

    /// Recomputes the observer sets of the fork points from `start` upwards,
    /// stopping as soon as a set is unchanged.
    fn refresh_observers(&mut self, start: Option<NodeId>) {
        let mut current = start;
        while let Some(id) = current {
            let node = self.node_ref(id);
            let Some([left, right]) = node.children else {
                current = node.parent;
                continue;
            };
            let observers = self
                .node_ref(left)
                .observers
                .union(self.node_ref(right).observers);
            let node = self.node_mut(id);
            if node.observers == observers {
                break;
            }
            node.observers = observers;
            current = node.parent;
        }
    }

    /// Makes `new` take the place of `old` as a child of `parent`, or as the
    /// root of `tree` if there is no parent.
    fn replace_child(&mut self, tree: TreeId, parent: Option<NodeId>, old: NodeId, new: NodeId) {
        match parent {
            None => self.roots[tree.0 as usize] = Some(new),
            Some(parent) => {
                if let Some(children) = self.node_mut(parent).children.as_mut() {
                    for child in children.iter_mut().filter(|child| **child == old) {
                        *child = new;
                    }
                }
            }
        }
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index =
                u32::try_from(self.slots.len()).expect("Node count should not exceed u32::MAX");
            self.slots.push(Slot {
                generation: 0,
                node:       Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        let slot = &mut self.slots[id.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
    }

    /// # Panics
    ///
    /// Panics if `id` is stale, which is a programmer bug.
    fn node_ref(&self, id: NodeId) -> &Node {
        self.node(id).expect("Internal handles are always live")
    }

    /// # Panics
    ///
    /// Panics if `id` is stale, which is a programmer bug.
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.index as usize]
            .node
            .as_mut()
            .expect("Internal handles are always live")
    }
}
