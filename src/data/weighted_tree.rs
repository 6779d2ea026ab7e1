//! This module contains the definition of the [`WeightedTree`], a discrete
//! probability distribution over a changing set of items.
//!
//! # Structure
//!
//! Items live in the leaves of a binary tree whose shape follows the order of
//! insertion rather than the weights. Every internal node is a fork with
//! exactly two children, and every node caches the sum of the weights and the
//! number of leaves beneath it:
//!
//! ```text
//!                 [fork: sum 10, leaves 4]
//!                 /                      \
//!      [fork: sum 3, leaves 2]     [fork: sum 7, leaves 2]
//!        /            \              /            \
//!   [a: 1.0]      [b: 2.0]       [c: 3.0]      [d: 4.0]
//! ```
//!
//! Insertion descends towards the side with fewer leaves and lengthens the
//! leaf it lands on into a fork holding the old and the new item. Removal
//! splits a fork by promoting the surviving sibling into its place. This keeps
//! the depth logarithmic in the number of items without any rotations.
//!
//! Choosing descends from the root with a target cumulative weight, which
//! makes every operation `O(depth)`.

use std::{collections::HashMap, fmt::Display, hash::Hash};

use crate::error::selection::{Error, Result};

/// An index into the node arena of a [`WeightedTree`].
type Slot = usize;

/// A discrete probability distribution over items of type `T`, where the
/// probability of choosing an item is its weight divided by the total weight.
#[derive(Clone, Debug)]
pub struct WeightedTree<T>
where
    T: Copy + Display + Eq + Hash,
{
    /// The node arena. Vacant entries are recorded in `free`.
    nodes: Vec<Option<Node<T>>>,

    /// Arena slots that can be reused.
    free: Vec<Slot>,

    /// The root of the tree, if the tree is non-empty.
    root: Option<Slot>,

    /// The leaf holding each item.
    leaves: HashMap<T, Slot>,
}

/// A single node in the tree.
#[derive(Clone, Debug)]
struct Node<T> {
    parent: Option<Slot>,
    kind:   NodeKind<T>,

    /// The weight of this node's item, or the sum of its children's sums.
    sum: f64,

    /// The number of leaves in the subtree rooted at this node.
    count: usize,
}

#[derive(Clone, Debug)]
enum NodeKind<T> {
    Leaf { item: T, weight: f64 },
    Fork { left: Slot, right: Slot },
}

impl<T> WeightedTree<T>
where
    T: Copy + Display + Eq + Hash,
{
    /// Constructs a new, empty, tree.
    #[must_use]
    pub fn new() -> Self {
        let nodes = Vec::new();
        let free = Vec::new();
        let root = None;
        let leaves = HashMap::new();
        Self {
            nodes,
            free,
            root,
            leaves,
        }
    }

    /// Gets the number of items in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Checks whether the tree contains no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Checks whether `item` is in the tree.
    pub fn contains(&self, item: &T) -> bool {
        self.leaves.contains_key(item)
    }

    /// Gets the sum of the weights of all items in the tree.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.root.map_or(0.0, |root| self.node(root).sum)
    }

    /// Inserts `item` into the tree with the provided `weight`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `item` is already in the tree or if `weight` is
    /// negative or not finite.
    pub fn insert(&mut self, item: T, weight: f64) -> Result<()> {
        validate_weight(weight)?;
        if self.leaves.contains_key(&item) {
            return Err(Error::DuplicateItem {
                item: item.to_string(),
            });
        }

        let leaf = self.allocate(Node {
            parent: None,
            kind:   NodeKind::Leaf { item, weight },
            sum:    weight,
            count:  1,
        });
        self.leaves.insert(item, leaf);

        let Some(root) = self.root else {
            self.root = Some(leaf);
            return Ok(());
        };

        // Walk towards the lighter side by leaf count until reaching a leaf.
        let mut target = root;
        while let NodeKind::Fork { left, right } = self.node(target).kind {
            target = if self.node(right).count < self.node(left).count {
                right
            } else {
                left
            };
        }

        // Lengthen the target leaf into a fork holding it and the new leaf.
        let parent = self.node(target).parent;
        let fork = self.allocate(Node {
            parent,
            kind: NodeKind::Fork {
                left:  target,
                right: leaf,
            },
            sum: 0.0,
            count: 0,
        });
        self.node_mut(target).parent = Some(fork);
        self.node_mut(leaf).parent = Some(fork);
        self.replace_child(parent, target, fork);
        self.propagate(Some(fork));

        Ok(())
    }

    /// Removes `item` from the tree.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `item` is not in the tree.
    pub fn remove(&mut self, item: &T) -> Result<()> {
        let leaf = self.leaves.remove(item).ok_or_else(|| Error::MissingItem {
            item: item.to_string(),
        })?;

        let Some(parent) = self.node(leaf).parent else {
            self.release(leaf);
            self.root = None;
            return Ok(());
        };

        // Split the parent fork by promoting the sibling into its place.
        let NodeKind::Fork { left, right } = self.node(parent).kind else {
            unreachable!("The parent of a node is always a fork")
        };
        let sibling = if left == leaf { right } else { left };
        let grandparent = self.node(parent).parent;
        self.node_mut(sibling).parent = grandparent;
        self.replace_child(grandparent, parent, sibling);
        self.release(leaf);
        self.release(parent);
        self.propagate(grandparent);

        Ok(())
    }

    /// Sets the weight of `item` to `weight`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `item` is not in the tree or if `weight` is negative
    /// or not finite.
    pub fn update(&mut self, item: &T, weight: f64) -> Result<()> {
        validate_weight(weight)?;
        let leaf = *self.leaves.get(item).ok_or_else(|| Error::MissingItem {
            item: item.to_string(),
        })?;

        if let NodeKind::Leaf { weight: w, .. } = &mut self.node_mut(leaf).kind {
            *w = weight;
        }
        self.propagate(Some(leaf));

        Ok(())
    }

    /// Gets the weight of `item`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `item` is not in the tree.
    pub fn weight(&self, item: &T) -> Result<f64> {
        let leaf = *self.leaves.get(item).ok_or_else(|| Error::MissingItem {
            item: item.to_string(),
        })?;

        match self.node(leaf).kind {
            NodeKind::Leaf { weight, .. } => Ok(weight),
            NodeKind::Fork { .. } => unreachable!("Items are only ever stored in leaves"),
        }
    }

    /// Chooses an item such that, for `fraction` drawn uniformly from `[0,
    /// 1)`, each item is returned with probability equal to its share of the
    /// total weight.
    ///
    /// If every weight is zero the leftmost item is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the tree is empty or `fraction` is outside `[0, 1)`.
    pub fn choose(&self, fraction: f64) -> Result<T> {
        if !(0.0..1.0).contains(&fraction) {
            return Err(Error::InvalidFraction { fraction });
        }
        let mut current = self.root.ok_or(Error::Empty)?;
        let mut target = fraction * self.node(current).sum;

        loop {
            match self.node(current).kind {
                NodeKind::Leaf { item, .. } => return Ok(item),
                NodeKind::Fork { left, right } => {
                    let left_sum = self.node(left).sum;
                    // Rounding can leave the target at or past the total, so never walk
                    // into a right subtree that carries no weight.
                    if target < left_sum || self.node(right).sum <= 0.0 {
                        current = left;
                    } else {
                        target -= left_sum;
                        current = right;
                    }
                }
            }
        }
    }

    /// An iterator over every item and its weight, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (T, f64)> + '_ {
        self.nodes.iter().flatten().filter_map(|node| match node.kind {
            NodeKind::Leaf { item, weight } => Some((item, weight)),
            NodeKind::Fork { .. } => None,
        })
    }

    /// Gets the length of the longest root-to-leaf path, counting the root as
    /// depth zero.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(Slot, usize)> = self.root.map(|r| (r, 0)).into_iter().collect();
        while let Some((slot, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let NodeKind::Fork { left, right } = self.node(slot).kind {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }

        deepest
    }

    /// Recomputes the cached sums and counts from `start` up to the root.
    ///
    /// Sums are always rebuilt from the children rather than adjusted by a
    /// delta, so rounding errors never accumulate in the caches.
    fn propagate(&mut self, start: Option<Slot>) {
        let mut current = start;
        while let Some(slot) = current {
            let (sum, count) = match self.node(slot).kind {
                NodeKind::Leaf { weight, .. } => (weight, 1),
                NodeKind::Fork { left, right } => {
                    let (left, right) = (self.node(left), self.node(right));
                    (left.sum + right.sum, left.count + right.count)
                }
            };
            let node = self.node_mut(slot);
            node.sum = sum;
            node.count = count;
            current = node.parent;
        }
    }

    /// Makes `new` take the place of `old` as a child of `parent`, or as the
    /// root if there is no parent.
    fn replace_child(&mut self, parent: Option<Slot>, old: Slot, new: Slot) {
        match parent {
            None => self.root = Some(new),
            Some(parent) => {
                if let NodeKind::Fork { left, right } = &mut self.node_mut(parent).kind {
                    if *left == old {
                        *left = new;
                    } else if *right == old {
                        *right = new;
                    }
                }
            }
        }
    }

    fn allocate(&mut self, node: Node<T>) -> Slot {
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = Some(node);
            slot
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn release(&mut self, slot: Slot) {
        self.nodes[slot] = None;
        self.free.push(slot);
    }

    /// # Panics
    ///
    /// Panics if `slot` is vacant, which is a programmer bug.
    fn node(&self, slot: Slot) -> &Node<T> {
        self.nodes[slot]
            .as_ref()
            .expect("Live slots are never vacant")
    }

    /// # Panics
    ///
    /// Panics if `slot` is vacant, which is a programmer bug.
    fn node_mut(&mut self, slot: Slot) -> &mut Node<T> {
        self.nodes[slot]
            .as_mut()
            .expect("Live slots are never vacant")
    }
}

impl<T> Default for WeightedTree<T>
where
    T: Copy + Display + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Checks that `weight` can be used as a selection weight.
fn validate_weight(weight: f64) -> Result<()> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidWeight { weight })
    }
}
