//! This module contains the Graphviz rendering of the fork-history forest,
//! intended only for visual debugging.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::forest::{ForkForest, NodeId};

/// A [`Display`] adapter that renders a [`ForkForest`] as a Graphviz digraph.
///
/// # Conventions
///
/// Every node is drawn as a diamond. Leaves are labelled with the state they
/// hold and filled green, while fork points are labelled with their handle.
/// Each edge is labelled with the bits of the path from the root of its tree
/// to the child, `0` for a left turn and `1` for a right turn.
#[derive(Clone, Copy, Debug)]
pub struct Dot<'a> {
    forest: &'a ForkForest,
}

impl<'a> Dot<'a> {
    /// Constructs a new renderer for `forest`.
    #[must_use]
    pub fn new(forest: &'a ForkForest) -> Self {
        Self { forest }
    }
}

impl Display for Dot<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "digraph forest {{")?;
        writeln!(f, "  node [shape=diamond];")?;

        for tree in self.forest.trees() {
            let Ok(Some(root)) = self.forest.root(tree) else {
                continue;
            };

            let mut stack: Vec<(NodeId, Vec<u8>)> = vec![(root, Vec::new())];
            while let Some((id, path)) = stack.pop() {
                let Ok(node) = self.forest.node(id) else {
                    continue;
                };

                match node.state() {
                    Some(state) => writeln!(
                        f,
                        "  {id} [label=\"{state}\", style=filled, fillcolor=green];"
                    )?,
                    None => writeln!(f, "  {id} [label=\"{id}\"];")?,
                }

                for (bit, child) in [node.left(), node.right()].into_iter().enumerate() {
                    let Some(child) = child else {
                        continue;
                    };
                    let mut child_path = path.clone();
                    child_path.push(u8::from(bit == 1));
                    writeln!(
                        f,
                        "  {id} -> {child} [label=\"{}\"];",
                        child_path.iter().join("")
                    )?;
                    stack.push((child, child_path));
                }
            }
        }

        write!(f, "}}")
    }
}

impl ForkForest {
    /// Renders the forest as a Graphviz digraph.
    #[must_use]
    pub fn to_dot(&self) -> String {
        Dot::new(self).to_string()
    }
}
