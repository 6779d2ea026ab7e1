//! This module contains custom data structures used in the implementation of
//! the scheduling core.

pub mod vector_map;
pub mod weighted_tree;
