//! This module contains errors pertaining to the weighted selection tree.

use thiserror::Error;

/// Errors that occur when operating on a
/// [`crate::data::weighted_tree::WeightedTree`].
///
/// Items are reported by their display form, as the tree is generic over the
/// item type.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    #[error("The item {item} is already present in the tree")]
    DuplicateItem { item: String },

    #[error("The item {item} is not present in the tree")]
    MissingItem { item: String },

    #[error("Weight {weight} is not a finite non-negative number")]
    InvalidWeight { weight: f64 },

    #[error("Selection fraction {fraction} is outside of [0, 1)")]
    InvalidFraction { fraction: f64 },

    #[error("Cannot choose an item from an empty tree")]
    Empty,
}

/// The result type for functions that may return selection errors.
pub type Result<T> = std::result::Result<T, Error>;
