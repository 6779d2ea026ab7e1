//! This module contains the primary error type for the library's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.
//!
//! Every error returned by the core signals a broken contract between the core
//! and the engine driving it, such as removing an item twice or selecting from
//! an empty scheduler. The core leaves its structures untouched when it returns
//! one, but the engine should treat them as fatal. Conditions that do not
//! endanger correctness are logged instead of being returned.

pub mod forest;
pub mod merge;
pub mod scheduling;
pub mod selection;

use thiserror::Error;

/// The interface result type for the library.
///
/// Subsystems that can fail in only one way return their more-specific child
/// error types, while anything crossing subsystem boundaries (such as the
/// [`crate::scheduler::Scheduler`] interface) returns this type.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// Errors from the weighted selection tree.
    #[error(transparent)]
    Selection(#[from] selection::Error),

    /// Errors from the fork-history forest.
    #[error(transparent)]
    Forest(#[from] forest::Error),

    /// Errors from the scheduling policies.
    #[error(transparent)]
    Scheduling(#[from] scheduling::Error),

    /// Errors from the region merge subsystem.
    #[error(transparent)]
    Merge(#[from] merge::Error),
}
