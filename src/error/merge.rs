//! This module contains errors pertaining to the region merge subsystem.

use thiserror::Error;

use crate::{merge::RegionId, state::StateId};

/// Errors that occur when opening, closing or releasing merge regions.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("{state} reached a close-merge while it was already closing")]
    AlreadyClosing { state: StateId },

    #[error("{state} is not open in region {region:?}")]
    NotOpen { state: StateId, region: RegionId },

    #[error("Region {region:?} is unknown")]
    NoSuchRegion { region: RegionId },
}
