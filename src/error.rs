//! Error types shared by the table and the maps built on it.

use thiserror::Error;

/// The allocation capability could not provide a block.
///
/// Also raised when the requested byte size overflows `usize`, so a
/// caller never silently receives a smaller table than it asked for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("allocation of {size} bytes with alignment {align} failed")]
pub struct AllocationError {
    pub size: usize,
    pub align: usize,
}

impl AllocationError {
    pub fn new(size: usize, align: usize) -> Self {
        Self { size, align }
    }
}

/// Recoverable failures of map operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum MapError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    /// The reserved clear value was used as a real key.
    #[error("the clear value is reserved and cannot be stored as a key")]
    InvalidKey,
    #[error("key not present in map")]
    MissingKey,
}
