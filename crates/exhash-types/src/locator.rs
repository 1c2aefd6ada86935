//! Row locators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of a record inside a record file: block number plus slot within
/// the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowLocator {
    /// Zero-based block number.
    pub block: u32,
    /// Zero-based slot within the block.
    pub slot: u32,
}

impl RowLocator {
    #[must_use]
    pub const fn new(block: u32, slot: u32) -> Self {
        Self { block, slot }
    }
}

impl fmt::Display for RowLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.block, self.slot)
    }
}
