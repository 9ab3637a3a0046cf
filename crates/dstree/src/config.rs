//! Tree construction settings.

use serde::{Deserialize, Serialize};

use crate::error::{DstreeError, Result};

/// Initial header values for a fresh tree.
///
/// Both factors are base-2 exponents:
/// - `node_growth_factor` seeds the node-table counter, which grows the table
///   to `(count + 1) << factor` and then increments itself on every growth.
/// - `child_growth_factor` is the fixed exponent for relocating a node's child
///   range to `(capacity + 1) << factor` slots. It is written to the header
///   once and stays constant for the life of the tree; unlike the node factor
///   it is not a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub node_growth_factor: u32,
    pub child_growth_factor: u32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            node_growth_factor: 1,
            child_growth_factor: 1,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_growth_factor >= u32::BITS || self.child_growth_factor >= u32::BITS {
            return Err(DstreeError::CapacityOverflow);
        }
        Ok(())
    }
}
