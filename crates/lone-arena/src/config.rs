//! Arena configuration parameters.

use crate::block::{ALIGNMENT, MIN_BLOCK_BYTES};
use crate::error::ArenaError;

/// Configuration for the arena allocator.
///
/// Validated at construction; all values are immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Size of the backing region in bytes.
    ///
    /// Default: 1 MiB. Must be a multiple of [`ALIGNMENT`] and large
    /// enough to hold one minimal block.
    pub region_bytes: usize,

    /// Smallest free remainder worth splitting off a block.
    ///
    /// Remainders below this stay attached to the allocation as slack.
    /// Default: [`MIN_BLOCK_BYTES`]. Must be at least that.
    pub split_threshold: usize,
}

impl ArenaConfig {
    /// Default region size: 1 MiB.
    pub const DEFAULT_REGION_BYTES: usize = 1 << 20;

    /// Default split threshold: one minimal block.
    pub const DEFAULT_SPLIT_THRESHOLD: usize = MIN_BLOCK_BYTES;

    /// Create a config for a region of `region_bytes` bytes.
    ///
    /// Uses default values for all other parameters.
    pub fn new(region_bytes: usize) -> Self {
        Self {
            region_bytes,
            split_threshold: Self::DEFAULT_SPLIT_THRESHOLD,
        }
    }

    /// Check that the configuration describes a usable arena.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if self.region_bytes < MIN_BLOCK_BYTES {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "region of {} bytes is smaller than one {MIN_BLOCK_BYTES}-byte block",
                    self.region_bytes
                ),
            });
        }
        if self.region_bytes % ALIGNMENT != 0 {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "region of {} bytes is not a multiple of {ALIGNMENT}",
                    self.region_bytes
                ),
            });
        }
        if self.split_threshold < MIN_BLOCK_BYTES {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "split threshold {} is below the {MIN_BLOCK_BYTES}-byte minimum block",
                    self.split_threshold
                ),
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REGION_BYTES)
    }
}
