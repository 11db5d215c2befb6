//! Runtime configuration.

use lone_arena::{ArenaConfig, ArenaError, HEADER_BYTES};

use crate::heap::HeapList;

/// Errors detected while validating a [`RuntimeConfig`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Heaps must hold at least one cell.
    #[error("heap capacity must be at least 1")]
    ZeroHeapCapacity,
    /// A table's initial capacity is below the minimum.
    #[error("{table} capacity {requested} is below the minimum of {minimum}")]
    TableCapacity {
        /// Which table.
        table: &'static str,
        /// Configured capacity.
        requested: usize,
        /// Smallest accepted capacity.
        minimum: usize,
    },
    /// The first heap alone does not fit in the region.
    #[error("a heap of {heap_bytes} bytes does not fit in a {region_bytes}-byte region")]
    HeapExceedsRegion {
        /// Bytes one heap needs, block header included.
        heap_bytes: usize,
        /// Configured region size.
        region_bytes: usize,
    },
    /// The arena part of the configuration is invalid.
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// Configuration for a [`Runtime`](crate::Runtime).
///
/// Validated at construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// The backing region.
    pub arena: ArenaConfig,

    /// Cells per heap.
    ///
    /// Default: 512. Every heap has the same capacity.
    pub heap_capacity: u32,

    /// Initial capacity of the symbol table.
    ///
    /// Default: 256. Rounded up to a power of two.
    pub symbol_table_capacity: usize,

    /// Initial capacity of environments and the module registry.
    ///
    /// Default: 16. Rounded up to a power of two.
    pub environment_capacity: usize,

    /// Seed folded into every key hash. Default: 0 (plain FNV-1a).
    pub hash_seed: u64,
}

impl RuntimeConfig {
    /// Default cells per heap.
    pub const DEFAULT_HEAP_CAPACITY: u32 = 512;

    /// Default symbol table capacity.
    pub const DEFAULT_SYMBOL_TABLE_CAPACITY: usize = 256;

    /// Default environment capacity.
    pub const DEFAULT_ENVIRONMENT_CAPACITY: usize = 16;

    /// Create a config for a region of `region_bytes` bytes.
    ///
    /// Uses default values for all other parameters.
    pub fn new(region_bytes: usize) -> Self {
        Self {
            arena: ArenaConfig::new(region_bytes),
            heap_capacity: Self::DEFAULT_HEAP_CAPACITY,
            symbol_table_capacity: Self::DEFAULT_SYMBOL_TABLE_CAPACITY,
            environment_capacity: Self::DEFAULT_ENVIRONMENT_CAPACITY,
            hash_seed: 0,
        }
    }

    /// Check the configuration before any memory is committed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arena.validate()?;
        if self.heap_capacity == 0 {
            return Err(ConfigError::ZeroHeapCapacity);
        }
        for (table, requested) in [
            ("symbol table", self.symbol_table_capacity),
            ("environment", self.environment_capacity),
        ] {
            if requested < 1 {
                return Err(ConfigError::TableCapacity {
                    table,
                    requested,
                    minimum: 1,
                });
            }
        }
        let heap_bytes = HeapList::heap_bytes(self.heap_capacity) + HEADER_BYTES;
        if heap_bytes > self.arena.region_bytes {
            return Err(ConfigError::HeapExceedsRegion {
                heap_bytes,
                region_bytes: self.arena.region_bytes,
            });
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(ArenaConfig::DEFAULT_REGION_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.heap_capacity, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_heap_capacity_rejected() {
        let config = RuntimeConfig {
            heap_capacity: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHeapCapacity));
    }

    #[test]
    fn zero_table_capacity_rejected() {
        let config = RuntimeConfig {
            environment_capacity: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TableCapacity {
                table: "environment",
                ..
            })
        ));
    }

    #[test]
    fn heap_larger_than_region_rejected() {
        let config = RuntimeConfig {
            heap_capacity: 1024,
            ..RuntimeConfig::new(4096)
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HeapExceedsRegion { .. })
        ));
    }

    #[test]
    fn arena_errors_propagate() {
        let config = RuntimeConfig::new(100);
        assert!(matches!(config.validate(), Err(ConfigError::Arena(_))));
    }
}
