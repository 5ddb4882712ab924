//! Configuration options consumed by the format engine.

use std::sync::Arc;

use crate::cache::BlockCache;
use crate::sstable::{CompressionType, FilterPolicy};
use crate::util::comparator::{BytewiseComparator, Comparator};
use crate::{Error, Result};

/// Default target size for uncompressed data blocks (4KB).
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Default number of entries between restart points.
pub const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;

/// Options controlling how tables are built and read.
#[derive(Clone)]
pub struct Options {
    /// Comparator defining the key order inside blocks and tables.
    ///
    /// Every table must be read with the comparator it was written with.
    pub comparator: Arc<dyn Comparator>,

    /// Enable extra verification (checksums on every block read).
    pub paranoid_checks: bool,

    /// Approximate size of uncompressed data per block.
    pub block_size: usize,

    /// Number of keys between restart points for prefix compression.
    pub block_restart_interval: usize,

    /// Compression applied to blocks on write.
    pub compression: CompressionType,

    /// Filter policy used to reduce disk reads on point lookups.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Shared cache for uncompressed data blocks.
    pub block_cache: Option<Arc<BlockCache>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator::new()),
            paranoid_checks: false,
            block_size: DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            compression: CompressionType::None,
            filter_policy: None,
            block_cache: None,
        }
    }
}

impl Options {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        if self.block_size < 64 {
            return Err(Error::invalid_argument(
                "block_size must be at least 64 bytes",
            ));
        }
        if self.block_restart_interval < 1 {
            return Err(Error::invalid_argument(
                "block_restart_interval must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Options controlling a single read operation.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Verify block checksums on this read.
    pub verify_checksums: bool,

    /// Cache blocks loaded by this read.
    ///
    /// Callers doing large one-shot scans may want to disable this.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}

impl ReadOptions {
    /// Create read options with defaults.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert!(!opts.paranoid_checks);
        assert_eq!(opts.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(opts.block_restart_interval, DEFAULT_BLOCK_RESTART_INTERVAL);
        assert_eq!(opts.compression, CompressionType::None);
        assert!(opts.filter_policy.is_none());
        assert!(opts.block_cache.is_none());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        let mut opts = Options::default();
        opts.block_size = 16; // Too small
        assert!(opts.validate().is_err());

        let mut opts = Options::default();
        opts.block_restart_interval = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_default_read_options() {
        let opts = ReadOptions::default();
        assert!(!opts.verify_checksums);
        assert!(opts.fill_cache);
    }
}
