use std::fmt;
use std::sync::Arc;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::error::{Error, Result};

/// Configuration for building, syncing and verifying tables.
#[derive(Clone)]
pub struct Options {
    /// Ordering of user keys. Must match the ordering of every source fed
    /// to the builder and of every table it reads back. Filters hash raw
    /// key bytes, so an ordering that equates distinct byte strings needs
    /// `bloom_false_positive_rate: None`.
    pub comparator: Arc<dyn Comparator>,

    /// Drop superseded versions of a user key while building, when no open
    /// snapshot can still observe them.
    pub purge_redundant_kvs_while_flush: bool,

    /// Skip the sync step entirely. Tables survive a process crash but not
    /// necessarily a power loss.
    pub disable_data_sync: bool,

    /// Sync with fsync (data + metadata) instead of fdatasync.
    pub use_fsync: bool,

    /// Target size of an uncompressed data block.
    pub block_size: usize,

    /// Bloom filter false positive rate; `None` writes no filter block.
    pub bloom_false_positive_rate: Option<f64>,

    /// Verification reads and checksums every data block instead of only
    /// the footer, index and filter.
    pub paranoid_file_checks: bool,

    /// Maximum number of open tables held by the table cache.
    pub table_cache_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            comparator: Arc::new(BytewiseComparator),
            purge_redundant_kvs_while_flush: true,
            disable_data_sync: false,
            use_fsync: false,
            block_size: 4096,
            bloom_false_positive_rate: Some(0.01),
            paranoid_file_checks: false,
            table_cache_capacity: 64,
        }
    }
}

impl Options {
    /// Reject settings no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::InvalidArgument("block_size must be > 0".into()));
        }
        if let Some(fpr) = self.bloom_false_positive_rate {
            if !(fpr > 0.0 && fpr < 1.0) {
                return Err(Error::InvalidArgument(format!(
                    "bloom_false_positive_rate must be in (0, 1), got {fpr}"
                )));
            }
        }
        if self.table_cache_capacity == 0 {
            return Err(Error::InvalidArgument(
                "table_cache_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field(
                "purge_redundant_kvs_while_flush",
                &self.purge_redundant_kvs_while_flush,
            )
            .field("disable_data_sync", &self.disable_data_sync)
            .field("use_fsync", &self.use_fsync)
            .field("block_size", &self.block_size)
            .field("bloom_false_positive_rate", &self.bloom_false_positive_rate)
            .field("paranoid_file_checks", &self.paranoid_file_checks)
            .field("table_cache_capacity", &self.table_cache_capacity)
            .finish()
    }
}
