use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::sstable::block::BlockIterator;
use crate::sstable::reader::SSTable;

/// Two-level iterator over an SSTable: index entry → data block → entry.
///
/// Blocks are read lazily. A block that fails to read or checksum ends the
/// iteration; the failure is kept and reported by `status()`, which is how
/// a compaction input surfaces corruption after it looks exhausted.
pub struct SSTableIterator {
    table: Arc<SSTable>,
    block_idx: usize,
    block_iter: Option<BlockIterator>,
    error: Option<Error>,
}

impl SSTableIterator {
    pub(crate) fn new(table: Arc<SSTable>) -> Self {
        let mut iter = SSTableIterator {
            table,
            block_idx: 0,
            block_iter: None,
            error: None,
        };
        iter.seek_to_first();
        iter
    }

    /// Load block `idx`; on failure remember the error and become invalid.
    fn load_block(&mut self, idx: usize) -> bool {
        self.block_idx = idx;
        if idx >= self.table.index().len() {
            self.block_iter = None;
            return false;
        }
        match self.table.read_block(idx) {
            Ok(block) => {
                self.block_iter = Some(block.iter(self.table.comparator()));
                true
            }
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
                self.block_iter = None;
                false
            }
        }
    }

    /// Move forward past exhausted (or empty) blocks.
    fn skip_exhausted_blocks(&mut self) {
        while self.block_iter.as_ref().is_some_and(|b| !b.is_valid()) {
            if !self.load_block(self.block_idx + 1) {
                return;
            }
        }
    }

    fn current(&self) -> &BlockIterator {
        self.block_iter.as_ref().expect("sstable iterator is not valid")
    }
}

impl StorageIterator for SSTableIterator {
    fn key(&self) -> &[u8] {
        self.current().key()
    }

    fn value(&self) -> &[u8] {
        self.current().value()
    }

    fn is_valid(&self) -> bool {
        self.block_iter.as_ref().is_some_and(|b| b.is_valid())
    }

    fn next(&mut self) {
        if let Some(block) = self.block_iter.as_mut() {
            block.next();
            self.skip_exhausted_blocks();
        }
    }

    fn seek_to_first(&mut self) {
        if self.load_block(0) {
            self.skip_exhausted_blocks();
        }
    }

    fn seek(&mut self, key: &[u8]) {
        let comparator = self.table.comparator();
        let idx = self
            .table
            .index()
            .partition_point(|e| comparator.compare(&e.last_key, key) == Ordering::Less);
        if self.load_block(idx) {
            if let Some(block) = self.block_iter.as_mut() {
                block.seek(key);
            }
            self.skip_exhausted_blocks();
        }
    }

    fn status(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
