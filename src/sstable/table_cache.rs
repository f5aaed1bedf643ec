use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::filename::table_file_name;
use crate::options::Options;
use crate::sstable::iterator::SSTableIterator;
use crate::sstable::reader::SSTable;
use crate::table::TableVerifier;
use crate::types::LookupResult;

/// Bounded cache of open tables, keyed by file number.
///
/// Opening a table costs a footer, index and filter read, so readers and
/// the build verifier share handles through here. Eviction is least
/// recently used. Tables are opened outside the lock; two threads racing on
/// the same number both open it and the later insert wins.
pub struct TableCache {
    dir: PathBuf,
    options: Options,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    tables: HashMap<u64, Arc<SSTable>>,
    /// Least recently used first.
    order: VecDeque<u64>,
}

impl CacheState {
    fn touch(&mut self, file_number: u64) {
        self.order.retain(|&n| n != file_number);
        self.order.push_back(file_number);
    }

    fn remove(&mut self, file_number: u64) -> bool {
        self.order.retain(|&n| n != file_number);
        self.tables.remove(&file_number).is_some()
    }
}

impl TableCache {
    /// Cache for tables in `dir`, holding at most
    /// `options.table_cache_capacity` open tables.
    pub fn new(dir: impl Into<PathBuf>, options: Options) -> Self {
        TableCache {
            dir: dir.into(),
            options,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Open table `file_number` (or reuse a cached handle of the same size).
    pub fn find_table(&self, file_number: u64, file_size: u64) -> Result<Arc<SSTable>> {
        {
            let mut state = self.state.lock();
            if let Some(table) = state.tables.get(&file_number).cloned() {
                if table.file_size() == file_size {
                    state.touch(file_number);
                    return Ok(table);
                }
                state.remove(file_number);
            }
        }

        let path = table_file_name(&self.dir, file_number);
        let table = Arc::new(SSTable::open(&path, file_size, self.options.comparator.clone())?);
        debug!(file_number, file_size, blocks = table.num_blocks(), "opened table");

        let mut state = self.state.lock();
        state.tables.insert(file_number, Arc::clone(&table));
        state.touch(file_number);
        while state.tables.len() > self.options.table_cache_capacity {
            let Some(victim) = state.order.pop_front() else {
                break;
            };
            state.tables.remove(&victim);
            debug!(file_number = victim, "evicted table from cache");
        }
        Ok(table)
    }

    /// Point lookup in one table.
    pub fn get(
        &self,
        file_number: u64,
        file_size: u64,
        user_key: &[u8],
        snapshot: u64,
    ) -> Result<Option<LookupResult>> {
        self.find_table(file_number, file_size)?.get(user_key, snapshot)
    }

    /// Iterator over one table, positioned at its first entry.
    pub fn new_iterator(&self, file_number: u64, file_size: u64) -> Result<SSTableIterator> {
        Ok(self.find_table(file_number, file_size)?.iter())
    }

    /// Drop the cached handle for `file_number`, if any.
    pub fn evict(&self, file_number: u64) {
        if self.state.lock().remove(file_number) {
            debug!(file_number, "evicted table from cache");
        }
    }

    /// Number of open tables held.
    pub fn len(&self) -> usize {
        self.state.lock().tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, file_number: u64) -> bool {
        self.state.lock().tables.contains_key(&file_number)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TableVerifier for TableCache {
    /// Re-open the table from disk and cache the fresh handle. With
    /// `paranoid_file_checks`, also read and checksum every data block.
    fn verify_table(&self, file_number: u64, file_size: u64) -> Result<()> {
        // A cached handle may predate the file now on disk.
        TableCache::evict(self, file_number);
        let table = self.find_table(file_number, file_size)?;
        if self.options.paranoid_file_checks {
            let entries = table.verify_blocks()?;
            debug!(file_number, entries, "verified every data block");
        }
        Ok(())
    }

    fn evict(&self, file_number: u64) {
        TableCache::evict(self, file_number);
    }
}
