use std::cmp::Ordering;

use crate::bloom::builder::BloomFilterBuilder;
use crate::comparator::{Comparator, InternalKeyComparator};
use crate::env::WritableFile;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::sstable::block::{block_checksum, BlockBuilder};
use crate::sstable::footer::{Footer, IndexEntry, SSTABLE_MAGIC};
use crate::table::{TableWriter, TableWriterFactory};
use crate::types::extract_user_key;

/// Builds an SSTable file from a sorted stream of internal key/value pairs.
///
/// Used during:
/// - Memtable flush (sorted memtable → SSTable)
/// - Compaction (merged iterators → new SSTables)
///
/// Build process:
/// 1. Add entries one by one (must be strictly increasing internal keys)
/// 2. Entries fill up blocks; when a block is full it's handed to the file
/// 3. finish() flushes the last block, writes filter, index and footer
///
/// The builder only writes. Syncing and closing the file belong to whoever
/// owns the handle, so durability is decided in one place.
///
/// File layout:
/// ```text
/// [data block][crc] ... [data block][crc] [filter][crc] [index][crc] [footer]
/// ```
pub struct SSTableBuilder<'a> {
    file: &'a mut dyn WritableFile,
    comparator: InternalKeyComparator,
    /// Current block being filled with entries.
    block_builder: BlockBuilder,
    /// Index entries: one per flushed data block.
    index_entries: Vec<IndexEntry>,
    /// Bloom filter over user keys, if enabled.
    filter: Option<BloomFilterBuilder>,
    /// Tracks current write position in the file.
    offset: u64,
    /// Target block size.
    block_size: usize,
    /// Last key added; also the last key of the block being filled.
    last_key: Vec<u8>,
    /// Total entries added.
    entry_count: u64,
    /// First write failure; every later call reports it.
    failure: Option<Error>,
    /// Set once finish() or abandon() ran.
    closed: bool,
}

impl<'a> SSTableBuilder<'a> {
    /// Create a builder writing into `file`, which must be empty.
    pub fn new(options: &Options, file: &'a mut dyn WritableFile) -> Self {
        SSTableBuilder {
            file,
            comparator: InternalKeyComparator::new(options.comparator.clone()),
            block_builder: BlockBuilder::new(options.block_size),
            index_entries: Vec::new(),
            filter: options.bloom_false_positive_rate.map(BloomFilterBuilder::new),
            offset: 0,
            block_size: options.block_size,
            last_key: Vec::new(),
            entry_count: 0,
            failure: None,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        if self.closed {
            return Err(Error::Closed("table builder"));
        }
        Ok(())
    }

    /// Write a block followed by its CRC trailer. Returns (offset, size).
    fn write_raw_block(&mut self, block: &[u8]) -> Result<(u64, u64)> {
        let offset = self.offset;
        let written = self
            .file
            .append(block)
            .and_then(|()| self.file.append(&block_checksum(block)));
        if let Err(e) = written {
            self.failure = Some(e.clone());
            return Err(e);
        }
        self.offset += (block.len() + 4) as u64;
        Ok((offset, block.len() as u64))
    }

    /// Flush the current block to the file and record an index entry.
    fn flush_block(&mut self) -> Result<()> {
        if self.block_builder.is_empty() {
            return Ok(());
        }

        // Take the current block builder, replace with a fresh one
        let old_builder = std::mem::replace(
            &mut self.block_builder,
            BlockBuilder::new(self.block_size),
        );
        let block_data = old_builder.build();
        let (offset, size) = self.write_raw_block(&block_data)?;

        self.index_entries.push(IndexEntry {
            last_key: self.last_key.clone(),
            offset,
            size,
        });
        Ok(())
    }

    /// Last data block, filter block, index block, footer.
    fn write_tail(&mut self) -> Result<u64> {
        self.flush_block()?;

        let (meta_block_offset, meta_block_size) = match self.filter.take().and_then(|f| f.build()) {
            Some(filter) => self.write_raw_block(&filter.serialize())?,
            None => (self.offset, 0),
        };

        let mut index_data = Vec::new();
        for entry in &self.index_entries {
            index_data.extend_from_slice(&entry.encode());
        }
        let (index_block_offset, index_block_size) = self.write_raw_block(&index_data)?;

        let footer = Footer {
            index_block_offset,
            index_block_size,
            meta_block_offset,
            meta_block_size,
            magic: SSTABLE_MAGIC,
        };
        if let Err(e) = self.file.append(&footer.encode()) {
            self.failure = Some(e.clone());
            return Err(e);
        }
        self.offset += Footer::SIZE as u64;
        Ok(self.offset)
    }
}

impl TableWriter for SSTableBuilder<'_> {
    /// Add a key-value pair. Keys MUST be strictly increasing.
    ///
    /// Internally:
    /// 1. Try adding to the current block
    /// 2. If block is full: flush block to file, record index entry, start new block
    /// 3. Add the entry to the new block
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        if self.entry_count > 0 && self.comparator.compare(key, &self.last_key) != Ordering::Greater {
            return Err(Error::KeysNotSorted {
                previous: self.last_key.clone(),
                current: key.to_vec(),
            });
        }

        if let Some(filter) = self.filter.as_mut() {
            filter.add_key(extract_user_key(key));
        }

        if !self.block_builder.add(key, value) {
            self.flush_block()?;
            // A fresh block always accepts its first entry.
            let added = self.block_builder.add(key, value);
            debug_assert!(added);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.entry_count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<u64> {
        self.check_open()?;
        let result = self.write_tail();
        self.closed = true;
        result
    }

    fn abandon(&mut self) {
        self.closed = true;
        self.block_builder = BlockBuilder::new(0);
        self.index_entries = Vec::new();
        self.filter = None;
    }

    fn num_entries(&self) -> u64 {
        self.entry_count
    }

    fn file_size(&self) -> u64 {
        self.offset
    }
}

/// Produces `SSTableBuilder`s; the default table format of the build driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SSTableWriterFactory;

impl TableWriterFactory for SSTableWriterFactory {
    fn new_writer<'a>(
        &self,
        options: &Options,
        file: &'a mut dyn WritableFile,
    ) -> Box<dyn TableWriter + 'a> {
        Box::new(SSTableBuilder::new(options, file))
    }
}
