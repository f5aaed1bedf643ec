use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bloom::BloomFilter;
use crate::comparator::{Comparator, InternalKeyComparator};
use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::sstable::block::{block_checksum, Block, BLOCK_TRAILER_SIZE};
use crate::sstable::footer::{Footer, IndexEntry};
use crate::sstable::iterator::SSTableIterator;
use crate::types::{lookup_key, LookupResult, ParsedInternalKey, ValueType};

/// An opened SSTable file. Supports point lookups and full scans.
///
/// On open:
/// 1. Check the file length against the size recorded for it
/// 2. Read footer (last 40 bytes) → find index and meta block positions
/// 3. Read, checksum and parse the index block → Vec<IndexEntry>
/// 4. Read, checksum and deserialize the bloom filter (if any)
/// 5. Ready for queries (data blocks read and checksummed on demand)
///
/// Any inconsistency is reported as `Error::Corruption`; this is what the
/// table builder relies on to reject a freshly written but damaged file.
#[derive(Debug)]
pub struct SSTable {
    /// Path to the SSTable file (for debugging/error messages).
    path: PathBuf,
    /// Open file handle for reading data blocks.
    file: Mutex<File>,
    file_size: u64,
    /// Index entries parsed from the index block.
    index: Vec<IndexEntry>,
    filter: Option<BloomFilter>,
    comparator: Arc<InternalKeyComparator>,
}

impl SSTable {
    /// Open the table at `path`, which must be exactly `file_size` bytes.
    pub fn open(path: &Path, file_size: u64, user_comparator: Arc<dyn Comparator>) -> Result<Self> {
        let mut file = File::open(path)?;

        let actual_size = file.metadata()?.len();
        if actual_size != file_size {
            return Err(Error::Corruption(format!(
                "{}: file size mismatch: expected {file_size}, found {actual_size}",
                path.display()
            )));
        }
        if file_size < Footer::SIZE as u64 {
            return Err(Error::Corruption(format!(
                "{}: file too short to contain footer",
                path.display()
            )));
        }

        let footer_offset = file_size - Footer::SIZE as u64;
        file.seek(SeekFrom::Start(footer_offset))?;
        let mut footer_buf = vec![0u8; Footer::SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;

        check_handle(footer.index_block_offset, footer.index_block_size, footer_offset, "index")?;
        let index_buf = read_checked(
            &mut file,
            footer.index_block_offset,
            footer.index_block_size,
        )?;
        let mut index = Vec::new();
        let mut offset = 0usize;
        while offset < index_buf.len() {
            let (entry, consumed) = IndexEntry::decode(&index_buf[offset..])?;
            check_handle(entry.offset, entry.size, footer.meta_block_offset, "data")?;
            index.push(entry);
            offset += consumed;
        }

        let filter = if footer.meta_block_size > 0 {
            check_handle(
                footer.meta_block_offset,
                footer.meta_block_size,
                footer.index_block_offset,
                "filter",
            )?;
            let meta_buf = read_checked(&mut file, footer.meta_block_offset, footer.meta_block_size)?;
            Some(BloomFilter::deserialize(&meta_buf)?)
        } else {
            None
        };

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            file_size,
            index,
            filter,
            comparator: Arc::new(InternalKeyComparator::new(user_comparator)),
        })
    }

    /// Point lookup: newest version of `user_key` with sequence <= `snapshot`.
    ///
    /// Algorithm:
    /// 1. Bloom filter says "definitely not here" → None
    /// 2. Binary search the index for the first block whose last key >= target
    /// 3. Read that block from disk
    /// 4. Binary search within the block
    pub fn get(&self, user_key: &[u8], snapshot: u64) -> Result<Option<LookupResult>> {
        if !self.may_contain(user_key) {
            return Ok(None);
        }

        let target = lookup_key(user_key, snapshot);
        let block_idx = self
            .index
            .partition_point(|e| self.comparator.compare(&e.last_key, &target) == Ordering::Less);
        if block_idx >= self.index.len() {
            return Ok(None);
        }

        let block = self.read_block(block_idx)?;
        let mut iter = block.iter(self.comparator.clone());
        iter.seek(&target);
        if !iter.is_valid() {
            return Ok(None);
        }
        let parsed = ParsedInternalKey::decode(iter.key())?;
        if self
            .comparator
            .user_comparator()
            .compare(parsed.user_key, user_key)
            != Ordering::Equal
        {
            return Ok(None);
        }
        Ok(Some(match parsed.value_type {
            ValueType::Put => LookupResult::Value(iter.value().to_vec()),
            ValueType::Delete => LookupResult::Deleted,
        }))
    }

    /// Whether the filter admits `user_key` (always true without a filter).
    pub fn may_contain(&self, user_key: &[u8]) -> bool {
        self.filter.as_ref().is_none_or(|f| f.may_contain(user_key))
    }

    /// Create an iterator over all entries, positioned at the first one.
    pub fn iter(self: &Arc<Self>) -> SSTableIterator {
        SSTableIterator::new(Arc::clone(self))
    }

    /// Read and checksum every data block. Returns the number of entries.
    pub fn verify_blocks(&self) -> Result<u64> {
        let mut entries = 0u64;
        for idx in 0..self.index.len() {
            entries += self.read_block(idx)?.len() as u64;
        }
        Ok(entries)
    }

    /// Read, checksum and decode data block `idx`.
    pub(crate) fn read_block(&self, idx: usize) -> Result<Arc<Block>> {
        let entry = &self.index[idx];
        let data = {
            let mut file = self.file.lock();
            read_checked(&mut file, entry.offset, entry.size)?
        };
        Block::decode(data).map(Arc::new).map_err(|e| match e {
            Error::Corruption(msg) => Error::Corruption(format!(
                "{}: block at offset {}: {msg}",
                self.path.display(),
                entry.offset
            )),
            other => other,
        })
    }

    pub(crate) fn index(&self) -> &[IndexEntry] {
        &self.index
    }

    pub(crate) fn comparator(&self) -> Arc<dyn Comparator> {
        self.comparator.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of data blocks.
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }
}

/// A block of `size` bytes plus its trailer must end at or before `limit`.
fn check_handle(offset: u64, size: u64, limit: u64, what: &str) -> Result<()> {
    let end = offset
        .checked_add(size)
        .and_then(|end| end.checked_add(BLOCK_TRAILER_SIZE as u64));
    match end {
        Some(end) if end <= limit => Ok(()),
        _ => Err(Error::Corruption(format!(
            "{what} block handle out of range: offset {offset}, size {size}"
        ))),
    }
}

/// Read `size` bytes at `offset` and verify the CRC trailer that follows.
fn read_checked(file: &mut File, offset: u64, size: u64) -> Result<Vec<u8>> {
    let size = size as usize;
    let mut buf = vec![0u8; size + BLOCK_TRAILER_SIZE];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    let stored = buf.split_off(size);
    if stored != block_checksum(&buf) {
        return Err(Error::Corruption(format!(
            "block checksum mismatch at offset {offset}"
        )));
    }
    Ok(buf)
}
