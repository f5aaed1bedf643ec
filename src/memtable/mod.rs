pub mod skiplist;

use std::cmp::Ordering;
use std::sync::Arc;

use skiplist::{SkipList, SkipListIterator};

use crate::comparator::{BytewiseComparator, Comparator, InternalKeyComparator};
use crate::iterator::StorageIterator;
use crate::types::{encode_internal_key, lookup_key, LookupResult, ParsedInternalKey, ValueType};

/// In-memory sorted buffer for writes. Wraps a SkipList keyed by encoded
/// internal keys.
///
/// Every write goes here first with the sequence number the engine assigned
/// to it. When size exceeds the threshold, the memtable is frozen and
/// flushed to an SSTable through `build::flush_memtable`.
///
/// Deletes are tombstones: a Delete-typed entry. You can't just remove the
/// key because older versions may exist in SSTables on disk.
pub struct MemTable {
    data: SkipList,
    user_comparator: Arc<dyn Comparator>,
    size_limit: usize,
    earliest_sequence: Option<u64>,
}

impl MemTable {
    /// Create a new empty memtable with bytewise key order and the given
    /// size limit.
    pub fn new(size_limit: usize) -> Self {
        Self::with_comparator(Arc::new(BytewiseComparator), size_limit)
    }

    /// Create a memtable ordering user keys with `comparator`.
    pub fn with_comparator(comparator: Arc<dyn Comparator>, size_limit: usize) -> Self {
        let internal = InternalKeyComparator::new(Arc::clone(&comparator));
        MemTable {
            data: SkipList::new(Arc::new(internal)),
            user_comparator: comparator,
            size_limit,
            earliest_sequence: None,
        }
    }

    /// Record a versioned write.
    pub fn add(&mut self, sequence: u64, value_type: ValueType, key: &[u8], value: &[u8]) {
        let internal_key = encode_internal_key(key, sequence, value_type);
        self.data.insert(internal_key, value.to_vec());
        self.earliest_sequence = Some(match self.earliest_sequence {
            Some(seq) => seq.min(sequence),
            None => sequence,
        });
    }

    /// Insert a new version of `key`.
    pub fn put(&mut self, sequence: u64, key: &[u8], value: &[u8]) {
        self.add(sequence, ValueType::Put, key, value);
    }

    /// Mark a key as deleted by writing a tombstone.
    pub fn delete(&mut self, sequence: u64, key: &[u8]) {
        self.add(sequence, ValueType::Delete, key, &[]);
    }

    /// Newest version of `key` with sequence <= `snapshot`.
    /// Returns None if the memtable holds no such version.
    pub fn get(&self, key: &[u8], snapshot: u64) -> Option<LookupResult> {
        let mut iter = self.data.iter();
        iter.seek(&lookup_key(key, snapshot));
        if !iter.is_valid() {
            return None;
        }
        // Keys in the list were encoded by `add`, so they always parse.
        let parsed = ParsedInternalKey::decode(iter.key()).ok()?;
        if self.user_comparator.compare(parsed.user_key, key) != Ordering::Equal {
            return None;
        }
        Some(match parsed.value_type {
            ValueType::Put => LookupResult::Value(iter.value().to_vec()),
            ValueType::Delete => LookupResult::Deleted,
        })
    }

    /// Sorted iterator over all entries (including tombstones and every
    /// version), positioned at the first entry.
    pub fn iter(&self) -> SkipListIterator<'_> {
        self.data.iter()
    }

    /// Smallest sequence number written to this memtable.
    pub fn earliest_sequence(&self) -> Option<u64> {
        self.earliest_sequence
    }

    /// Current memory usage in bytes.
    pub fn size(&self) -> usize {
        self.data.size_bytes()
    }

    /// Check if memtable has reached the flush threshold.
    pub fn is_full(&self) -> bool {
        self.data.size_bytes() >= self.size_limit
    }

    /// Number of entries (every version counts).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The user-key ordering of this memtable.
    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.user_comparator
    }
}
