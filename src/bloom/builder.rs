use xxhash_rust::xxh3::xxh3_128;

use crate::bloom::BloomFilter;

/// Collects key hashes while an SSTable is being written, then sizes the
/// filter for the exact count at the end.
///
/// Usage during SSTable build:
/// 1. Create BloomFilterBuilder with the target false positive rate
/// 2. Call add_key() for every user key written to the SSTable
/// 3. Call build() to get the final BloomFilter for serialization
pub struct BloomFilterBuilder {
    hashes: Vec<u128>,
    false_positive_rate: f64,
}

impl BloomFilterBuilder {
    pub fn new(false_positive_rate: f64) -> Self {
        BloomFilterBuilder {
            hashes: Vec::new(),
            false_positive_rate,
        }
    }

    /// Add a key to the bloom filter being built. Consecutive duplicates
    /// (several versions of one user key) are stored once.
    pub fn add_key(&mut self, key: &[u8]) {
        let hash = xxh3_128(key);
        if self.hashes.last() != Some(&hash) {
            self.hashes.push(hash);
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Finalize and return the bloom filter. None if no key was added.
    pub fn build(self) -> Option<BloomFilter> {
        if self.hashes.is_empty() {
            return None;
        }
        let mut filter = BloomFilter::new(self.hashes.len(), self.false_positive_rate);
        for hash in self.hashes {
            filter.insert_hash(hash);
        }
        Some(filter)
    }
}
