use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::sstable::block::builder::ENTRY_HEADER_SIZE;

/// A decoded data or index block. See `BlockBuilder` for the layout.
///
/// Decoding validates every entry's bounds up front, so accessors can slice
/// without further checks.
#[derive(Debug)]
pub struct Block {
    data: Vec<u8>,
    offsets: Vec<u32>,
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(data[at..at + 4].try_into().unwrap())
}

impl Block {
    /// Parse a block (without its CRC trailer).
    pub fn decode(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Corruption("block too short for entry count".into()));
        }
        let num_entries = read_u32(&data, data.len() - 4) as usize;
        let offsets_start = num_entries
            .checked_mul(4)
            .and_then(|n| (data.len() - 4).checked_sub(n))
            .ok_or_else(|| Error::Corruption("block offset array out of bounds".into()))?;

        let mut offsets = Vec::with_capacity(num_entries);
        let mut expected = 0usize;
        for i in 0..num_entries {
            let offset = read_u32(&data, offsets_start + i * 4);
            let at = offset as usize;
            if at != expected || at + ENTRY_HEADER_SIZE > offsets_start {
                return Err(Error::Corruption(format!("bad offset for block entry {i}")));
            }
            let key_len = read_u32(&data, at) as usize;
            let val_len = read_u32(&data, at + 4) as usize;
            let end = at + ENTRY_HEADER_SIZE + key_len + val_len;
            if end > offsets_start {
                return Err(Error::Corruption(format!("block entry {i} overruns block")));
            }
            offsets.push(offset);
            expected = end;
        }
        if expected != offsets_start {
            return Err(Error::Corruption("trailing bytes in block".into()));
        }

        Ok(Block { data, offsets })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Key of entry `i`.
    pub fn key_at(&self, i: usize) -> &[u8] {
        let at = self.offsets[i] as usize;
        let key_len = read_u32(&self.data, at) as usize;
        &self.data[at + ENTRY_HEADER_SIZE..at + ENTRY_HEADER_SIZE + key_len]
    }

    /// Value of entry `i`.
    pub fn value_at(&self, i: usize) -> &[u8] {
        let at = self.offsets[i] as usize;
        let key_len = read_u32(&self.data, at) as usize;
        let val_len = read_u32(&self.data, at + 4) as usize;
        let start = at + ENTRY_HEADER_SIZE + key_len;
        &self.data[start..start + val_len]
    }

    /// Index of the first entry with key >= `target` (binary search).
    pub fn lower_bound(&self, target: &[u8], comparator: &dyn Comparator) -> usize {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if comparator.compare(self.key_at(mid), target) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Iterator over this block, positioned at the first entry.
    pub fn iter(self: &Arc<Self>, comparator: Arc<dyn Comparator>) -> BlockIterator {
        BlockIterator {
            block: Arc::clone(self),
            comparator,
            idx: 0,
        }
    }
}

/// Cursor over the entries of one block.
pub struct BlockIterator {
    block: Arc<Block>,
    comparator: Arc<dyn Comparator>,
    idx: usize,
}

impl StorageIterator for BlockIterator {
    fn key(&self) -> &[u8] {
        self.block.key_at(self.idx)
    }

    fn value(&self) -> &[u8] {
        self.block.value_at(self.idx)
    }

    fn is_valid(&self) -> bool {
        self.idx < self.block.len()
    }

    fn next(&mut self) {
        self.idx += 1;
    }

    fn seek_to_first(&mut self) {
        self.idx = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.idx = self.block.lower_bound(key, self.comparator.as_ref());
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
