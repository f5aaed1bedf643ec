pub mod merge;

use crate::error::Result;

pub use merge::MergingIterator;

/// The central iteration abstraction for the storage engine.
///
/// Every sorted data source (skip list, block, SSTable, merged view)
/// implements this trait. This enables composability — MergingIterator
/// takes `Vec<Box<dyn StorageIterator>>` and merges them, and the table
/// builder consumes any of them as its input.
///
/// Movement never fails directly. A source that hits a read or decode error
/// becomes invalid and reports the error through `status()`, so running off
/// the end and stopping on a fault look the same until `status()` is asked.
/// Consumers must check it after the last entry.
pub trait StorageIterator {
    /// Returns the current key. Only valid when is_valid() is true.
    fn key(&self) -> &[u8];

    /// Returns the current value. Only valid when is_valid() is true.
    fn value(&self) -> &[u8];

    /// Returns true if the iterator is positioned at a valid entry.
    fn is_valid(&self) -> bool;

    /// Advances to the next entry. Requires is_valid().
    fn next(&mut self);

    /// Positions the iterator at the first entry.
    fn seek_to_first(&mut self);

    /// Positions the iterator at the first entry with key >= target.
    fn seek(&mut self, key: &[u8]);

    /// Deferred error status. `Ok` means every entry yielded so far was read
    /// cleanly and exhaustion (if reached) was a clean end of input.
    fn status(&self) -> Result<()>;
}

/// Drain `iter` from its first entry into owned (key, value) pairs.
///
/// Returns the deferred error if the source stopped on a fault.
pub fn collect_entries(iter: &mut dyn StorageIterator) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut entries = Vec::new();
    iter.seek_to_first();
    while iter.is_valid() {
        entries.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    iter.status()?;
    Ok(entries)
}
