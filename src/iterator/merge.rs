use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::Result;
use crate::iterator::StorageIterator;

/// Merges multiple sorted iterators into a single sorted stream.
///
/// Used as the input of a compaction: every table being merged contributes
/// one child, and the result feeds the table builder.
///
/// Ordering guarantee: entries are yielded in comparator order. Children are
/// ordered by priority: index 0 = newest source. Equal keys from several
/// children are all yielded, lower index first; deduplication of versions is
/// the builder's job.
///
/// The smallest child is found by a linear scan. Compactions merge a handful
/// of inputs, so a heap buys nothing.
pub struct MergingIterator<'a> {
    children: Vec<Box<dyn StorageIterator + 'a>>,
    comparator: Arc<dyn Comparator>,
    current: Option<usize>,
}

impl<'a> MergingIterator<'a> {
    /// Create a merging iterator. Children are positioned by `seek_to_first`
    /// or `seek`; until then the iterator is invalid.
    pub fn new(children: Vec<Box<dyn StorageIterator + 'a>>, comparator: Arc<dyn Comparator>) -> Self {
        MergingIterator {
            children,
            comparator,
            current: None,
        }
    }

    fn find_smallest(&mut self) {
        let mut smallest: Option<usize> = None;
        for (i, child) in self.children.iter().enumerate() {
            if !child.is_valid() {
                continue;
            }
            smallest = match smallest {
                Some(s)
                    if self.comparator.compare(child.key(), self.children[s].key())
                        != Ordering::Less =>
                {
                    Some(s)
                }
                _ => Some(i),
            };
        }
        self.current = smallest;
    }

    fn current_child(&self) -> &dyn StorageIterator {
        let idx = self.current.expect("merging iterator is not valid");
        self.children[idx].as_ref()
    }
}

impl StorageIterator for MergingIterator<'_> {
    fn key(&self) -> &[u8] {
        self.current_child().key()
    }

    fn value(&self) -> &[u8] {
        self.current_child().value()
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) {
        if let Some(idx) = self.current {
            self.children[idx].next();
            self.find_smallest();
        }
    }

    fn seek_to_first(&mut self) {
        for child in &mut self.children {
            child.seek_to_first();
        }
        self.find_smallest();
    }

    fn seek(&mut self, key: &[u8]) {
        for child in &mut self.children {
            child.seek(key);
        }
        self.find_smallest();
    }

    fn status(&self) -> Result<()> {
        for child in &self.children {
            child.status()?;
        }
        Ok(())
    }
}
