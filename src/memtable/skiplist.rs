use std::cmp::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::comparator::Comparator;
use crate::error::Result;
use crate::iterator::StorageIterator;

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Each extra level is kept with probability 1/BRANCHING.
const BRANCHING: u32 = 4;

/// Index of the head sentinel in the arena.
const HEAD: usize = 0;

/// Bookkeeping charged per node on top of key and value bytes.
const NODE_OVERHEAD: usize = std::mem::size_of::<SkipNode>();

/// A single node in the skip list.
///
/// Each node has `height` forward pointers. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
///
/// Pointers are indices into the list's node arena: no unsafe, good cache
/// locality, and nodes are never removed.
struct SkipNode {
    key: Vec<u8>,
    value: Vec<u8>,
    forward: Vec<Option<usize>>,
}

/// A probabilistic sorted map ordered by an injected comparator.
///
/// Average case: O(log n) insert, O(log n) lookup, O(n) iteration.
/// Heights come from a fixed-seed generator so runs are reproducible.
pub struct SkipList {
    nodes: Vec<SkipNode>,
    height: usize,
    len: usize,
    size_bytes: usize,
    comparator: Arc<dyn Comparator>,
    rng: StdRng,
}

impl SkipList {
    /// Create a new empty skip list.
    pub fn new(comparator: Arc<dyn Comparator>) -> Self {
        let head = SkipNode {
            key: Vec::new(),
            value: Vec::new(),
            forward: vec![None; MAX_HEIGHT],
        };
        SkipList {
            nodes: vec![head],
            height: 1,
            len: 0,
            size_bytes: 0,
            comparator,
            rng: StdRng::seed_from_u64(0xdead_beef),
        }
    }

    /// Insert a key-value pair. Overwrites if key already exists.
    ///
    /// Algorithm:
    ///   1. Find the insertion point at each level (track predecessors)
    ///   2. Generate a random height for the new node (coin flip per level)
    ///   3. Splice into the list at each level up to the node's height
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let mut prev = [HEAD; MAX_HEIGHT];
        if let Some(found) = self.find_greater_or_equal(&key, Some(&mut prev)) {
            if self.comparator.compare(&self.nodes[found].key, &key) == Ordering::Equal {
                // The replaced value stays charged, so size never shrinks.
                self.size_bytes += value.len();
                self.nodes[found].value = value;
                return;
            }
        }

        let height = self.random_height();
        // Levels above the old height have HEAD as predecessor, which `prev`
        // already holds.
        self.height = self.height.max(height);

        let idx = self.nodes.len();
        let forward = (0..height)
            .map(|level| self.nodes[prev[level]].forward[level])
            .collect();
        self.size_bytes += key.len() + value.len() + NODE_OVERHEAD;
        self.nodes.push(SkipNode {
            key,
            value,
            forward,
        });
        for (level, &p) in prev.iter().enumerate().take(height) {
            self.nodes[p].forward[level] = Some(idx);
        }
        self.len += 1;
    }

    /// Look up a key. Returns the value if found.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let idx = self.find_greater_or_equal(key, None)?;
        let node = &self.nodes[idx];
        (self.comparator.compare(&node.key, key) == Ordering::Equal).then_some(node.value.as_slice())
    }

    /// Number of entries in the skip list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate memory usage in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Create an iterator positioned at the first entry.
    pub fn iter(&self) -> SkipListIterator<'_> {
        SkipListIterator {
            list: self,
            node: self.nodes[HEAD].forward[0],
        }
    }

    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_ratio(1, BRANCHING) {
            height += 1;
        }
        height
    }

    /// First node whose key is >= `key`. When `prev` is given, records the
    /// last node before that position on every level.
    ///
    ///   1. Start at head, highest level
    ///   2. Move forward while next key < target
    ///   3. Drop down one level, repeat until level 0
    fn find_greater_or_equal(
        &self,
        key: &[u8],
        mut prev: Option<&mut [usize; MAX_HEIGHT]>,
    ) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            let next = self.nodes[x].forward[level];
            match next {
                Some(n) if self.comparator.compare(&self.nodes[n].key, key) == Ordering::Less => {
                    x = n;
                }
                _ => {
                    if let Some(p) = prev.as_mut() {
                        p[level] = x;
                    }
                    if level == 0 {
                        return next;
                    }
                    level -= 1;
                }
            }
        }
    }
}

/// Forward iterator over a skip list (level 0 holds every entry).
pub struct SkipListIterator<'a> {
    list: &'a SkipList,
    node: Option<usize>,
}

impl<'a> SkipListIterator<'a> {
    fn current(&self) -> &'a SkipNode {
        let idx = self.node.expect("skip list iterator is not valid");
        &self.list.nodes[idx]
    }
}

impl StorageIterator for SkipListIterator<'_> {
    fn key(&self) -> &[u8] {
        &self.current().key
    }

    fn value(&self) -> &[u8] {
        &self.current().value
    }

    fn is_valid(&self) -> bool {
        self.node.is_some()
    }

    fn next(&mut self) {
        if let Some(idx) = self.node {
            self.node = self.list.nodes[idx].forward[0];
        }
    }

    fn seek_to_first(&mut self) {
        self.node = self.list.nodes[HEAD].forward[0];
    }

    fn seek(&mut self, key: &[u8]) {
        self.node = self.list.find_greater_or_equal(key, None);
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
