// Block reader + binary search tests
// Deserializing blocks and positioning within them.

use std::sync::Arc;

use lsm_table::comparator::{BytewiseComparator, Comparator};
use lsm_table::iterator::StorageIterator;
use lsm_table::sstable::block::builder::BlockBuilder;
use lsm_table::sstable::block::reader::{Block, BlockIterator};

// Helper: build a block from a slice of (key, value) pairs.
fn build_block(entries: &[(&[u8], &[u8])]) -> Arc<Block> {
    let mut builder = BlockBuilder::new(4096);
    for (k, v) in entries {
        assert!(builder.add(k, v), "entry should fit in test block");
    }
    Arc::new(Block::decode(builder.build()).expect("decode should succeed"))
}

fn bytewise() -> Arc<dyn Comparator> {
    Arc::new(BytewiseComparator)
}

fn iter(block: &Arc<Block>) -> BlockIterator {
    block.iter(bytewise())
}

// Exact-match lookup through the binary search.
fn get<'a>(block: &'a Block, key: &[u8]) -> Option<&'a [u8]> {
    let idx = block.lower_bound(key, &BytewiseComparator);
    (idx < block.len() && block.key_at(idx) == key).then(|| block.value_at(idx))
}

// =============================================================================
// Test 1: Build a block with BlockBuilder, decode with Block::decode → roundtrip
// =============================================================================
#[test]
fn roundtrip_build_and_decode() {
    let block = build_block(&[
        (b"apple", b"red"),
        (b"banana", b"yellow"),
        (b"cherry", b"dark_red"),
    ]);
    assert_eq!(block.len(), 3);
    let iter = iter(&block);
    assert!(iter.is_valid());
    assert_eq!(iter.key(), b"apple");
}

// =============================================================================
// Test 2: Lookup of existing key → correct value
// =============================================================================
#[test]
fn get_existing_key() {
    let block = build_block(&[
        (b"ant", b"tiny"),
        (b"bat", b"wings"),
        (b"cat", b"meow"),
        (b"dog", b"woof"),
        (b"elk", b"antlers"),
    ]);

    assert_eq!(get(&block, b"ant"), Some(b"tiny".as_slice()));
    assert_eq!(get(&block, b"cat"), Some(b"meow".as_slice()));
    assert_eq!(get(&block, b"elk"), Some(b"antlers".as_slice()));
    assert_eq!(get(&block, b"dog"), Some(b"woof".as_slice()));
}

// =============================================================================
// Test 3: Lookup of non-existing key → None
// =============================================================================
#[test]
fn get_nonexistent_key() {
    let block = build_block(&[(b"ant", b"tiny"), (b"cat", b"meow"), (b"elk", b"antlers")]);

    assert_eq!(get(&block, b"zzz"), None);
    assert_eq!(get(&block, b"aaa"), None);
    assert_eq!(get(&block, b"bat"), None, "bat is between ant and cat");
}

// =============================================================================
// Test 4: Iterator yields all entries in sorted order
// =============================================================================
#[test]
fn iterator_sorted_order() {
    let entries: Vec<(&[u8], &[u8])> = vec![
        (b"alpha", b"1"),
        (b"bravo", b"2"),
        (b"charlie", b"3"),
        (b"delta", b"4"),
        (b"echo", b"5"),
    ];
    let block = build_block(&entries);

    let mut iter = iter(&block);
    let mut collected = Vec::new();
    while iter.is_valid() {
        collected.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    assert!(iter.status().is_ok());

    assert_eq!(collected.len(), 5);
    for (i, (k, v)) in collected.iter().enumerate() {
        assert_eq!(k.as_slice(), entries[i].0);
        assert_eq!(v.as_slice(), entries[i].1);
    }
}

// =============================================================================
// Test 5: Seek to existing key → positions on it
// =============================================================================
#[test]
fn seek_to_existing_key() {
    let block = build_block(&[
        (b"ant", b"1"),
        (b"bat", b"2"),
        (b"cat", b"3"),
        (b"dog", b"4"),
        (b"elk", b"5"),
    ]);

    let mut iter = iter(&block);
    iter.seek(b"cat");
    assert!(iter.is_valid());
    assert_eq!(iter.key(), b"cat");
    assert_eq!(iter.value(), b"3");
}

// =============================================================================
// Test 6: Seek to non-existing key → positions at next greater key
// =============================================================================
#[test]
fn seek_to_nonexistent_key() {
    let block = build_block(&[(b"ant", b"1"), (b"cat", b"3"), (b"elk", b"5")]);

    let mut iter = iter(&block);
    iter.seek(b"bat");
    assert!(iter.is_valid());
    assert_eq!(iter.key(), b"cat");

    iter.seek(b"dog");
    assert!(iter.is_valid());
    assert_eq!(iter.key(), b"elk");
}

// =============================================================================
// Test 7: Seek past last key → invalid; seek before first → first
// =============================================================================
#[test]
fn seek_outside_key_range() {
    let block = build_block(&[(b"bat", b"2"), (b"cat", b"3"), (b"dog", b"4")]);

    let mut iter = iter(&block);
    iter.seek(b"zzz");
    assert!(!iter.is_valid(), "should be invalid when seeked past all keys");

    iter.seek(b"aaa");
    assert!(iter.is_valid());
    assert_eq!(iter.key(), b"bat");

    iter.seek_to_first();
    assert_eq!(iter.key(), b"bat");
}

// =============================================================================
// Test 8: Iterator exhaustion — next past end stays invalid
// =============================================================================
#[test]
fn iterator_exhaustion() {
    let block = build_block(&[(b"a", b"1"), (b"b", b"2")]);

    let mut iter = iter(&block);
    iter.next(); // at "b"
    iter.next(); // past end
    assert!(!iter.is_valid());
    assert!(iter.status().is_ok());
}

// =============================================================================
// Test 9: Seek honours the supplied comparator
// =============================================================================
#[test]
fn seek_uses_block_comparator() {
    struct Reverse;
    impl Comparator for Reverse {
        fn name(&self) -> &'static str {
            "test.Reverse"
        }
        fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
            b.cmp(a)
        }
    }

    let block = build_block(&[(b"c", b"3"), (b"b", b"2"), (b"a", b"1")]);
    let mut iter = block.iter(Arc::new(Reverse));
    iter.seek(b"b");
    assert_eq!(iter.value(), b"2");
}

// =============================================================================
// Test 10: Damaged blocks are rejected at decode time
// =============================================================================
#[test]
fn decode_rejects_corrupt_blocks() {
    assert!(Block::decode(vec![1, 2]).unwrap_err().is_corruption());

    // Claims 1000 entries but carries none.
    assert!(Block::decode(1000u32.to_le_bytes().to_vec()).is_err());

    let mut builder = BlockBuilder::new(4096);
    builder.add(b"key", b"value");
    let mut data = builder.build();
    // Inflate the key length past the end of the data region.
    data[0] = 0xFF;
    assert!(Block::decode(data).unwrap_err().is_corruption());
}
