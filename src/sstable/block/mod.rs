pub mod builder;
pub mod reader;

pub use builder::BlockBuilder;
pub use reader::{Block, BlockIterator};

/// Size of the CRC32 trailer written after every block on disk.
pub const BLOCK_TRAILER_SIZE: usize = 4;

/// CRC32 trailer for `block`.
pub fn block_checksum(block: &[u8]) -> [u8; BLOCK_TRAILER_SIZE] {
    crc32fast::hash(block).to_le_bytes()
}
