use crate::error::{Error, Result};
use crate::types::InternalKey;

/// Magic number to identify SSTable files.
pub const SSTABLE_MAGIC: u64 = 0x4C534D5F53535400; // "LSM_SST\0"

/// Descriptor of a table file, folded into the engine's catalog by the
/// caller once a build commits.
///
/// Starts in its zero state (`SSTableMeta::new`). The table builder fills
/// it in only when a table is committed; after a failed or empty build it
/// is still in the zero state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SSTableMeta {
    /// Unique SSTable identifier (the file number).
    pub id: u64,
    /// File size in bytes. 0 means "no table".
    pub file_size: u64,
    /// Smallest internal key in the SSTable.
    pub smallest: Option<InternalKey>,
    /// Largest internal key in the SSTable.
    pub largest: Option<InternalKey>,
    /// Number of entries written (including tombstones).
    pub entry_count: u64,
}

impl SSTableMeta {
    pub fn new(id: u64) -> Self {
        SSTableMeta {
            id,
            ..Default::default()
        }
    }

    /// Return to the zero state, keeping the identifier.
    pub fn reset(&mut self) {
        *self = SSTableMeta::new(self.id);
    }

    /// Whether this describes a committed, non-empty table.
    pub fn has_table(&self) -> bool {
        self.file_size > 0
    }
}

/// An entry in the SSTable's index block.
/// Maps a block's last key to its location in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Last (largest) internal key in the block.
    pub last_key: Vec<u8>,
    /// Byte offset of the block in the file.
    pub offset: u64,
    /// Size of the block in bytes, excluding its CRC trailer.
    pub size: u64,
}

impl IndexEntry {
    /// Encode this index entry to bytes.
    /// Format: [key_len(4B)][key][offset(8B)][size(8B)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.last_key.len() + 16);
        buf.extend_from_slice(&(self.last_key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.last_key);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Decode an index entry from bytes, returning (entry, bytes_consumed).
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(Error::Corruption("index entry too short".into()));
        }
        let key_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let total = 4 + key_len + 16;
        if data.len() < total {
            return Err(Error::Corruption("index entry truncated".into()));
        }
        let last_key = data[4..4 + key_len].to_vec();
        let offset = u64::from_le_bytes(data[4 + key_len..12 + key_len].try_into().unwrap());
        let size = u64::from_le_bytes(data[12 + key_len..20 + key_len].try_into().unwrap());
        Ok((IndexEntry { last_key, offset, size }, total))
    }
}

/// The footer sits at the end of the SSTable file.
/// It tells the reader where to find the index block and meta (filter) block.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Index block offset (8B)              │
/// │ Index block size (8B)                │
/// │ Meta block offset (8B)               │
/// │ Meta block size (8B)                 │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
///
/// Block sizes exclude the CRC trailer that follows each block.
/// A meta block size of 0 means the table has no filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub index_block_offset: u64,
    pub index_block_size: u64,
    pub meta_block_offset: u64,
    pub meta_block_size: u64,
    pub magic: u64,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 8 * 5; // 40 bytes

    /// Encode footer to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.index_block_offset.to_le_bytes());
        buf.extend_from_slice(&self.index_block_size.to_le_bytes());
        buf.extend_from_slice(&self.meta_block_offset.to_le_bytes());
        buf.extend_from_slice(&self.meta_block_size.to_le_bytes());
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf
    }

    /// Decode footer from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corruption("footer too short".into()));
        }
        let index_block_offset = u64::from_le_bytes(data[0..8].try_into().unwrap());
        let index_block_size = u64::from_le_bytes(data[8..16].try_into().unwrap());
        let meta_block_offset = u64::from_le_bytes(data[16..24].try_into().unwrap());
        let meta_block_size = u64::from_le_bytes(data[24..32].try_into().unwrap());
        let magic = u64::from_le_bytes(data[32..40].try_into().unwrap());

        if magic != SSTABLE_MAGIC {
            return Err(Error::Corruption(format!(
                "bad magic: expected {:#x}, got {:#x}",
                SSTABLE_MAGIC, magic
            )));
        }

        Ok(Footer {
            index_block_offset,
            index_block_size,
            meta_block_offset,
            meta_block_size,
            magic,
        })
    }
}
