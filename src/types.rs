use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Raw key bytes.
pub type Key = Vec<u8>;

/// Raw value bytes.
pub type Value = Vec<u8>;

/// Sequence numbers occupy the top 56 bits of the internal key trailer.
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 56) - 1;

/// Size of the (sequence, type) trailer appended to every user key.
pub const TRAILER_SIZE: usize = 8;

/// Distinguishes puts from deletes in the storage engine.
/// A Delete writes a tombstone — the key isn't removed, it's marked as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    /// A normal put operation.
    Put = 0x01,
    /// A delete (tombstone marker).
    Delete = 0x02,
}

impl ValueType {
    /// Type used when building seek targets. Trailers sort descending, so the
    /// largest type tag positions a seek before every entry of the same sequence.
    pub const FOR_SEEK: ValueType = ValueType::Delete;

    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(ValueType::Put),
            0x02 => Ok(ValueType::Delete),
            _ => Err(Error::Corruption(format!("invalid value type: {byte:#x}"))),
        }
    }
}

/// Packs a sequence number and a value type into a trailer word.
pub fn pack_trailer(sequence: u64, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    (sequence << 8) | value_type as u64
}

/// User-key portion of an encoded internal key.
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    &internal_key[..internal_key.len().saturating_sub(TRAILER_SIZE)]
}

/// Trailer word of an encoded internal key (0 if the key is too short).
pub fn trailer(internal_key: &[u8]) -> u64 {
    match internal_key.len().checked_sub(TRAILER_SIZE) {
        Some(start) => {
            let mut word = [0u8; TRAILER_SIZE];
            word.copy_from_slice(&internal_key[start..]);
            u64::from_le_bytes(word)
        }
        None => 0,
    }
}

/// Internal key format: user key + sequence number + value type.
///
/// Ordering: (user_key ASC, sequence DESC).
/// This ensures the newest version of a key always comes first during merging.
///
/// The sequence number is a monotonically increasing counter assigned to each
/// write operation. It provides a total ordering of all writes.
///
/// On disk: `user_key ++ u64_le((sequence << 8) | value_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    pub user_key: Key,
    pub sequence: u64,
    pub value_type: ValueType,
}

impl InternalKey {
    pub fn new(user_key: Key, sequence: u64, value_type: ValueType) -> Self {
        InternalKey {
            user_key,
            sequence,
            value_type,
        }
    }

    /// Encode into the on-disk byte form.
    pub fn encode(&self) -> Vec<u8> {
        encode_internal_key(&self.user_key, self.sequence, self.value_type)
    }

    /// Decode an owned key from its on-disk form.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let parsed = ParsedInternalKey::decode(data)?;
        Ok(parsed.to_owned())
    }
}

/// Ordering with a bytewise user comparator. Code that honors a custom user
/// comparator goes through `InternalKeyComparator` instead.
impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key.cmp(&other.user_key).then_with(|| {
            pack_trailer(other.sequence, other.value_type)
                .cmp(&pack_trailer(self.sequence, self.value_type))
        })
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Borrowed view of an encoded internal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: u64,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    /// Split an encoded key into its parts, rejecting truncated keys and
    /// unknown type tags.
    pub fn decode(data: &'a [u8]) -> Result<Self> {
        if data.len() < TRAILER_SIZE {
            return Err(Error::Corruption(format!(
                "internal key too short: {} bytes",
                data.len()
            )));
        }
        let word = trailer(data);
        Ok(ParsedInternalKey {
            user_key: extract_user_key(data),
            sequence: word >> 8,
            value_type: ValueType::from_u8((word & 0xff) as u8)?,
        })
    }

    pub fn to_owned(&self) -> InternalKey {
        InternalKey::new(self.user_key.to_vec(), self.sequence, self.value_type)
    }
}

/// Append-encode `user_key` with its trailer.
pub fn encode_internal_key(user_key: &[u8], sequence: u64, value_type: ValueType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(user_key.len() + TRAILER_SIZE);
    buf.extend_from_slice(user_key);
    buf.extend_from_slice(&pack_trailer(sequence, value_type).to_le_bytes());
    buf
}

/// Seek target that lands on the newest version of `user_key` visible at
/// `snapshot`.
pub fn lookup_key(user_key: &[u8], snapshot: u64) -> Vec<u8> {
    encode_internal_key(user_key, snapshot.min(MAX_SEQUENCE_NUMBER), ValueType::FOR_SEEK)
}

/// Outcome of a point lookup that found a version of the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    /// The newest visible version is a put.
    Value(Value),
    /// The newest visible version is a tombstone.
    Deleted,
}
