//! Core key types shared across the WAL and SSTable layers.

use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;

use crate::util::coding::{encode_fixed64, read_fixed64};

/// Maximum sequence number (56 bits).
pub const MAX_SEQUENCE: u64 = (1 << 56) - 1;

/// Value type indicator in internal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    /// Deletion marker (tombstone).
    Deletion = 0,
    /// Normal value.
    Value = 1,
}

impl ValueType {
    /// Create from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Check if this is a deletion marker.
    pub fn is_deletion(&self) -> bool {
        matches!(self, ValueType::Deletion)
    }
}

/// Internal key format used for storage.
///
/// An internal key combines the user key with a sequence number (version)
/// and a value type. Encoded format:
///
/// ```text
/// [user_key][packed (8 bytes, little-endian)]
/// ```
///
/// where `packed = (sequence << 8) | value_type`. Ordering is user key
/// ascending, then sequence descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalKey {
    /// The user-provided key.
    user_key: Bytes,
    /// Sequence number (version).
    sequence: u64,
    /// Value type.
    value_type: ValueType,
}

impl InternalKey {
    /// Create a new internal key.
    pub fn new(user_key: impl Into<Bytes>, sequence: u64, value_type: ValueType) -> Self {
        debug_assert!(sequence <= MAX_SEQUENCE);
        Self {
            user_key: user_key.into(),
            sequence,
            value_type,
        }
    }

    /// Create an internal key for a put operation.
    pub fn for_value(user_key: impl Into<Bytes>, sequence: u64) -> Self {
        Self::new(user_key, sequence, ValueType::Value)
    }

    /// Create an internal key for a delete operation.
    pub fn for_deletion(user_key: impl Into<Bytes>, sequence: u64) -> Self {
        Self::new(user_key, sequence, ValueType::Deletion)
    }

    /// Get the user key.
    pub fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    /// Get the sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Get the value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Encode the internal key to bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.user_key.len() + 8);
        self.encode_to(&mut buf);
        buf.freeze()
    }

    /// Encode into an existing buffer.
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.user_key);
        let packed = (self.sequence << 8) | (self.value_type.to_byte() as u64);
        encode_fixed64(buf, packed);
    }

    /// Decode an internal key from bytes.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < 8 {
            return None;
        }

        let user_key_len = data.len() - 8;
        let user_key = Bytes::copy_from_slice(&data[..user_key_len]);
        let packed = read_fixed64(&data[user_key_len..])?;

        let value_type = ValueType::from_byte((packed & 0xFF) as u8)?;
        let sequence = packed >> 8;

        Some(Self {
            user_key,
            sequence,
            value_type,
        })
    }

    /// Get the encoded length.
    pub fn encoded_len(&self) -> usize {
        self.user_key.len() + 8
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.user_key.cmp(&other.user_key) {
            // Same user key: newer sequence sorts first so reads see the
            // latest version before older ones.
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ord => ord,
        }
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_roundtrip() {
        for vt in [ValueType::Deletion, ValueType::Value] {
            assert_eq!(ValueType::from_byte(vt.to_byte()), Some(vt));
        }
        assert_eq!(ValueType::from_byte(7), None);
    }

    #[test]
    fn test_internal_key_encode_decode() {
        let key = InternalKey::for_value(Bytes::from_static(b"hello"), 42);
        let encoded = key.encode();
        assert_eq!(encoded.len(), 5 + 8);

        let decoded = InternalKey::decode(&encoded).unwrap();
        assert_eq!(decoded.user_key(), b"hello");
        assert_eq!(decoded.sequence(), 42);
        assert_eq!(decoded.value_type(), ValueType::Value);
    }

    #[test]
    fn test_internal_key_tail_is_little_endian() {
        let key = InternalKey::for_value(Bytes::from_static(b"k"), 1);
        let encoded = key.encode();
        // packed = (1 << 8) | 1 = 0x101, little-endian
        assert_eq!(&encoded[1..], &[0x01, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_internal_key_ordering() {
        let a = InternalKey::for_value(Bytes::from_static(b"a"), 10);
        let a_newer = InternalKey::for_value(Bytes::from_static(b"a"), 20);
        let b = InternalKey::for_value(Bytes::from_static(b"b"), 5);

        // Newer version of the same user key sorts first
        assert!(a_newer < a);
        // User key order dominates
        assert!(a < b);
        assert!(a_newer < b);
    }

    #[test]
    fn test_internal_key_decode_too_short() {
        assert!(InternalKey::decode(b"short").is_none());
    }
}
