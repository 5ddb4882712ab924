//! Per-table file metadata carried by manifest edits.

use crate::types::InternalKey;

/// Metadata identifying one table file and its key range.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Reference count held by versions.
    refs: i32,
    /// Seeks allowed before the file becomes a compaction candidate.
    allowed_seeks: i32,
    /// Unique file number.
    number: u64,
    /// File size in bytes.
    file_size: u64,
    /// Smallest internal key served by the table.
    smallest: InternalKey,
    /// Largest internal key served by the table.
    largest: InternalKey,
}

impl FileMetadata {
    /// Create metadata for a freshly written table.
    pub fn new(number: u64, file_size: u64, smallest: InternalKey, largest: InternalKey) -> Self {
        Self {
            refs: 0,
            allowed_seeks: 1 << 30,
            number,
            file_size,
            smallest,
            largest,
        }
    }

    /// Get the file number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Get the file size.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Get the smallest key.
    pub fn smallest(&self) -> &InternalKey {
        &self.smallest
    }

    /// Get the largest key.
    pub fn largest(&self) -> &InternalKey {
        &self.largest
    }

    /// Current reference count. Mutation belongs to the version set,
    /// which serializes it under its own lock.
    pub fn refs(&self) -> i32 {
        self.refs
    }

    /// Seeks remaining before compaction should consider this file.
    /// Mutation belongs to the version set, as with `refs`.
    pub fn allowed_seeks(&self) -> i32 {
        self.allowed_seeks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;
    use bytes::Bytes;

    fn key(s: &str, seq: u64) -> InternalKey {
        InternalKey::new(Bytes::copy_from_slice(s.as_bytes()), seq, ValueType::Value)
    }

    #[test]
    fn test_initial_state() {
        let meta = FileMetadata::new(7, 4096, key("a", 1), key("z", 9));
        assert_eq!(meta.number(), 7);
        assert_eq!(meta.file_size(), 4096);
        assert_eq!(meta.refs(), 0);
        assert_eq!(meta.allowed_seeks(), 1 << 30);
        assert_eq!(meta.smallest().user_key(), b"a");
        assert_eq!(meta.largest().user_key(), b"z");
    }

}
