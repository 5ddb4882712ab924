//! Builder for prefix-compressed, restart-pointed blocks.
//!
//! Keys are stored as a delta against the previous key. Every
//! `restart_interval` entries the full key is stored again and its offset
//! recorded in the restart array, which readers binary-search.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::util::coding::{encode_fixed32, encode_varint32};
use crate::util::comparator::Comparator;

/// Builder for block contents (data, index and metaindex blocks alike).
///
/// The produced bytes do not include the on-disk trailer; the table writer
/// appends the compression byte and CRC.
pub struct BlockBuilder {
    /// Destination buffer for entries.
    buffer: BytesMut,
    /// Offsets of restart points within `buffer`.
    restarts: Vec<u32>,
    /// Entries emitted since the last restart.
    counter: usize,
    /// Number of entries between restart points.
    restart_interval: usize,
    /// Key order authority.
    comparator: Arc<dyn Comparator>,
    /// Last key added, for prefix compression.
    last_key: Vec<u8>,
    /// Set by `finish`; the builder must be `reset` before reuse.
    finished: bool,
}

impl BlockBuilder {
    /// Create a new block builder.
    pub fn new(restart_interval: usize, comparator: Arc<dyn Comparator>) -> Self {
        debug_assert!(restart_interval >= 1);
        Self {
            buffer: BytesMut::new(),
            restarts: vec![0], // First restart point is at offset 0
            counter: 0,
            restart_interval,
            comparator,
            last_key: Vec::new(),
            finished: false,
        }
    }

    /// Add a key-value pair. Keys must arrive in strictly increasing order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished);
        debug_assert!(self.counter <= self.restart_interval);
        debug_assert!(
            self.buffer.is_empty()
                || self.comparator.compare(key, &self.last_key) == Ordering::Greater,
            "keys must be added in sorted order"
        );

        let shared = if self.counter < self.restart_interval {
            // Length of the prefix shared with the previous key
            let min_len = std::cmp::min(self.last_key.len(), key.len());
            let mut shared = 0;
            while shared < min_len && self.last_key[shared] == key[shared] {
                shared += 1;
            }
            shared
        } else {
            // Restart prefix compression from this entry
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };

        let unshared = key.len() - shared;

        // Entry: shared | unshared | value_len | key_delta | value
        encode_varint32(&mut self.buffer, shared as u32);
        encode_varint32(&mut self.buffer, unshared as u32);
        encode_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Check if no entries have been added.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Upper-bound estimate of the finished block size.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len()            // entry data
            + self.restarts.len() * 4 // restart array
            + 4 // restart count
    }

    /// Append the restart array and return the finished block contents.
    pub fn finish(&mut self) -> Bytes {
        debug_assert!(!self.finished);
        self.finished = true;

        for &restart in &self.restarts {
            encode_fixed32(&mut self.buffer, restart);
        }
        encode_fixed32(&mut self.buffer, self.restarts.len() as u32);

        self.buffer.clone().freeze()
    }

    /// Reset the builder for the next block.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::comparator::BytewiseComparator;

    fn builder(restart_interval: usize) -> BlockBuilder {
        BlockBuilder::new(restart_interval, Arc::new(BytewiseComparator::new()))
    }

    #[test]
    fn test_empty_builder() {
        let mut b = builder(16);
        assert!(b.is_empty());

        // An empty block is just the restart array: [0] + count
        let data = b.finish();
        assert_eq!(data.len(), 8);
    }

    #[test]
    fn test_single_entry_layout() {
        let mut b = builder(16);
        b.add(b"key", b"value");

        let data = b.finish();
        // shared=0, unshared=3, value_len=5, "key", "value",
        // restart array [0], count 1
        assert_eq!(&data[..3], &[0, 3, 5]);
        assert_eq!(&data[3..6], b"key");
        assert_eq!(&data[6..11], b"value");
        assert_eq!(&data[11..], &[0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_prefix_compression_shares_bytes() {
        let mut b = builder(16);
        b.add(b"prefix_aaa", b"1");
        b.add(b"prefix_aab", b"2");

        let data = b.finish();
        // Second entry shares 9 bytes and stores only 1 key byte
        // entry1: 3 + 10 + 1, entry2 starts at 14
        assert_eq!(data[14], 9); // shared
        assert_eq!(data[15], 1); // unshared
    }

    #[test]
    fn test_restart_interval_resets_compression() {
        let mut b = builder(2);
        b.add(b"aaa1", b"v");
        b.add(b"aaa2", b"v");
        b.add(b"aaa3", b"v"); // new restart: stored in full

        let data = b.finish();
        // Trailing count says 2 restart points
        let count = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap());
        assert_eq!(count, 2);
    }

    #[test]
    fn test_size_estimate_tracks_finish() {
        let mut b = builder(16);
        for i in 0..20 {
            let key = format!("key_{:03}", i);
            b.add(key.as_bytes(), b"value");
        }
        let estimate = b.current_size_estimate();
        let data = b.finish();
        assert_eq!(estimate, data.len());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut b = builder(16);
        b.add(b"key1", b"value1");
        b.finish();

        b.reset();
        assert!(b.is_empty());
        b.add(b"key0", b"value0"); // order constraint restarts after reset
        let data = b.finish();
        assert_eq!(&data[3..7], b"key0");
    }
}
