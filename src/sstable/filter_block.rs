//! Filter block construction and querying.
//!
//! A table carries a single filter block holding one filter per 2KB range
//! of file offsets:
//!
//! ```text
//! filter_0 | ... | filter_{N-1} | offset_0:u32 | ... | offset_{N-1}:u32
//!   | array_offset:u32 | base_lg:u8
//! ```
//!
//! `offset_i` is the start of `filter_i` within the block; `array_offset`
//! is the start of the offset array and doubles as the total filter data
//! length.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::util::coding::{encode_fixed32, read_fixed32};

use super::filter::FilterPolicy;

/// Every filter covers 2^FILTER_BASE_LG bytes of file offsets (2KB).
pub const FILTER_BASE_LG: usize = 11;

const FILTER_BASE: u64 = 1 << FILTER_BASE_LG;

/// Builds the filter block for one table.
///
/// Call sequence: `(start_block add_key*)* finish`, with `start_block`
/// invoked with the file offset of every data block as it is flushed.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    /// Flattened contents of the keys for the in-progress filter.
    keys: Vec<u8>,
    /// Start of each key within `keys`.
    start: Vec<usize>,
    /// Filter data computed so far.
    result: Vec<u8>,
    /// Start of each emitted filter within `result`.
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    /// Create a builder for the given policy.
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self {
            policy,
            keys: Vec::new(),
            start: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Announce that a data block begins at `block_offset`.
    ///
    /// Emits filters for every 2KB range that ends before that offset, so
    /// each range of the file has exactly one (possibly empty) filter slot.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset / FILTER_BASE;
        debug_assert!(filter_index >= self.filter_offsets.len() as u64);
        while filter_index > self.filter_offsets.len() as u64 {
            self.generate_filter();
        }
    }

    /// Record a key belonging to the current data block.
    pub fn add_key(&mut self, key: &[u8]) {
        self.start.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Finish the block: filters, offset array, array offset, base.
    pub fn finish(&mut self) -> Bytes {
        if !self.start.is_empty() {
            self.generate_filter();
        }

        let array_offset = self.result.len() as u32;
        let mut out = BytesMut::with_capacity(self.result.len() + self.filter_offsets.len() * 4 + 5);
        out.put_slice(&self.result);
        for &offset in &self.filter_offsets {
            encode_fixed32(&mut out, offset);
        }
        encode_fixed32(&mut out, array_offset);
        out.put_u8(FILTER_BASE_LG as u8);
        out.freeze()
    }

    fn generate_filter(&mut self) {
        let num_keys = self.start.len();
        self.filter_offsets.push(self.result.len() as u32);
        if num_keys == 0 {
            // No keys for this range: empty filter
            return;
        }

        // Materialize the flattened keys and hand them to the policy
        self.start.push(self.keys.len()); // Simplify length computation
        let tmp_keys: Vec<&[u8]> = (0..num_keys)
            .map(|i| &self.keys[self.start[i]..self.start[i + 1]])
            .collect();
        self.policy.create_filter(&tmp_keys, &mut self.result);

        self.keys.clear();
        self.start.clear();
    }
}

/// Queries the filter block of an open table.
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    /// The whole filter block.
    data: Bytes,
    /// Start of the offset array.
    array_offset: usize,
    /// Number of filters.
    num: usize,
    /// log2 of the range covered per filter.
    base_lg: u32,
}

impl FilterBlockReader {
    /// Parse a filter block. Malformed contents yield a reader that
    /// matches everything (the filter is advisory).
    pub fn new(policy: Arc<dyn FilterPolicy>, data: Bytes) -> Self {
        let mut reader = Self {
            policy,
            data: Bytes::new(),
            array_offset: 0,
            num: 0,
            base_lg: 0,
        };

        let n = data.len();
        if n < 5 {
            // 1 byte base_lg + 4 bytes array offset at minimum
            return reader;
        }
        let base_lg = data[n - 1] as u32;
        let array_offset = read_fixed32(&data[n - 5..]).expect("length checked") as usize;
        if array_offset > n - 5 {
            return reader;
        }

        reader.num = (n - 5 - array_offset) / 4;
        reader.array_offset = array_offset;
        reader.base_lg = base_lg;
        reader.data = data;
        reader
    }

    /// Check whether `key` may be present in the data block starting at
    /// `block_offset`. Fails open on out-of-range offsets.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index < self.num {
            let pos = self.array_offset + index * 4;
            let start = read_fixed32(&self.data[pos..]).unwrap_or(0) as usize;
            let limit = read_fixed32(&self.data[pos + 4..]).unwrap_or(0) as usize;
            if start <= limit && limit <= self.array_offset {
                let filter = &self.data[start..limit];
                return self.policy.key_may_match(key, filter);
            } else if start == limit {
                // Empty filters match no keys
                return false;
            }
        }
        true
    }
}
