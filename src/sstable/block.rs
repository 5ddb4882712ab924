//! Block reader: restart-point binary search and entry iteration.

use std::sync::Arc;

use bytes::Bytes;

use crate::util::coding::{decode_varint32, read_fixed32};
use crate::util::comparator::Comparator;
use crate::{Error, Result};

use super::format::BlockContents;

/// An immutable block of sorted key-value entries.
///
/// Holds the uncompressed block contents (entries, restart array, restart
/// count) and hands out iterators that share it by reference count.
#[derive(Debug)]
pub struct Block {
    /// Entries followed by the restart array and its length.
    data: Bytes,
    /// Offset of the restart array.
    restart_offset: usize,
    /// Number of restart points.
    num_restarts: u32,
}

impl Block {
    /// Create a block from the contents returned by `read_block`.
    pub fn new(contents: BlockContents) -> Result<Self> {
        Self::from_bytes(contents.data)
    }

    /// Create a block from raw contents (without trailer).
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("bad block contents"));
        }

        let num_restarts = read_fixed32(&data[data.len() - 4..]).expect("length checked");
        let max_restarts = (data.len() - 4) / 4;
        if num_restarts as usize > max_restarts {
            return Err(Error::corruption("bad block contents"));
        }

        let restart_offset = data.len() - 4 - num_restarts as usize * 4;

        Ok(Self {
            data,
            restart_offset,
            num_restarts,
        })
    }

    /// Size of the block contents in bytes (used as the cache charge).
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Number of restart points.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Offset of the restart point with the given index.
    fn restart_point(&self, index: u32) -> u32 {
        debug_assert!(index < self.num_restarts);
        let pos = self.restart_offset + index as usize * 4;
        read_fixed32(&self.data[pos..]).expect("restart array in bounds")
    }

    /// Create an iterator over the block.
    pub fn iter(self: &Arc<Self>, comparator: Arc<dyn Comparator>) -> BlockIter {
        BlockIter::new(Arc::clone(self), comparator)
    }
}

/// Iterator over the entries of a [`Block`].
///
/// The iterator pins the block alive; it stays usable after the cache has
/// evicted the entry.
pub struct BlockIter {
    block: Arc<Block>,
    comparator: Arc<dyn Comparator>,
    /// Offset of the current entry; `restart_offset` when invalid.
    current: usize,
    /// Offset just past the current entry, where the next parse starts.
    next_offset: usize,
    /// Index of the restart block containing the current entry.
    restart_index: u32,
    /// Current key, reconstructed through prefix compression.
    key: Vec<u8>,
    /// Current value.
    value: Bytes,
    /// First corruption encountered, if any.
    status: Result<()>,
}

impl BlockIter {
    fn new(block: Arc<Block>, comparator: Arc<dyn Comparator>) -> Self {
        let restart_offset = block.restart_offset;
        let num_restarts = block.num_restarts;
        Self {
            block,
            comparator,
            current: restart_offset,
            next_offset: restart_offset,
            restart_index: num_restarts,
            key: Vec::new(),
            value: Bytes::new(),
            status: Ok(()),
        }
    }

    /// Check if the iterator is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.status.is_ok() && self.current < self.block.restart_offset
    }

    /// First corruption encountered while iterating.
    pub fn status(&self) -> Result<()> {
        self.status.clone()
    }

    /// Current key. Requires `valid()`.
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.key
    }

    /// Current value. Requires `valid()`.
    pub fn value(&self) -> &Bytes {
        debug_assert!(self.valid());
        &self.value
    }

    /// Position at the first entry.
    pub fn seek_to_first(&mut self) {
        if self.block.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    /// Position at the last entry.
    pub fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_key() && self.next_offset < self.block.restart_offset {}
    }

    /// Position at the first entry with key >= target.
    pub fn seek(&mut self, target: &[u8]) {
        if self.block.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }

        // Binary-search the restart array for the last restart point whose
        // key is < target. Restart entries store the full key.
        let mut left = 0u32;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let region_offset = self.block.restart_point(mid) as usize;
            match self.decode_restart_key(region_offset) {
                Some(mid_key) => {
                    if self.comparator.compare(mid_key, target) == std::cmp::Ordering::Less {
                        left = mid;
                    } else {
                        right = mid - 1;
                    }
                }
                None => {
                    self.corruption_error();
                    return;
                }
            }
        }

        // Linear scan forward within the chosen restart range
        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.comparator.compare(&self.key, target) != std::cmp::Ordering::Less {
                return;
            }
        }
    }

    /// Advance to the next entry. Requires `valid()`.
    pub fn next(&mut self) {
        debug_assert!(self.valid());
        self.parse_next_key();
    }

    /// Step back to the previous entry. Requires `valid()`.
    ///
    /// Entries cannot be decoded backwards; this re-scans forward from the
    /// nearest restart point before the current entry.
    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        let original = self.current;

        while self.block.restart_point(self.restart_index) as usize >= original {
            if self.restart_index == 0 {
                // No entries before the current one
                self.mark_exhausted();
                return;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_key() && self.next_offset < original {}
    }

    /// Key at a restart point, which is always stored without prefix
    /// compression. Returns None on malformed data.
    fn decode_restart_key(&self, offset: usize) -> Option<&[u8]> {
        let limit = self.block.restart_offset;
        if offset >= limit {
            return None;
        }
        let mut cursor = &self.block.data[offset..limit];
        let shared = decode_varint32(&mut cursor)?;
        let unshared = decode_varint32(&mut cursor)? as usize;
        let _value_len = decode_varint32(&mut cursor)?;
        if shared != 0 || cursor.len() < unshared {
            return None;
        }
        Some(&cursor[..unshared])
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        self.next_offset = self.block.restart_point(index) as usize;
        self.value = Bytes::new();
    }

    /// Decode the entry at `next_offset`, making it current.
    fn parse_next_key(&mut self) -> bool {
        let p = self.next_offset;
        let limit = self.block.restart_offset;
        if p >= limit {
            self.mark_exhausted();
            return false;
        }

        let mut cursor = &self.block.data[p..limit];
        let header = (
            decode_varint32(&mut cursor),
            decode_varint32(&mut cursor),
            decode_varint32(&mut cursor),
        );
        let (shared, unshared, value_len) = match header {
            (Some(s), Some(u), Some(v)) => (s as usize, u as usize, v as usize),
            _ => {
                self.corruption_error();
                return false;
            }
        };

        if shared > self.key.len() || cursor.len() < unshared + value_len {
            self.corruption_error();
            return false;
        }

        let header_len = (limit - p) - cursor.len();
        let value_start = p + header_len + unshared;

        self.key.truncate(shared);
        self.key.extend_from_slice(&cursor[..unshared]);
        self.value = self.block.data.slice(value_start..value_start + value_len);
        self.current = p;
        self.next_offset = value_start + value_len;

        while self.restart_index + 1 < self.block.num_restarts
            && (self.block.restart_point(self.restart_index + 1) as usize) < self.current
        {
            self.restart_index += 1;
        }

        true
    }

    fn mark_exhausted(&mut self) {
        self.current = self.block.restart_offset;
        self.next_offset = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
    }

    fn corruption_error(&mut self) {
        self.mark_exhausted();
        self.key.clear();
        self.value = Bytes::new();
        self.status = Err(Error::corruption("bad entry in block"));
    }
}
