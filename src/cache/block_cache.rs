//! Cache of uncompressed data blocks shared across open tables.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::sstable::Block;

use super::lru::{CacheStats, LruCache};

/// Default capacity: 8MB of block data.
const DEFAULT_CAPACITY: usize = 8 << 20;

/// Cache key: (per-table cache id, block offset within the file).
///
/// Table files are immutable and never reuse ids, so the pair uniquely
/// identifies a block for the lifetime of the cache.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct BlockCacheKey {
    /// Id handed to the owning table at open.
    pub cache_id: u64,
    /// Offset of the block within the table file.
    pub offset: u64,
}

/// Shared cache of uncompressed [`Block`]s.
///
/// Entries are reference counted; eviction drops the cache's reference
/// while live iterators keep the block alive through their own.
pub struct BlockCache {
    cache: LruCache<BlockCacheKey, Arc<Block>>,
    next_id: AtomicU64,
}

impl BlockCache {
    /// Create a cache holding at most `capacity` bytes of block data.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(capacity),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh id for an opening table.
    pub fn new_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a cached block.
    pub fn lookup(&self, cache_id: u64, offset: u64) -> Option<Arc<Block>> {
        self.cache.get(&BlockCacheKey { cache_id, offset })
    }

    /// Insert a block, charged at its content size.
    pub fn insert(&self, cache_id: u64, offset: u64, block: Arc<Block>) {
        let charge = block.size();
        self.cache
            .insert(BlockCacheKey { cache_id, offset }, block, charge);
    }

    /// Number of resident blocks.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> Arc<CacheStats> {
        self.cache.stats()
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
