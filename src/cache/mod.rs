//! Block cache: a sharded LRU keyed by (cache id, block offset).

mod block_cache;
mod lru;

pub use block_cache::{BlockCache, BlockCacheKey};
pub use lru::{CacheStats, LruCache};
