//! # ldbfmt
//!
//! The on-disk format engine of an embedded, log-structured key-value
//! store: the write-ahead log record framing and the sorted table
//! (SSTable) reader/writer, with the block cache that sits on the read
//! path.
//!
//! ## What lives here
//!
//! - **WAL framing** ([`wal`]): block-oriented, checksummed, fragment-aware
//!   record streams with corruption-tolerant replay
//! - **SSTables** ([`sstable`]): immutable sorted files with
//!   prefix-compressed blocks, Bloom filter blocks, a footer-anchored
//!   bootstrap, and two-level iteration
//! - **Block cache** ([`cache`]): sharded LRU over uncompressed blocks
//! - **Manifest records** ([`version`]): the `VersionEdit` codec
//!
//! MemTables, compaction scheduling and the version set live above this
//! crate and consume these formats.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ldbfmt::env::FsWritableFile;
//! use ldbfmt::{Options, ReadOptions, SSTableReader, SSTableWriter};
//!
//! # fn main() -> ldbfmt::Result<()> {
//! let path = std::path::Path::new("000001.sst");
//! let mut writer = SSTableWriter::new(Options::default(), FsWritableFile::create(path)?);
//! writer.add(b"hello", b"world")?;
//! writer.finish()?;
//!
//! let reader = SSTableReader::open_path(Options::default(), path)?;
//! let value = reader.get(&ReadOptions::default(), b"hello")?;
//! assert_eq!(value.as_deref(), Some(b"world".as_slice()));
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod error;
pub mod options;
pub mod types;

pub mod cache;
pub mod sstable;
pub mod version;
pub mod wal;

mod util;

pub use error::{Error, Result};
pub use options::{Options, ReadOptions};
pub use types::{InternalKey, ValueType};

pub use cache::{BlockCache, CacheStats};
pub use sstable::{
    BlockBuilder, BloomFilterPolicy, CompressionType, FilterPolicy, SSTableReader, SSTableWriter,
    TableIterator,
};
pub use util::comparator::{BytewiseComparator, Comparator, InternalKeyComparator};
pub use version::{FileMetadata, VersionEdit};
pub use wal::{Reporter, WalReader, WalWriter};
