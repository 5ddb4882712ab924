//! Table reader: point lookups and iteration over an immutable table.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::env::{FsRandomAccessFile, RandomAccessFile};
use crate::options::{Options, ReadOptions};
use crate::util::comparator::BytewiseComparator;
use crate::{Error, Result};

use super::block::{Block, BlockIter};
use super::filter::FilterPolicy;
use super::filter_block::FilterBlockReader;
use super::format::{read_block, BlockHandle, Footer};
use super::iterator::TableIterator;

/// An open, immutable sorted table.
///
/// Safe to share across threads; all reads go through the (thread-safe)
/// underlying file. Block loads consult the block cache when one is
/// configured.
pub struct SSTableReader {
    options: Options,
    file: Arc<dyn RandomAccessFile>,
    /// Id scoping this table's entries in the shared block cache.
    cache_id: u64,
    metaindex_handle: BlockHandle,
    index_block: Arc<Block>,
    filter: Option<FilterBlockReader>,
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("cache_id", &self.cache_id)
            .field("metaindex_handle", &self.metaindex_handle)
            .finish_non_exhaustive()
    }
}

impl SSTableReader {
    /// Open a table from a file of known size.
    ///
    /// Reads the footer and the index block; a failure in either fails the
    /// open. The filter block is advisory and read errors there are
    /// ignored.
    pub fn open(
        options: Options,
        file: Arc<dyn RandomAccessFile>,
        file_size: u64,
    ) -> Result<Self> {
        if file_size < Footer::ENCODED_LENGTH as u64 {
            return Err(Error::corruption("file is too short to be an sstable"));
        }

        let footer_input = file.read_at(
            file_size - Footer::ENCODED_LENGTH as u64,
            Footer::ENCODED_LENGTH,
        )?;
        if footer_input.len() != Footer::ENCODED_LENGTH {
            return Err(Error::corruption("truncated footer read"));
        }
        let footer = Footer::decode_from(&footer_input)?;

        let read_opts = ReadOptions {
            verify_checksums: options.paranoid_checks,
            fill_cache: false,
        };
        let index_contents = read_block(file.as_ref(), &read_opts, &footer.index_handle())?;
        let index_block = Arc::new(Block::new(index_contents)?);

        let cache_id = options
            .block_cache
            .as_ref()
            .map(|cache| cache.new_id())
            .unwrap_or(0);

        let mut reader = Self {
            options,
            file,
            cache_id,
            metaindex_handle: footer.metaindex_handle(),
            index_block,
            filter: None,
        };
        reader.read_meta();
        Ok(reader)
    }

    /// Open a table stored at `path`.
    pub fn open_path(options: Options, path: &Path) -> Result<Self> {
        let file = FsRandomAccessFile::open(path)?;
        let file_size = file.len()?;
        Self::open(options, Arc::new(file), file_size)
    }

    /// Load the filter block named by the metaindex block.
    ///
    /// The filter only short-circuits lookups, so every failure here
    /// degrades to "no filter" rather than an error.
    fn read_meta(&mut self) {
        let Some(policy) = self.options.filter_policy.clone() else {
            return;
        };

        let read_opts = ReadOptions {
            verify_checksums: self.options.paranoid_checks,
            fill_cache: false,
        };
        let Ok(contents) = read_block(self.file.as_ref(), &read_opts, &self.metaindex_handle)
        else {
            return;
        };
        let Ok(meta) = Block::new(contents) else {
            return;
        };

        // Metaindex keys are policy names, compared bytewise regardless of
        // the table comparator.
        let meta = Arc::new(meta);
        let mut iter = meta.iter(Arc::new(BytewiseComparator::new()));
        let key = format!("filter.{}", policy.name());
        iter.seek(key.as_bytes());
        if iter.valid() && iter.key() == key.as_bytes() {
            let handle_value = iter.value().clone();
            self.read_filter(policy, &handle_value);
        }
    }

    fn read_filter(&mut self, policy: Arc<dyn FilterPolicy>, handle_value: &[u8]) {
        let mut cursor = handle_value;
        let Ok(handle) = BlockHandle::decode_from(&mut cursor) else {
            return;
        };

        let read_opts = ReadOptions {
            verify_checksums: self.options.paranoid_checks,
            fill_cache: false,
        };
        let Ok(contents) = read_block(self.file.as_ref(), &read_opts, &handle) else {
            return;
        };
        self.filter = Some(FilterBlockReader::new(policy, contents.data));
    }

    /// Iterator over the index block.
    pub(crate) fn index_iter(&self) -> BlockIter {
        self.index_block.iter(self.options.comparator.clone())
    }

    /// Turn an index entry value (an encoded handle) into an iterator over
    /// that data block, going through the cache when one is configured.
    ///
    /// Bytes after the handle in `index_value` are ignored so the index
    /// format can grow.
    pub(crate) fn block_reader(
        &self,
        read_options: &ReadOptions,
        index_value: &[u8],
    ) -> Result<BlockIter> {
        let mut cursor = index_value;
        let handle = BlockHandle::decode_from(&mut cursor)?;

        let block = match self.options.block_cache.as_ref() {
            Some(cache) => match cache.lookup(self.cache_id, handle.offset()) {
                Some(block) => block,
                None => {
                    let contents = read_block(self.file.as_ref(), read_options, &handle)?;
                    let cachable = contents.cachable;
                    let block = Arc::new(Block::new(contents)?);
                    if cachable && read_options.fill_cache {
                        cache.insert(self.cache_id, handle.offset(), Arc::clone(&block));
                    }
                    block
                }
            },
            None => {
                let contents = read_block(self.file.as_ref(), read_options, &handle)?;
                Arc::new(Block::new(contents)?)
            }
        };

        Ok(block.iter(self.options.comparator.clone()))
    }

    /// Find the first entry with key >= `key`.
    ///
    /// Consults the filter first: a negative filter answer proves absence
    /// without touching the data block.
    pub fn internal_get(
        &self,
        read_options: &ReadOptions,
        key: &[u8],
    ) -> Result<Option<(Bytes, Bytes)>> {
        let mut index_iter = self.index_iter();
        index_iter.seek(key);
        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(None);
        }

        let handle_value = index_iter.value().clone();
        if let Some(filter) = self.filter.as_ref() {
            let mut cursor = &handle_value[..];
            if let Ok(handle) = BlockHandle::decode_from(&mut cursor) {
                if !filter.key_may_match(handle.offset(), key) {
                    // Definitively absent
                    return Ok(None);
                }
            }
        }

        let mut block_iter = self.block_reader(read_options, &handle_value)?;
        block_iter.seek(key);
        let found = if block_iter.valid() {
            Some((
                Bytes::copy_from_slice(block_iter.key()),
                block_iter.value().clone(),
            ))
        } else {
            None
        };
        block_iter.status()?;
        index_iter.status()?;
        Ok(found)
    }

    /// Get the value stored under exactly `key`, if any.
    pub fn get(&self, read_options: &ReadOptions, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.internal_get(read_options, key)?.and_then(|(k, v)| {
            if self.options.comparator.compare(&k, key) == Ordering::Equal {
                Some(v)
            } else {
                None
            }
        }))
    }

    /// Create a two-level iterator over the whole table.
    pub fn iter(self: &Arc<Self>, read_options: ReadOptions) -> TableIterator {
        TableIterator::new(Arc::clone(self), read_options)
    }

    /// Approximate file offset at which `key` would live.
    ///
    /// Keys past the end of the table (and undecodable index entries) map
    /// to the metaindex offset, which sits just before the end of the
    /// file.
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        let mut index_iter = self.index_iter();
        index_iter.seek(key);
        if index_iter.valid() {
            let mut cursor = &index_iter.value()[..];
            match BlockHandle::decode_from(&mut cursor) {
                Ok(handle) => handle.offset(),
                Err(_) => self.metaindex_handle.offset(),
            }
        } else {
            self.metaindex_handle.offset()
        }
    }
}
