//! Two-level iteration: index block entries point at data blocks.

use std::sync::Arc;

use bytes::Bytes;

use crate::options::ReadOptions;
use crate::{Error, Result};

use super::block::BlockIter;
use super::reader::SSTableReader;

/// Iterator over every entry of a table.
///
/// Walks the index block and lazily materializes one data-block iterator
/// at a time; data blocks are fetched through the block cache. Valid iff
/// both levels are valid.
pub struct TableIterator {
    reader: Arc<SSTableReader>,
    read_options: ReadOptions,
    index_iter: BlockIter,
    data_iter: Option<BlockIter>,
    /// Encoded handle backing `data_iter`, to skip pointless reloads.
    data_block_handle: Option<Bytes>,
    /// First error from constructing a data iterator.
    status: Result<()>,
}

impl TableIterator {
    pub(crate) fn new(reader: Arc<SSTableReader>, read_options: ReadOptions) -> Self {
        let index_iter = reader.index_iter();
        Self {
            reader,
            read_options,
            index_iter,
            data_iter: None,
            data_block_handle: None,
            status: Ok(()),
        }
    }

    /// Check if the iterator is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|iter| iter.valid())
    }

    /// Current key. Requires `valid()`.
    pub fn key(&self) -> &[u8] {
        self.data_iter.as_ref().expect("valid iterator").key()
    }

    /// Current value. Requires `valid()`.
    pub fn value(&self) -> &Bytes {
        self.data_iter.as_ref().expect("valid iterator").value()
    }

    /// First error from either level; an own block-load error wins last.
    pub fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(data_iter) = self.data_iter.as_ref() {
            data_iter.status()?;
        }
        self.status.clone()
    }

    /// Position at the first entry of the table.
    pub fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    /// Position at the last entry of the table.
    pub fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    /// Position at the first entry with key >= target.
    pub fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    /// Advance to the next entry. Requires `valid()`.
    pub fn next(&mut self) {
        debug_assert!(self.valid());
        self.data_iter.as_mut().expect("valid iterator").next();
        self.skip_empty_data_blocks_forward();
    }

    /// Step back to the previous entry. Requires `valid()`.
    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        self.data_iter.as_mut().expect("valid iterator").prev();
        self.skip_empty_data_blocks_backward();
    }

    /// Build the data iterator for the current index position, reusing the
    /// existing one when the index has not moved to a new block.
    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.data_iter = None;
            self.data_block_handle = None;
            return;
        }

        let handle = self.index_iter.value().clone();
        if self.data_iter.is_some() && self.data_block_handle.as_ref() == Some(&handle) {
            // Already on this block
            return;
        }

        match self.reader.block_reader(&self.read_options, &handle) {
            Ok(iter) => {
                self.data_iter = Some(iter);
                self.data_block_handle = Some(handle);
            }
            Err(e) => {
                self.save_error(e);
                self.data_iter = None;
                self.data_block_handle = None;
            }
        }
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while !self.data_iter.as_ref().is_some_and(|iter| iter.valid()) {
            if !self.index_iter.valid() {
                self.data_iter = None;
                self.data_block_handle = None;
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while !self.data_iter.as_ref().is_some_and(|iter| iter.valid()) {
            if !self.index_iter.valid() {
                self.data_iter = None;
                self.data_block_handle = None;
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_last();
            }
        }
    }

    fn save_error(&mut self, e: Error) {
        if self.status.is_ok() {
            self.status = Err(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::FsWritableFile;
    use crate::options::Options;
    use crate::sstable::{SSTableReader, SSTableWriter};
    use tempfile::tempdir;

    fn build_table(
        path: &std::path::Path,
        count: usize,
        options: &Options,
    ) -> Arc<SSTableReader> {
        let file = FsWritableFile::create(path).unwrap();
        let mut writer = SSTableWriter::new(options.clone(), file);
        for i in 0..count {
            let key = format!("key_{:05}", i);
            let value = format!("value_{}", i);
            writer.add(key.as_bytes(), value.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        Arc::new(SSTableReader::open_path(options.clone(), path).unwrap())
    }

    fn small_block_options() -> Options {
        let mut options = Options::default();
        options.block_size = 128; // Many data blocks
        options
    }

    #[test]
    fn test_forward_scan_sees_everything_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");
        let reader = build_table(&path, 300, &small_block_options());

        let mut iter = reader.iter(ReadOptions::default());
        iter.seek_to_first();

        let mut count = 0;
        let mut last_key: Option<Vec<u8>> = None;
        while iter.valid() {
            if let Some(prev) = &last_key {
                assert!(iter.key() > prev.as_slice());
            }
            last_key = Some(iter.key().to_vec());
            count += 1;
            iter.next();
        }
        assert_eq!(count, 300);
        assert!(iter.status().is_ok());
    }

    #[test]
    fn test_backward_scan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");
        let reader = build_table(&path, 100, &small_block_options());

        let mut iter = reader.iter(ReadOptions::default());
        iter.seek_to_last();

        for i in (0..100).rev() {
            assert!(iter.valid());
            assert_eq!(iter.key(), format!("key_{:05}", i).as_bytes());
            iter.prev();
        }
        assert!(!iter.valid());
    }

    #[test]
    fn test_seek_lands_on_least_upper_bound() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");
        let reader = build_table(&path, 200, &small_block_options());

        let mut iter = reader.iter(ReadOptions::default());

        iter.seek(b"key_00050");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key_00050");

        // Between keys: lands on the next one, possibly in the next block
        iter.seek(b"key_00050x");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key_00051");

        iter.seek(b"zzz");
        assert!(!iter.valid());
    }

    #[test]
    fn test_seek_then_scan_crosses_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");
        let reader = build_table(&path, 200, &small_block_options());

        let mut iter = reader.iter(ReadOptions::default());
        iter.seek(b"key_00190");
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[0], b"key_00190");
        assert_eq!(seen[9], b"key_00199");
    }

    #[test]
    fn test_empty_table_iterator() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");
        let reader = build_table(&path, 0, &Options::default());

        let mut iter = reader.iter(ReadOptions::default());
        iter.seek_to_first();
        assert!(!iter.valid());
        iter.seek(b"anything");
        assert!(!iter.valid());
        assert!(iter.status().is_ok());
    }
}
