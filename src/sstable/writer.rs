//! Table writer: composes data, filter, metaindex and index blocks.

use std::cmp::Ordering;

use bytes::{Bytes, BytesMut};

use crate::env::WritableFile;
use crate::options::Options;
use crate::util::crc::{mask_crc, Crc32cHasher};
use crate::Result;

use super::block_builder::BlockBuilder;
use super::filter_block::FilterBlockBuilder;
use super::format::{BlockHandle, Footer};
use super::{CompressionType, BLOCK_TRAILER_SIZE};

/// Writer producing an immutable sorted table.
///
/// Keys must be added in strictly increasing order. Data blocks are cut at
/// `options.block_size`; the index entry for a block is deferred until the
/// next key arrives so a shortened separator can be used.
pub struct SSTableWriter<W: WritableFile> {
    options: Options,
    file: W,
    /// Next write position in the file.
    offset: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,
    /// Last key added, the upper bound for the pending index entry.
    last_key: Vec<u8>,
    num_entries: u64,
    closed: bool,
    /// True when a flushed data block awaits its index entry.
    pending_index_entry: bool,
    /// Handle of that flushed block.
    pending_handle: BlockHandle,
}

impl<W: WritableFile> SSTableWriter<W> {
    /// Create a writer emitting to `file`, which must be empty.
    pub fn new(options: Options, file: W) -> Self {
        let mut filter_block = options
            .filter_policy
            .as_ref()
            .map(|policy| FilterBlockBuilder::new(policy.clone()));
        if let Some(fb) = filter_block.as_mut() {
            fb.start_block(0);
        }

        // Index entries are whole keys; prefix compression buys nothing
        let index_block = BlockBuilder::new(1, options.comparator.clone());
        let data_block = BlockBuilder::new(options.block_restart_interval, options.comparator.clone());

        Self {
            options,
            file,
            offset: 0,
            data_block,
            index_block,
            filter_block,
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
        }
    }

    /// Number of entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Size of the file generated so far.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Add a key-value pair. Keys must arrive in strictly increasing order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(!self.closed);
        debug_assert!(
            self.num_entries == 0
                || self.options.comparator.compare(key, &self.last_key) == Ordering::Greater,
            "keys must be added in sorted order"
        );

        if self.pending_index_entry {
            debug_assert!(self.data_block.is_empty());
            // A key between the flushed block's last key and this one keeps
            // the index entry short.
            let separator = self
                .options
                .comparator
                .find_shortest_separator(&self.last_key, key);
            let mut handle_encoding = BytesMut::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&separator, &handle_encoding);
            self.pending_index_entry = false;
        }

        if let Some(fb) = self.filter_block.as_mut() {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }

        Ok(())
    }

    /// Flush the in-progress data block to the file.
    pub fn flush(&mut self) -> Result<()> {
        debug_assert!(!self.closed);
        if self.data_block.is_empty() {
            return Ok(());
        }
        debug_assert!(!self.pending_index_entry);

        let contents = self.data_block.finish();
        self.data_block.reset();
        self.pending_handle = self.write_compressed_block(contents)?;
        self.pending_index_entry = true;
        self.file.flush()?;

        if let Some(fb) = self.filter_block.as_mut() {
            fb.start_block(self.offset);
        }
        Ok(())
    }

    /// Finish the table: remaining data, filter, metaindex, index, footer.
    ///
    /// Returns the final file size.
    pub fn finish(mut self) -> Result<u64> {
        self.flush()?;
        debug_assert!(!self.closed);
        self.closed = true;

        // Filter block (never compressed)
        let filter_contents = self.filter_block.as_mut().map(|fb| fb.finish());
        let filter_handle = match filter_contents {
            Some(contents) => Some(self.write_raw_block(&contents, CompressionType::None)?),
            None => None,
        };

        // Metaindex block: maps "filter.<name>" to the filter handle
        let mut metaindex_block = BlockBuilder::new(
            self.options.block_restart_interval,
            self.options.comparator.clone(),
        );
        if let (Some(handle), Some(policy)) = (filter_handle, self.options.filter_policy.as_ref()) {
            let key = format!("filter.{}", policy.name());
            let mut handle_encoding = BytesMut::new();
            handle.encode_to(&mut handle_encoding);
            metaindex_block.add(key.as_bytes(), &handle_encoding);
        }
        let metaindex_contents = metaindex_block.finish();
        let metaindex_handle = self.write_compressed_block(metaindex_contents)?;

        // Index block, with the trailing entry for the last data block
        if self.pending_index_entry {
            let successor = self.options.comparator.find_short_successor(&self.last_key);
            let mut handle_encoding = BytesMut::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&successor, &handle_encoding);
            self.pending_index_entry = false;
        }
        let index_contents = self.index_block.finish();
        let index_handle = self.write_compressed_block(index_contents)?;

        // Footer
        let footer = Footer::new(metaindex_handle, index_handle);
        let mut footer_encoding = BytesMut::new();
        footer.encode_to(&mut footer_encoding);
        self.file.append(&footer_encoding)?;
        self.offset += footer_encoding.len() as u64;

        self.file.sync()?;
        self.file.close()?;
        Ok(self.offset)
    }

    /// Discard a partially written table. The file contents are undefined.
    pub fn abandon(mut self) {
        self.closed = true;
    }

    /// Write block contents, compressing when it pays for itself.
    fn write_compressed_block(&mut self, raw: Bytes) -> Result<BlockHandle> {
        let (contents, compression) = match self.options.compression {
            CompressionType::None => (raw, CompressionType::None),
            CompressionType::Snappy => {
                match snap::raw::Encoder::new().compress_vec(&raw) {
                    // Keep the compressed form only if it saves at least 12.5%
                    Ok(compressed) if compressed.len() < raw.len() - raw.len() / 8 => {
                        (Bytes::from(compressed), CompressionType::Snappy)
                    }
                    _ => (raw, CompressionType::None),
                }
            }
        };
        self.write_raw_block(&contents, compression)
    }

    /// Append block contents plus the 5-byte trailer.
    fn write_raw_block(
        &mut self,
        contents: &[u8],
        compression: CompressionType,
    ) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, contents.len() as u64);
        self.file.append(contents)?;

        // Trailer: type byte, then masked CRC over contents + type
        let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
        trailer[0] = compression.to_byte();
        let mut hasher = Crc32cHasher::new();
        hasher.update(contents);
        hasher.update(&trailer[..1]);
        let crc = mask_crc(hasher.finalize());
        trailer[1..].copy_from_slice(&crc.to_le_bytes());
        self.file.append(&trailer)?;

        self.offset += (contents.len() + BLOCK_TRAILER_SIZE) as u64;
        Ok(handle)
    }
}
