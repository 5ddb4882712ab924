//! On-disk anchors of an SSTable: block handles, the footer, and the raw
//! block read path.

use bytes::{Bytes, BytesMut};

use crate::env::RandomAccessFile;
use crate::options::ReadOptions;
use crate::util::coding::{decode_varint64, encode_fixed32, encode_varint64, read_fixed32};
use crate::util::crc::{crc32c, unmask_crc};
use crate::{Error, Result};

use super::{CompressionType, BLOCK_TRAILER_SIZE};

/// Magic number identifying an SSTable, stored in the last 8 bytes of the
/// footer.
pub const TABLE_MAGIC: u64 = 0xdb4775248b80fb57;

/// Handle to a byte range within an SSTable file.
///
/// The size excludes the 5-byte block trailer; readers always fetch
/// `size + 5` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    offset: u64,
    size: u64,
}

impl BlockHandle {
    /// Maximum encoded length of a handle (two varint64).
    pub const MAX_ENCODED_LENGTH: usize = 10 + 10;

    /// Create a new block handle.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the size (excluding the trailer).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Encode as two varint64 values.
    pub fn encode_to(&self, buf: &mut BytesMut) {
        // Both fields must have been set
        debug_assert!(self.offset != u64::MAX);
        debug_assert!(self.size != u64::MAX);
        encode_varint64(buf, self.offset);
        encode_varint64(buf, self.size);
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::MAX_ENCODED_LENGTH);
        self.encode_to(&mut buf);
        buf.freeze()
    }

    /// Decode from the front of `input`, consuming the bytes read.
    pub fn decode_from(input: &mut &[u8]) -> Result<Self> {
        match (decode_varint64(input), decode_varint64(input)) {
            (Some(offset), Some(size)) => Ok(Self { offset, size }),
            _ => Err(Error::corruption("bad block handle")),
        }
    }
}

impl Default for BlockHandle {
    fn default() -> Self {
        // Sentinel marking both fields as unset.
        Self {
            offset: u64::MAX,
            size: u64::MAX,
        }
    }
}

/// Fixed-size trailer at the end of every SSTable, locating the metaindex
/// and index blocks.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    metaindex_handle: BlockHandle,
    index_handle: BlockHandle,
}

impl Footer {
    /// Encoded length: two padded handles plus the magic = 48 bytes.
    pub const ENCODED_LENGTH: usize = 2 * BlockHandle::MAX_ENCODED_LENGTH + 8;

    /// Create a new footer.
    pub fn new(metaindex_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Self {
            metaindex_handle,
            index_handle,
        }
    }

    /// Handle of the metaindex block.
    pub fn metaindex_handle(&self) -> BlockHandle {
        self.metaindex_handle
    }

    /// Handle of the index block.
    pub fn index_handle(&self) -> BlockHandle {
        self.index_handle
    }

    /// Encode exactly [`Footer::ENCODED_LENGTH`] bytes into `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) {
        let original_size = buf.len();
        self.metaindex_handle.encode_to(buf);
        self.index_handle.encode_to(buf);
        // Zero-pad the handle area to its maximum size
        buf.resize(original_size + 2 * BlockHandle::MAX_ENCODED_LENGTH, 0);
        // The magic is written as two fixed32 words, low half first
        encode_fixed32(buf, (TABLE_MAGIC & 0xffff_ffff) as u32);
        encode_fixed32(buf, (TABLE_MAGIC >> 32) as u32);
        debug_assert_eq!(buf.len(), original_size + Self::ENCODED_LENGTH);
    }

    /// Decode a footer from exactly [`Footer::ENCODED_LENGTH`] bytes.
    ///
    /// Padding between the handles and the magic is ignored.
    pub fn decode_from(input: &[u8]) -> Result<Self> {
        if input.len() < Self::ENCODED_LENGTH {
            return Err(Error::corruption("not an sstable (footer too short)"));
        }

        let magic_area = &input[Self::ENCODED_LENGTH - 8..Self::ENCODED_LENGTH];
        let magic_lo = read_fixed32(&magic_area[..4]).unwrap_or(0) as u64;
        let magic_hi = read_fixed32(&magic_area[4..]).unwrap_or(0) as u64;
        let magic = (magic_hi << 32) | magic_lo;
        if magic != TABLE_MAGIC {
            return Err(Error::corruption("not an sstable (bad magic number)"));
        }

        let mut cursor = &input[..Self::ENCODED_LENGTH - 8];
        let metaindex_handle = BlockHandle::decode_from(&mut cursor)?;
        let index_handle = BlockHandle::decode_from(&mut cursor)?;

        Ok(Self {
            metaindex_handle,
            index_handle,
        })
    }
}

/// Result of reading one block from an SSTable.
#[derive(Debug)]
pub struct BlockContents {
    /// Uncompressed block contents, without the trailer.
    pub data: Bytes,
    /// Whether the block may be inserted into the block cache.
    pub cachable: bool,
}

/// Read the block identified by `handle` and strip its trailer.
///
/// Reads `handle.size() + 5` bytes, optionally verifies the trailer CRC,
/// and decompresses according to the trailer's compression byte.
pub fn read_block(
    file: &dyn RandomAccessFile,
    options: &ReadOptions,
    handle: &BlockHandle,
) -> Result<BlockContents> {
    let n = handle.size() as usize;
    let raw = file.read_at(handle.offset(), n + BLOCK_TRAILER_SIZE)?;
    if raw.len() != n + BLOCK_TRAILER_SIZE {
        return Err(Error::corruption("truncated block read"));
    }

    // The stored CRC covers the contents and the compression type byte.
    if options.verify_checksums {
        let stored = read_fixed32(&raw[n + 1..n + 5]).expect("trailer present");
        let actual = crc32c(&raw[..n + 1]);
        if actual != unmask_crc(stored) {
            return Err(Error::corruption("block checksum mismatch"));
        }
    }

    match CompressionType::from_byte(raw[n]) {
        Some(CompressionType::None) => Ok(BlockContents {
            data: raw.slice(..n),
            cachable: true,
        }),
        Some(CompressionType::Snappy) => {
            let data = snap::raw::Decoder::new()
                .decompress_vec(&raw[..n])
                .map_err(|_| Error::corruption("corrupted compressed block contents"))?;
            Ok(BlockContents {
                data: Bytes::from(data),
                cachable: true,
            })
        }
        None => Err(Error::corruption("bad block type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::crc::{crc32c, mask_crc};

    struct MemFile(Bytes);

    impl RandomAccessFile for MemFile {
        fn read_at(&self, offset: u64, n: usize) -> Result<Bytes> {
            let start = (offset as usize).min(self.0.len());
            let end = (start + n).min(self.0.len());
            Ok(self.0.slice(start..end))
        }
    }

    fn raw_block(contents: &[u8], compression: CompressionType) -> Vec<u8> {
        let mut out = contents.to_vec();
        out.push(compression.to_byte());
        let crc = mask_crc(crc32c(&out));
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    #[test]
    fn test_block_handle_roundtrip() {
        let handle = BlockHandle::new(123456, 7890);
        let encoded = handle.encode();
        assert!(encoded.len() <= BlockHandle::MAX_ENCODED_LENGTH);

        let mut cursor = &encoded[..];
        let decoded = BlockHandle::decode_from(&mut cursor).unwrap();
        assert_eq!(decoded, handle);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_block_handle_truncated() {
        let handle = BlockHandle::new(u64::MAX - 1, u64::MAX - 1);
        let encoded = handle.encode();
        let mut cursor = &encoded[..encoded.len() - 1];
        let err = BlockHandle::decode_from(&mut cursor).unwrap_err();
        assert_eq!(err, Error::corruption("bad block handle"));
    }

    #[test]
    fn test_footer_is_48_bytes_with_exact_magic_tail() {
        let footer = Footer::new(BlockHandle::new(0, 10), BlockHandle::new(15, 20));
        let mut buf = BytesMut::new();
        footer.encode_to(&mut buf);

        assert_eq!(buf.len(), Footer::ENCODED_LENGTH);
        assert_eq!(Footer::ENCODED_LENGTH, 48);
        assert_eq!(
            &buf[40..],
            &[0x57, 0xfb, 0x80, 0x8b, 0x24, 0x75, 0x47, 0xdb]
        );
    }

    #[test]
    fn test_footer_roundtrip() {
        let footer = Footer::new(
            BlockHandle::new(1 << 40, 99),
            BlockHandle::new((1 << 40) + 104, 1 << 20),
        );
        let mut buf = BytesMut::new();
        footer.encode_to(&mut buf);

        let decoded = Footer::decode_from(&buf).unwrap();
        assert_eq!(decoded.metaindex_handle(), footer.metaindex_handle());
        assert_eq!(decoded.index_handle(), footer.index_handle());
    }

    #[test]
    fn test_footer_bad_magic() {
        let footer = Footer::new(BlockHandle::new(0, 10), BlockHandle::new(15, 20));
        let mut buf = BytesMut::new();
        footer.encode_to(&mut buf);
        for b in &mut buf[40..48] {
            *b = 0;
        }

        let err = Footer::decode_from(&buf).unwrap_err();
        assert_eq!(err, Error::corruption("not an sstable (bad magic number)"));
    }

    #[test]
    fn test_read_block_uncompressed() {
        let raw = raw_block(b"block contents", CompressionType::None);
        let file = MemFile(Bytes::from(raw));

        let opts = ReadOptions {
            verify_checksums: true,
            fill_cache: true,
        };
        let contents = read_block(&file, &opts, &BlockHandle::new(0, 14)).unwrap();
        assert_eq!(&contents.data[..], b"block contents");
        assert!(contents.cachable);
    }

    #[test]
    fn test_read_block_snappy() {
        let plain = b"snappy snappy snappy snappy snappy".repeat(8);
        let compressed = snap::raw::Encoder::new().compress_vec(&plain).unwrap();
        let raw = raw_block(&compressed, CompressionType::Snappy);
        let file = MemFile(Bytes::from(raw));

        let opts = ReadOptions::default();
        let contents = read_block(
            &file,
            &opts,
            &BlockHandle::new(0, compressed.len() as u64),
        )
        .unwrap();
        assert_eq!(&contents.data[..], &plain[..]);
    }

    #[test]
    fn test_read_block_checksum_mismatch() {
        let mut raw = raw_block(b"block contents", CompressionType::None);
        raw[3] ^= 0x01;
        let file = MemFile(Bytes::from(raw));

        let opts = ReadOptions {
            verify_checksums: true,
            fill_cache: true,
        };
        let err = read_block(&file, &opts, &BlockHandle::new(0, 14)).unwrap_err();
        assert_eq!(err, Error::corruption("block checksum mismatch"));

        // Without verification the flipped byte goes unnoticed
        let opts = ReadOptions::default();
        assert!(read_block(&file, &opts, &BlockHandle::new(0, 14)).is_ok());
    }

    #[test]
    fn test_read_block_bad_type() {
        let mut raw = b"contents".to_vec();
        raw.push(7); // not a known compression byte
        let crc = mask_crc(crc32c(&raw));
        raw.extend_from_slice(&crc.to_le_bytes());
        let file = MemFile(Bytes::from(raw));

        let err = read_block(&file, &ReadOptions::default(), &BlockHandle::new(0, 8)).unwrap_err();
        assert_eq!(err, Error::corruption("bad block type"));
    }

    #[test]
    fn test_read_block_truncated() {
        let raw = raw_block(b"block contents", CompressionType::None);
        let file = MemFile(Bytes::from(raw));

        // Handle size claims more data than the file has
        let err = read_block(&file, &ReadOptions::default(), &BlockHandle::new(0, 100)).unwrap_err();
        assert_eq!(err, Error::corruption("truncated block read"));
    }
}
