//! Log writer implementation.

use crate::env::WritableFile;
use crate::util::crc::{mask_crc, Crc32cHasher};
use crate::Result;

use super::{RecordType, BLOCK_SIZE, HEADER_SIZE};

/// Log writer.
///
/// Frames each logical record into one or more physical records that
/// respect the 32KB block boundaries, and hands the bytes to the
/// destination file after every record.
pub struct WalWriter<W: WritableFile> {
    /// Destination append-only file.
    dest: W,
    /// Current position within the current block.
    block_offset: usize,
}

impl<W: WritableFile> WalWriter<W> {
    /// Create a writer that starts at the beginning of an empty file.
    pub fn new(dest: W) -> Self {
        Self {
            dest,
            block_offset: 0,
        }
    }

    /// Create a writer appending to a file that already has `dest_length`
    /// bytes, resuming mid-block.
    pub fn with_initial_length(dest: W, dest_length: u64) -> Self {
        Self {
            dest,
            block_offset: (dest_length % BLOCK_SIZE as u64) as usize,
        }
    }

    /// Append a logical record to the log.
    ///
    /// The record is fragmented if it does not fit in the current block.
    /// An empty record still emits a single zero-length FULL fragment.
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data.len();
        let mut ptr = 0;
        let mut begin = true;

        loop {
            let leftover = BLOCK_SIZE - self.block_offset;

            // Too small for a header: zero-fill the tail and start a new
            // block.
            if leftover < HEADER_SIZE {
                if leftover > 0 {
                    self.dest.append(&[0u8; HEADER_SIZE - 1][..leftover])?;
                }
                self.block_offset = 0;
            }

            // Invariant: we never leave < HEADER_SIZE bytes in a block.
            debug_assert!(BLOCK_SIZE - self.block_offset >= HEADER_SIZE);

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = std::cmp::min(left, avail);
            let end = left == fragment_length;

            let record_type = match (begin, end) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            self.emit_physical_record(record_type, &data[ptr..ptr + fragment_length])?;

            ptr += fragment_length;
            left -= fragment_length;
            begin = false;

            if left == 0 {
                break;
            }
        }

        Ok(())
    }

    /// Force the log contents to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.dest.sync()
    }

    /// Write a physical record (header + payload) and flush it.
    fn emit_physical_record(&mut self, record_type: RecordType, data: &[u8]) -> Result<()> {
        debug_assert!(data.len() <= 0xFFFF); // Length fits in 2 bytes
        debug_assert!(self.block_offset + HEADER_SIZE + data.len() <= BLOCK_SIZE);

        // The stored CRC covers the type byte and the payload.
        let mut hasher = Crc32cHasher::new();
        hasher.update(&[record_type.to_byte()]);
        hasher.update(data);
        let crc = mask_crc(hasher.finalize());

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&crc.to_le_bytes());
        header[4..6].copy_from_slice(&(data.len() as u16).to_le_bytes());
        header[6] = record_type.to_byte();

        self.dest.append(&header)?;
        self.dest.append(data)?;
        self.dest.flush()?;

        self.block_offset += HEADER_SIZE + data.len();
        Ok(())
    }
}
