//! Log reader implementation.

use bytes::{Buf, Bytes};

use crate::env::SequentialFile;
use crate::util::crc::{crc32c, unmask_crc};
use crate::Error;

use super::{RecordType, BLOCK_SIZE, HEADER_SIZE};

/// Sink for corruption reports.
///
/// The reader does not stop at corrupted regions; it reports the number of
/// dropped bytes here and resumes at the next readable record. Recovery
/// paths typically log and continue, integrity checkers fail hard.
pub trait Reporter {
    /// Some bytes were dropped because of the given error.
    fn corruption(&mut self, bytes: usize, reason: &Error);
}

/// Outcome of reading one physical record.
enum Physical {
    /// A whole logical record in one fragment.
    Full(Bytes),
    /// The opening fragment of a logical record.
    First(Bytes),
    /// A continuation fragment.
    Middle(Bytes),
    /// The closing fragment.
    Last(Bytes),
    /// A record with a type byte outside the known range.
    Unknown(u8, Bytes),
    /// End of readable data.
    Eof,
    /// A skipped region (corruption, pre-allocated zeros, or data before
    /// the initial offset).
    Bad,
}

/// Log reader.
///
/// Reassembles logical records from physical fragments, verifying
/// checksums and reporting corrupted regions to the [`Reporter`]. A
/// truncated tail (writer died mid-record) reads as a clean end of file.
pub struct WalReader<S: SequentialFile> {
    /// Source file.
    file: S,
    /// Corruption sink.
    reporter: Option<Box<dyn Reporter>>,
    /// Whether to verify checksums.
    checksum: bool,
    /// Unparsed remainder of the current block.
    buffer: Bytes,
    /// Set once a short read tells us the file has no more blocks.
    eof: bool,
    /// Offset of the last returned logical record.
    last_record_offset: u64,
    /// File offset one past the end of `buffer`.
    end_of_buffer_offset: u64,
    /// Offset at which to start looking for the first record.
    initial_offset: u64,
    /// True while skipping fragments of a record that started before
    /// `initial_offset`.
    resyncing: bool,
}

impl<S: SequentialFile> WalReader<S> {
    /// Create a reader that starts at the beginning of the log with
    /// checksum verification on and no reporter.
    pub fn new(file: S) -> Self {
        Self::with_options(file, None, true, 0)
    }

    /// Create a reader with full control over reporting, checksum
    /// verification and the initial offset.
    pub fn with_options(
        file: S,
        reporter: Option<Box<dyn Reporter>>,
        checksum: bool,
        initial_offset: u64,
    ) -> Self {
        Self {
            file,
            reporter,
            checksum,
            buffer: Bytes::new(),
            eof: false,
            last_record_offset: 0,
            end_of_buffer_offset: 0,
            initial_offset,
            resyncing: initial_offset > 0,
        }
    }

    /// Offset of the start of the last record returned by `read_record`.
    pub fn last_record_offset(&self) -> u64 {
        self.last_record_offset
    }

    /// Read the next logical record.
    ///
    /// Returns `None` at end of file. Corrupted regions are reported and
    /// skipped rather than returned as errors.
    pub fn read_record(&mut self) -> Option<Bytes> {
        if self.last_record_offset < self.initial_offset && !self.skip_to_initial_block() {
            return None;
        }

        let mut scratch: Vec<u8> = Vec::new();
        let mut in_fragmented_record = false;
        // Offset of the logical record being assembled.
        let mut prospective_record_offset = 0u64;

        loop {
            let physical = self.read_physical_record();

            let fragment_len = match &physical {
                Physical::Full(data)
                | Physical::First(data)
                | Physical::Middle(data)
                | Physical::Last(data)
                | Physical::Unknown(_, data) => data.len(),
                _ => 0,
            };
            let physical_record_offset = self
                .end_of_buffer_offset
                .saturating_sub(self.buffer.len() as u64 + HEADER_SIZE as u64 + fragment_len as u64);

            if self.resyncing {
                match &physical {
                    Physical::Middle(_) => continue,
                    Physical::Last(_) => {
                        self.resyncing = false;
                        continue;
                    }
                    _ => self.resyncing = false,
                }
            }

            match physical {
                Physical::Full(fragment) => {
                    if in_fragmented_record && !scratch.is_empty() {
                        // Early writers could emit an empty FIRST record at
                        // the tail of a block followed by a FULL record.
                        self.report_corruption(scratch.len(), "partial record without end(1)");
                    }
                    self.last_record_offset = physical_record_offset;
                    return Some(fragment);
                }
                Physical::First(fragment) => {
                    if in_fragmented_record && !scratch.is_empty() {
                        self.report_corruption(scratch.len(), "partial record without end(2)");
                    }
                    prospective_record_offset = physical_record_offset;
                    scratch.clear();
                    scratch.extend_from_slice(&fragment);
                    in_fragmented_record = true;
                }
                Physical::Middle(fragment) => {
                    if !in_fragmented_record {
                        self.report_corruption(
                            fragment.len(),
                            "missing start of fragmented record(1)",
                        );
                    } else {
                        scratch.extend_from_slice(&fragment);
                    }
                }
                Physical::Last(fragment) => {
                    if !in_fragmented_record {
                        self.report_corruption(
                            fragment.len(),
                            "missing start of fragmented record(2)",
                        );
                    } else {
                        scratch.extend_from_slice(&fragment);
                        self.last_record_offset = prospective_record_offset;
                        return Some(Bytes::from(std::mem::take(&mut scratch)));
                    }
                }
                Physical::Eof => {
                    // A writer dying between fragments leaves a partial
                    // logical record; drop it without complaint.
                    return None;
                }
                Physical::Bad => {
                    if in_fragmented_record {
                        self.report_corruption(scratch.len(), "error in middle of record");
                        in_fragmented_record = false;
                        scratch.clear();
                    }
                }
                Physical::Unknown(type_byte, fragment) => {
                    let dropped = fragment.len()
                        + if in_fragmented_record {
                            scratch.len()
                        } else {
                            0
                        };
                    self.report_corruption(dropped, &format!("unknown record type {}", type_byte));
                    in_fragmented_record = false;
                    scratch.clear();
                }
            }
        }
    }

    /// Position the file at the first block that could hold a record
    /// starting at or after `initial_offset`.
    fn skip_to_initial_block(&mut self) -> bool {
        let offset_in_block = self.initial_offset % BLOCK_SIZE as u64;
        let mut block_start = self.initial_offset - offset_in_block;

        // An offset inside the 6-byte block trailer cannot be a record
        // start; begin at the next block.
        if offset_in_block > (BLOCK_SIZE - 6) as u64 {
            block_start += BLOCK_SIZE as u64;
        }

        self.end_of_buffer_offset = block_start;

        if block_start > 0 {
            if let Err(e) = self.file.skip(block_start) {
                self.report_drop(block_start, &e);
                return false;
            }
        }

        true
    }

    /// Read the next physical record out of the block buffer, refilling it
    /// from the file as needed.
    fn read_physical_record(&mut self) -> Physical {
        loop {
            if self.buffer.len() < HEADER_SIZE {
                if !self.eof {
                    // Last read was a full block; whatever is left is a
                    // trailer to skip.
                    self.buffer = Bytes::new();
                    match self.file.read(BLOCK_SIZE) {
                        Ok(data) => {
                            self.end_of_buffer_offset += data.len() as u64;
                            if data.len() < BLOCK_SIZE {
                                self.eof = true;
                            }
                            self.buffer = data;
                        }
                        Err(e) => {
                            self.report_read_failure(&e);
                            self.eof = true;
                            return Physical::Eof;
                        }
                    }
                    continue;
                } else {
                    // A non-empty buffer here is a header truncated by a
                    // writer crash; treat it as a clean end of file.
                    self.buffer = Bytes::new();
                    return Physical::Eof;
                }
            }

            let header = &self.buffer[..HEADER_SIZE];
            let length = u16::from_le_bytes([header[4], header[5]]) as usize;
            let type_byte = header[6];

            if HEADER_SIZE + length > self.buffer.len() {
                let drop_size = self.buffer.len();
                self.buffer = Bytes::new();
                if !self.eof {
                    self.report_corruption(drop_size, "bad record length");
                    return Physical::Bad;
                }
                // The writer died before finishing the payload; not a
                // corruption.
                return Physical::Eof;
            }

            if type_byte == RecordType::Zero.to_byte() && length == 0 {
                // Zero-filled pre-allocated region; skip without reporting.
                self.buffer = Bytes::new();
                return Physical::Bad;
            }

            if self.checksum {
                let expected = unmask_crc(u32::from_le_bytes([
                    header[0], header[1], header[2], header[3],
                ]));
                let actual = crc32c(&self.buffer[6..HEADER_SIZE + length]);
                if actual != expected {
                    // The length field itself may be corrupt; trusting it
                    // could resynchronize onto garbage that happens to look
                    // like a record, so drop the whole remainder.
                    let drop_size = self.buffer.len();
                    self.buffer = Bytes::new();
                    self.report_corruption(drop_size, "checksum mismatch");
                    return Physical::Bad;
                }
            }

            let fragment = self.buffer.slice(HEADER_SIZE..HEADER_SIZE + length);
            self.buffer.advance(HEADER_SIZE + length);

            // Skip physical records that started before initial_offset.
            if self
                .end_of_buffer_offset
                .saturating_sub(self.buffer.len() as u64 + HEADER_SIZE as u64 + length as u64)
                < self.initial_offset
            {
                return Physical::Bad;
            }

            return match RecordType::from_byte(type_byte) {
                Some(RecordType::Full) => Physical::Full(fragment),
                Some(RecordType::First) => Physical::First(fragment),
                Some(RecordType::Middle) => Physical::Middle(fragment),
                Some(RecordType::Last) => Physical::Last(fragment),
                // A zero type with a payload was not written by any known
                // writer; classify it with the other unknown types.
                Some(RecordType::Zero) | None => Physical::Unknown(type_byte, fragment),
            };
        }
    }

    fn report_corruption(&mut self, bytes: usize, reason: &str) {
        let err = Error::corruption(reason);
        self.report_drop(bytes as u64, &err);
    }

    /// Report dropped bytes, unless the dropped region lies entirely
    /// before the initial offset.
    fn report_drop(&mut self, bytes: u64, reason: &Error) {
        if let Some(reporter) = self.reporter.as_mut() {
            if self
                .end_of_buffer_offset
                .saturating_sub(self.buffer.len() as u64)
                .saturating_sub(bytes)
                >= self.initial_offset
            {
                reporter.corruption(bytes as usize, reason);
            }
        }
    }

    /// A failed block read has no usable file position, so it is reported
    /// regardless of the initial offset.
    fn report_read_failure(&mut self, reason: &Error) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.corruption(BLOCK_SIZE, reason);
        }
    }
}
