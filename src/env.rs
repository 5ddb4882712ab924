//! File system capability traits consumed by the WAL and SSTable layers.
//!
//! The format engine never touches `std::fs` directly; it reads and writes
//! through these traits so tests and alternative storage backends can swap
//! the implementation.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::Result;

/// A file read sequentially from the beginning.
pub trait SequentialFile: Send {
    /// Read up to `n` bytes. A short (or empty) result means end of file.
    fn read(&mut self, n: usize) -> Result<Bytes>;

    /// Skip `n` bytes ahead.
    fn skip(&mut self, n: u64) -> Result<()>;
}

/// A file read at arbitrary offsets.
///
/// Implementations must be safe for concurrent reads from multiple threads.
pub trait RandomAccessFile: Send + Sync {
    /// Read up to `n` bytes starting at `offset`. A short result means the
    /// range extends past end of file.
    fn read_at(&self, offset: u64, n: usize) -> Result<Bytes>;
}

/// An append-only file.
pub trait WritableFile: Send {
    /// Append data at the current end of file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Hand buffered data to the OS. Durability requires `sync`.
    fn flush(&mut self) -> Result<()>;

    /// Flush and force the data to stable storage.
    fn sync(&mut self) -> Result<()>;

    /// Flush and close the file.
    fn close(&mut self) -> Result<()>;
}

/// Buffer size for the std-fs implementations.
const FILE_BUFFER_SIZE: usize = 128 * 1024;

/// [`SequentialFile`] backed by a buffered `std::fs::File`.
pub struct FsSequentialFile {
    reader: BufReader<File>,
}

impl FsSequentialFile {
    /// Open an existing file for sequential reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::with_capacity(FILE_BUFFER_SIZE, file),
        })
    }
}

impl SequentialFile for FsSequentialFile {
    fn read(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let read = self.reader.read(&mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Current(n as i64))?;
        Ok(())
    }
}

/// [`RandomAccessFile`] backed by `std::fs::File`.
///
/// The file offset is shared process state, so reads are serialized by a
/// mutex to keep `read_at` safe from any number of threads.
pub struct FsRandomAccessFile {
    file: Mutex<File>,
}

impl FsRandomAccessFile {
    /// Open an existing file for random access.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Size of the underlying file in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Check whether the file is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl RandomAccessFile for FsRandomAccessFile {
    fn read_at(&self, offset: u64, n: usize) -> Result<Bytes> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let read = file.read(&mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }
}

/// [`WritableFile`] backed by a buffered `std::fs::File`.
pub struct FsWritableFile {
    writer: BufWriter<File>,
}

impl FsWritableFile {
    /// Create (or truncate) a file for appending.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(FILE_BUFFER_SIZE, file),
        })
    }

    /// Open an existing file for appending, returning the current length.
    pub fn open_for_append(path: &Path) -> Result<(Self, u64)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        Ok((
            Self {
                writer: BufWriter::with_capacity(FILE_BUFFER_SIZE, file),
            },
            len,
        ))
    }
}

impl WritableFile for FsWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
