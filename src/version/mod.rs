//! Manifest record format: [`VersionEdit`] deltas and the file metadata
//! they carry.
//!
//! Only the serialization lives here; applying edits to a version set is
//! the concern of a higher layer.

mod file_metadata;
mod version_edit;

pub use file_metadata::FileMetadata;
pub use version_edit::VersionEdit;

/// Maximum number of levels in the tree.
pub const MAX_LEVELS: usize = 7;

/// Tag values for encoding VersionEdit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EditTag {
    /// Comparator name.
    Comparator = 1,
    /// Log number.
    LogNumber = 2,
    /// Next file number.
    NextFileNumber = 3,
    /// Last sequence number.
    LastSequence = 4,
    /// Compaction pointer for a level.
    CompactPointer = 5,
    /// Deleted file (level, file_number).
    DeletedFile = 6,
    /// New file (level, file_number, size, smallest, largest).
    NewFile = 7,
    /// Previous log number (no longer written, kept for compatibility).
    PrevLogNumber = 9,
}

impl EditTag {
    /// Create from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(EditTag::Comparator),
            2 => Some(EditTag::LogNumber),
            3 => Some(EditTag::NextFileNumber),
            4 => Some(EditTag::LastSequence),
            5 => Some(EditTag::CompactPointer),
            6 => Some(EditTag::DeletedFile),
            7 => Some(EditTag::NewFile),
            9 => Some(EditTag::PrevLogNumber),
            _ => None,
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}
