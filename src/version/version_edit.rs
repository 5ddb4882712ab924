//! VersionEdit: the serialized delta between two versions.
//!
//! Edits are tagged field sequences; fields may appear in any order and
//! every field is optional. Unknown tags are a decode error.

use std::collections::BTreeSet;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::types::InternalKey;
use crate::util::coding::{
    decode_length_prefixed, decode_varint32, decode_varint64, encode_length_prefixed,
    encode_varint32, encode_varint64,
};
use crate::{Error, Result};

use super::{EditTag, FileMetadata, MAX_LEVELS};

/// A set of changes to the file layout, persisted in the manifest log.
#[derive(Debug, Clone, Default)]
pub struct VersionEdit {
    /// Comparator name, recorded once per database.
    pub comparator: Option<String>,
    /// Current log file number.
    pub log_number: Option<u64>,
    /// Previous log number (legacy field).
    pub prev_log_number: Option<u64>,
    /// Next file number to allocate.
    pub next_file_number: Option<u64>,
    /// Last sequence number used.
    pub last_sequence: Option<u64>,
    /// Where compaction should resume, per level.
    pub compact_pointers: Vec<(u32, InternalKey)>,
    /// Files removed: (level, file_number).
    pub deleted_files: BTreeSet<(u32, u64)>,
    /// Files added: (level, metadata).
    pub new_files: Vec<(u32, FileMetadata)>,
}

impl VersionEdit {
    /// Create a new empty edit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comparator name.
    pub fn set_comparator(&mut self, name: impl Into<String>) {
        self.comparator = Some(name.into());
    }

    /// Set the log number.
    pub fn set_log_number(&mut self, num: u64) {
        self.log_number = Some(num);
    }

    /// Set the previous log number.
    pub fn set_prev_log_number(&mut self, num: u64) {
        self.prev_log_number = Some(num);
    }

    /// Set the next file number.
    pub fn set_next_file_number(&mut self, num: u64) {
        self.next_file_number = Some(num);
    }

    /// Set the last sequence number.
    pub fn set_last_sequence(&mut self, seq: u64) {
        self.last_sequence = Some(seq);
    }

    /// Record where compaction should resume on a level.
    pub fn set_compact_pointer(&mut self, level: u32, key: InternalKey) {
        self.compact_pointers.push((level, key));
    }

    /// Record a file removal.
    pub fn remove_file(&mut self, level: u32, file_number: u64) {
        self.deleted_files.insert((level, file_number));
    }

    /// Record a file addition.
    pub fn add_file(
        &mut self,
        level: u32,
        number: u64,
        file_size: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) {
        self.new_files
            .push((level, FileMetadata::new(number, file_size, smallest, largest)));
    }

    /// Check if the edit records no changes.
    pub fn is_empty(&self) -> bool {
        self.comparator.is_none()
            && self.log_number.is_none()
            && self.prev_log_number.is_none()
            && self.next_file_number.is_none()
            && self.last_sequence.is_none()
            && self.compact_pointers.is_empty()
            && self.deleted_files.is_empty()
            && self.new_files.is_empty()
    }

    /// Serialize the edit.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);

        if let Some(name) = &self.comparator {
            buf.put_u8(EditTag::Comparator.to_byte());
            encode_length_prefixed(&mut buf, name.as_bytes());
        }
        if let Some(num) = self.log_number {
            buf.put_u8(EditTag::LogNumber.to_byte());
            encode_varint64(&mut buf, num);
        }
        if let Some(num) = self.prev_log_number {
            buf.put_u8(EditTag::PrevLogNumber.to_byte());
            encode_varint64(&mut buf, num);
        }
        if let Some(num) = self.next_file_number {
            buf.put_u8(EditTag::NextFileNumber.to_byte());
            encode_varint64(&mut buf, num);
        }
        if let Some(seq) = self.last_sequence {
            buf.put_u8(EditTag::LastSequence.to_byte());
            encode_varint64(&mut buf, seq);
        }

        for (level, key) in &self.compact_pointers {
            buf.put_u8(EditTag::CompactPointer.to_byte());
            encode_varint32(&mut buf, *level);
            encode_length_prefixed(&mut buf, &key.encode());
        }

        for &(level, file_number) in &self.deleted_files {
            buf.put_u8(EditTag::DeletedFile.to_byte());
            encode_varint32(&mut buf, level);
            encode_varint64(&mut buf, file_number);
        }

        for (level, file) in &self.new_files {
            buf.put_u8(EditTag::NewFile.to_byte());
            encode_varint32(&mut buf, *level);
            encode_varint64(&mut buf, file.number());
            encode_varint64(&mut buf, file.file_size());
            encode_length_prefixed(&mut buf, &file.smallest().encode());
            encode_length_prefixed(&mut buf, &file.largest().encode());
        }

        buf.freeze()
    }

    /// Deserialize an edit.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut edit = VersionEdit::new();
        let mut cursor = data;

        while !cursor.is_empty() {
            let tag_byte = cursor.get_u8();
            let tag = EditTag::from_byte(tag_byte)
                .ok_or_else(|| Error::corruption(format!("unknown edit tag: {}", tag_byte)))?;

            match tag {
                EditTag::Comparator => {
                    let name = decode_length_prefixed(&mut cursor)
                        .ok_or_else(|| Error::corruption("truncated comparator name"))?;
                    edit.comparator = Some(
                        String::from_utf8(name.to_vec())
                            .map_err(|_| Error::corruption("invalid comparator name"))?,
                    );
                }
                EditTag::LogNumber => {
                    edit.log_number = Some(decode_edit_varint64(&mut cursor)?);
                }
                EditTag::PrevLogNumber => {
                    edit.prev_log_number = Some(decode_edit_varint64(&mut cursor)?);
                }
                EditTag::NextFileNumber => {
                    edit.next_file_number = Some(decode_edit_varint64(&mut cursor)?);
                }
                EditTag::LastSequence => {
                    edit.last_sequence = Some(decode_edit_varint64(&mut cursor)?);
                }
                EditTag::CompactPointer => {
                    let level = decode_level(&mut cursor)?;
                    let key = decode_internal_key(&mut cursor)?;
                    edit.compact_pointers.push((level, key));
                }
                EditTag::DeletedFile => {
                    let level = decode_level(&mut cursor)?;
                    let file_number = decode_edit_varint64(&mut cursor)?;
                    edit.deleted_files.insert((level, file_number));
                }
                EditTag::NewFile => {
                    let level = decode_level(&mut cursor)?;
                    let number = decode_edit_varint64(&mut cursor)?;
                    let file_size = decode_edit_varint64(&mut cursor)?;
                    let smallest = decode_internal_key(&mut cursor)?;
                    let largest = decode_internal_key(&mut cursor)?;
                    edit.new_files
                        .push((level, FileMetadata::new(number, file_size, smallest, largest)));
                }
            }
        }

        Ok(edit)
    }
}

fn decode_edit_varint64(cursor: &mut &[u8]) -> Result<u64> {
    decode_varint64(cursor).ok_or_else(|| Error::corruption("truncated varint in edit"))
}

fn decode_level(cursor: &mut &[u8]) -> Result<u32> {
    let level =
        decode_varint32(cursor).ok_or_else(|| Error::corruption("truncated level in edit"))?;
    if level as usize >= MAX_LEVELS {
        return Err(Error::corruption("level out of range in edit"));
    }
    Ok(level)
}

fn decode_internal_key(cursor: &mut &[u8]) -> Result<InternalKey> {
    let raw = decode_length_prefixed(cursor)
        .ok_or_else(|| Error::corruption("truncated key in edit"))?;
    InternalKey::decode(&raw).ok_or_else(|| Error::corruption("invalid internal key in edit"))
}
