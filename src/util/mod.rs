//! Internal utilities: encodings, checksums, comparators.

pub mod coding;
pub mod comparator;
pub mod crc;
