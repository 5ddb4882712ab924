//! CRC32C (Castagnoli) checksum utilities.
//!
//! All on-disk checksums in the WAL and SSTable formats use the Castagnoli
//! polynomial, stored in masked form.

use crc::{Crc, Digest, CRC_32_ISCSI};

static CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

const MASK_DELTA: u32 = 0xa282ead8;

/// Compute the CRC32C checksum of the given data.
pub fn crc32c(data: &[u8]) -> u32 {
    CASTAGNOLI.checksum(data)
}

/// Compute the CRC32C checksum of multiple data slices.
pub fn crc32c_multi(slices: &[&[u8]]) -> u32 {
    let mut digest = CASTAGNOLI.digest();
    for slice in slices {
        digest.update(slice);
    }
    digest.finalize()
}

/// Mask a CRC value for storage.
///
/// This helps avoid problems with CRCs that happen to be stored alongside
/// data that itself contains embedded CRCs.
pub fn mask_crc(crc: u32) -> u32 {
    // Rotate right by 15 bits and add a constant.
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Unmask a masked CRC value.
pub fn unmask_crc(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

/// Verify that data matches an expected masked CRC.
pub fn verify_masked_crc(data: &[u8], masked: u32) -> bool {
    crc32c(data) == unmask_crc(masked)
}

/// Incremental CRC32C computation.
pub struct Crc32cHasher {
    digest: Digest<'static, u32>,
}

impl Crc32cHasher {
    /// Create a new hasher.
    pub fn new() -> Self {
        Self {
            digest: CASTAGNOLI.digest(),
        }
    }

    /// Update the CRC with more data.
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Finalize and get the CRC value.
    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Crc32cHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32c_empty() {
        assert_eq!(crc32c(&[]), 0);
    }

    #[test]
    fn test_crc32c_known_value() {
        // Standard CRC-32C check value.
        assert_eq!(crc32c(b"123456789"), 0xe3069283);
    }

    #[test]
    fn test_crc32c_different_data() {
        let crc1 = crc32c(b"hello");
        let crc2 = crc32c(b"world");
        assert_ne!(crc1, crc2);
    }

    #[test]
    fn test_crc32c_multi() {
        let crc1 = crc32c(b"hello world");
        let crc2 = crc32c_multi(&[b"hello ", b"world"]);
        assert_eq!(crc1, crc2);
    }

    #[test]
    fn test_mask_unmask() {
        let original = crc32c(b"foo");
        let masked = mask_crc(original);
        let unmasked = unmask_crc(masked);

        assert_ne!(masked, original);
        assert_eq!(unmasked, original);
    }

    #[test]
    fn test_mask_changes_value() {
        // Masking must not be the identity for CRCs of typical data.
        let crc = crc32c(b"some record payload");
        assert_ne!(mask_crc(crc), crc);
        assert_ne!(mask_crc(mask_crc(crc)), crc);
    }

    #[test]
    fn test_verify_masked_crc() {
        let data = b"test data";
        let masked = mask_crc(crc32c(data));

        assert!(verify_masked_crc(data, masked));
        assert!(!verify_masked_crc(data, masked.wrapping_add(1)));
        assert!(!verify_masked_crc(b"other data", masked));
    }

    #[test]
    fn test_hasher_matches_oneshot() {
        let mut hasher = Crc32cHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), crc32c(b"hello world"));
    }
}
