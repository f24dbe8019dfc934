//! Checksum algorithms for archive integrity.
//!
//! Digests protect individual sections of a V2 archive against corruption.
//! They are an integrity mechanism, not an authentication mechanism.

use sha2::{Digest, Sha256};

/// The checksum algorithm in force for an archive.
///
/// The wire encoding is a single byte; values outside the known set are
/// ignored by the options parser for forward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChecksumType {
    /// No digests are written or verified. All verifications succeed.
    None = 0,
    /// SHA-256, 32-byte digests.
    Sha256 = 1,
    /// XXH3 (64-bit), 8-byte big-endian digests.
    Xxh3 = 2,
}

impl ChecksumType {
    /// Decode a checksum byte. Only 0..=2 are recognized.
    pub fn from_u8(byte: u8) -> Option<ChecksumType> {
        match byte {
            0 => Some(ChecksumType::None),
            1 => Some(ChecksumType::Sha256),
            2 => Some(ChecksumType::Xxh3),
            _ => None,
        }
    }

    /// The natural digest size of the algorithm, in bytes.
    pub fn digest_size(self) -> usize {
        match self {
            ChecksumType::None => 0,
            ChecksumType::Sha256 => 32,
            ChecksumType::Xxh3 => 8,
        }
    }

    /// Compute the digest of `data`. Empty for [`ChecksumType::None`].
    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            ChecksumType::None => Vec::new(),
            ChecksumType::Sha256 => Sha256::digest(data).to_vec(),
            ChecksumType::Xxh3 => twox_hash::XxHash3_64::oneshot(data)
                .to_be_bytes()
                .to_vec(),
        }
    }

    /// Recompute the digest of `data` and compare it against `expected`.
    ///
    /// [`ChecksumType::None`] always verifies, including against a
    /// present-but-empty digest slice.
    pub fn verify(self, data: &[u8], expected: &[u8]) -> bool {
        match self {
            ChecksumType::None => true,
            _ => self.hash(data) == expected,
        }
    }
}

impl std::fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChecksumType::None => "none",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Xxh3 => "xxh3",
        };
        f.write_str(name)
    }
}
