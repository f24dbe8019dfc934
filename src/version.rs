//! Archive versions, magic bytes and the per-archive options.

use crate::checksum::ChecksumType;

/// Magic bytes for the original V2 format.
pub const MAGIC_V2: [u8; 8] = *b"ESZIP_V2";
/// Magic bytes for V2.1, which added the npm snapshot sections.
pub const MAGIC_V2_1: [u8; 8] = *b"ESZIP2.1";
/// Magic bytes for V2.2, which added the options header.
pub const MAGIC_V2_2: [u8; 8] = *b"ESZIP2.2";
/// Magic bytes for V2.3, which added the Wasm module kind.
pub const MAGIC_V2_3: [u8; 8] = *b"ESZIP2.3";

/// A V2 archive format version.
///
/// Later versions are strict supersets of earlier ones; capability checks go
/// through [`Version::supports_npm`] and [`Version::supports_options`] rather
/// than direct comparisons at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    V2,
    V2_1,
    V2_2,
    V2_3,
}

impl Version {
    /// The newest version this crate writes. New archives start here.
    pub const LATEST: Version = Version::V2_3;

    /// Map leading magic bytes to a version. `None` for anything that is not
    /// exactly one of the known 8-byte magics.
    pub fn from_magic(magic: &[u8]) -> Option<Version> {
        match magic {
            m if m == MAGIC_V2 => Some(Version::V2),
            m if m == MAGIC_V2_1 => Some(Version::V2_1),
            m if m == MAGIC_V2_2 => Some(Version::V2_2),
            m if m == MAGIC_V2_3 => Some(Version::V2_3),
            _ => None,
        }
    }

    /// The magic bytes written for this version.
    pub fn to_magic(self) -> [u8; 8] {
        match self {
            Version::V2 => MAGIC_V2,
            Version::V2_1 => MAGIC_V2_1,
            Version::V2_2 => MAGIC_V2_2,
            Version::V2_3 => MAGIC_V2_3,
        }
    }

    /// Whether the format carries npm specifier entries and an npm section.
    pub fn supports_npm(self) -> bool {
        self >= Version::V2_1
    }

    /// Whether the format carries an options header before the modules header.
    pub fn supports_options(self) -> bool {
        self >= Version::V2_2
    }
}

/// Whether `data` begins with any known V2 magic.
pub fn has_magic(data: &[u8]) -> bool {
    data.len() >= 8 && Version::from_magic(&data[..8]).is_some()
}

/// Per-archive options, declared by the V2.2+ options header.
///
/// For V2.0/V2.1 archives the options are fixed at their historical defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub checksum: ChecksumType,
    /// Digest size override. `None` means the algorithm's natural size.
    pub checksum_size: Option<u8>,
}

impl Options {
    /// The defaults in force when no options header overrides them.
    ///
    /// V2.0 and V2.1 predate the options header and always used SHA-256;
    /// V2.2+ default to no checksum.
    pub fn default_for_version(version: Version) -> Options {
        let checksum = if version.supports_options() {
            ChecksumType::None
        } else {
            ChecksumType::Sha256
        };
        Options {
            checksum,
            checksum_size: None,
        }
    }

    /// The digest size in force for every section of the archive.
    pub fn digest_size(self) -> usize {
        match self.checksum_size {
            Some(size) => usize::from(size),
            None => self.checksum.digest_size(),
        }
    }
}
