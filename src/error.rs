//! Error types for parsing and serializing eszip archives.

/// Errors produced while parsing an archive, in either the V1 or V2 format.
///
/// Every failure mode of the metadata parse and the payload loading phase is
/// covered by a distinct variant so callers can react to (or report) the exact
/// location of a corruption.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid eszip v1 json: {0}")]
    InvalidV1Json(#[from] serde_json::Error),

    #[error("invalid eszip v1 version: {0}")]
    InvalidV1Version(u64),

    #[error("invalid eszip v2")]
    InvalidV2,

    #[error("invalid eszip v2 header: {0}")]
    InvalidV2Header(String),

    #[error("invalid eszip v2 header hash")]
    InvalidV2HeaderHash,

    #[error("invalid eszip v2.2 options header: {0}")]
    InvalidV22OptionsHeader(String),

    #[error("invalid eszip v2.2 options header hash")]
    InvalidV22OptionsHeaderHash,

    #[error("invalid eszip v2 entry kind {kind} at offset {offset}")]
    InvalidV2EntryKind { kind: u8, offset: usize },

    #[error("invalid eszip v2 module kind {kind} at offset {offset}")]
    InvalidV2ModuleKind { kind: u8, offset: usize },

    #[error("invalid eszip v2 source offset {0}")]
    InvalidV2SourceOffset(usize),

    #[error("invalid eszip v2 source hash for {0}")]
    InvalidV2SourceHash(String),

    #[error("operation canceled")]
    Canceled,
}

/// Errors produced while serializing an archive.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("serialization canceled")]
    Canceled,

    #[error("v1 serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{what} too large: {len} bytes")]
    TooLarge { what: String, len: usize },

    #[error("npm dependency {requirement:?} of {package} references unknown package {id}")]
    UnknownNpmDependency {
        package: String,
        requirement: String,
        id: String,
    },

    #[error("npm root package {requirement:?} references unknown package {id}")]
    UnknownNpmRoot { requirement: String, id: String },
}

impl WriteError {
    pub(crate) fn too_large(what: impl Into<String>, len: usize) -> Self {
        WriteError::TooLarge {
            what: what.into(),
            len,
        }
    }
}
