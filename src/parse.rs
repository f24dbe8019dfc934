//! Sans-IO parsing primitives for the V2 binary layout.
//!
//! These functions work on byte slices without any I/O traits; the async
//! reader feeds them section contents it has already framed. All multi-byte
//! integers on the wire are big-endian.

use std::collections::HashMap;

use crate::checksum::ChecksumType;
use crate::error::ParseError;
use crate::map::ModuleMap;
use crate::module::{EszipEntry, ModuleData, ModuleKind, ModuleRedirect};
use crate::slot::SourceSlot;

/// Upper bound on any section, content length or payload offset (256 MiB).
/// Bounds memory allocation for malformed or malicious archives.
pub(crate) const MAX_SECTION_SIZE: usize = 256 << 20;

// ============================================================================
// PRIMITIVE PARSERS
// ============================================================================

/// Parse a big-endian u32, reporting `what` on truncation.
pub(crate) fn parse_u32_be(data: &[u8], what: &str) -> Result<(u32, usize), ParseError> {
    if data.len() < 4 {
        return Err(ParseError::InvalidV2Header(what.to_string()));
    }
    let bytes: [u8; 4] = data[..4].try_into().unwrap();
    Ok((u32::from_be_bytes(bytes), 4))
}

/// Parse a single byte, reporting `what` on truncation.
pub(crate) fn parse_u8(data: &[u8], what: &str) -> Result<(u8, usize), ParseError> {
    if data.is_empty() {
        return Err(ParseError::InvalidV2Header(what.to_string()));
    }
    Ok((data[0], 1))
}

/// Parse a u32-length-prefixed UTF-8 string, reporting `what` on truncation
/// or invalid encoding.
pub(crate) fn parse_str<'a>(
    data: &'a [u8],
    what: &str,
) -> Result<(&'a str, usize), ParseError> {
    let (len, prefix) = parse_u32_be(data, what)?;
    let len = len as usize;
    if data.len() - prefix < len {
        return Err(ParseError::InvalidV2Header(what.to_string()));
    }
    let s = std::str::from_utf8(&data[prefix..prefix + len])
        .map_err(|_| ParseError::InvalidV2Header(format!("{what} utf-8")))?;
    Ok((s, prefix + len))
}

// ============================================================================
// SECTION CARRIER
// ============================================================================

/// A framed section: content plus the digest that followed it on the wire.
pub(crate) struct Section {
    content: Vec<u8>,
    digest: Vec<u8>,
    checksum: ChecksumType,
}

impl Section {
    pub(crate) fn new(content: Vec<u8>, digest: Vec<u8>, checksum: ChecksumType) -> Section {
        Section {
            content,
            digest,
            checksum,
        }
    }

    pub(crate) fn content(&self) -> &[u8] {
        &self.content
    }

    pub(crate) fn content_len(&self) -> usize {
        self.content.len()
    }

    /// Content plus digest, the number of wire bytes the section occupied
    /// past its length prefix.
    pub(crate) fn total_len(&self) -> usize {
        self.content.len() + self.digest.len()
    }

    /// Recompute and compare the digest. Always true when the archive runs
    /// without checksums (the digest is then empty by construction).
    pub(crate) fn is_checksum_valid(&self) -> bool {
        self.checksum.verify(&self.content, &self.digest)
    }

    pub(crate) fn into_content(self) -> Vec<u8> {
        self.content
    }
}

// ============================================================================
// MODULES HEADER
// ============================================================================

/// Result of parsing the modules header: the module table plus the npm
/// specifier side table (specifier → package index). Npm specifier frames do
/// not become module-map entries; they are joined with the npm section later.
#[derive(Debug)]
pub(crate) struct ModulesHeader {
    pub(crate) modules: ModuleMap,
    pub(crate) npm_specifiers: HashMap<String, u32>,
}

/// Parse the modules header content as a sequence of entry frames until the
/// content is exhausted.
pub(crate) fn parse_modules_header(
    content: &[u8],
    supports_npm: bool,
) -> Result<ModulesHeader, ParseError> {
    let mut modules = ModuleMap::new();
    let mut npm_specifiers = HashMap::new();

    let mut read = 0;
    while read < content.len() {
        let (specifier, consumed) = parse_str(&content[read..], "specifier")?;
        let specifier = specifier.to_string();
        read += consumed;

        let (entry_kind, consumed) = parse_u8(&content[read..], "entry kind")?;
        read += consumed;

        match entry_kind {
            0 => {
                let (source_offset, n) = parse_u32_be(&content[read..], "module data")?;
                read += n;
                let (source_len, n) = parse_u32_be(&content[read..], "module data")?;
                read += n;
                let (source_map_offset, n) = parse_u32_be(&content[read..], "module data")?;
                read += n;
                let (source_map_len, n) = parse_u32_be(&content[read..], "module data")?;
                read += n;
                let (kind_byte, n) = parse_u8(&content[read..], "module data")?;
                read += n;

                let kind = ModuleKind::from_u8(kind_byte).ok_or(
                    ParseError::InvalidV2ModuleKind {
                        kind: kind_byte,
                        offset: read,
                    },
                )?;

                modules.insert(
                    specifier,
                    EszipEntry::Module(ModuleData {
                        kind,
                        source: SourceSlot::pending_or_empty(source_offset, source_len),
                        source_map: SourceSlot::pending_or_empty(
                            source_map_offset,
                            source_map_len,
                        ),
                    }),
                );
            }
            1 => {
                let (target, consumed) = parse_str(&content[read..], "target")?;
                let target = target.to_string();
                read += consumed;

                modules.insert(specifier, EszipEntry::Redirect(ModuleRedirect { target }));
            }
            2 => {
                if !supports_npm {
                    return Err(ParseError::InvalidV2EntryKind {
                        kind: entry_kind,
                        offset: read,
                    });
                }

                let (package_index, consumed) =
                    parse_u32_be(&content[read..], "npm package id")?;
                read += consumed;

                npm_specifiers.insert(specifier, package_index);
            }
            _ => {
                return Err(ParseError::InvalidV2EntryKind {
                    kind: entry_kind,
                    offset: read,
                });
            }
        }
    }

    Ok(ModulesHeader {
        modules,
        npm_specifiers,
    })
}
