//! Streaming parser for V2 archives.
//!
//! Parsing is split in two phases. [`EszipV2::parse`] consumes the magic,
//! options header, modules header and npm section, returning a fully
//! metadata-visible archive plus a [`SourceLoader`]. The loader then consumes
//! the payload sections, resolving each module's source slots as its bytes
//! arrive. Waiters blocked on a slot are released the moment that slot's
//! payload is verified, not when the whole archive finishes loading.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use super::EszipV2;
use crate::checksum::ChecksumType;
use crate::error::ParseError;
use crate::map::ModuleMap;
use crate::npm::NpmResolutionSnapshot;
use crate::parse::{parse_modules_header, ModulesHeader, Section, MAX_SECTION_SIZE};
use crate::slot::{SlotState, SourceSlot};
use crate::version::{Options, Version};

pub(crate) async fn read_u32_be<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32, ParseError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

/// Read a `length || content || digest` section under the given options.
async fn read_section<R: AsyncRead + Unpin>(
    reader: &mut R,
    options: Options,
) -> Result<Section, ParseError> {
    let length = read_u32_be(reader).await? as usize;
    if length > MAX_SECTION_SIZE {
        return Err(ParseError::InvalidV2Header(format!(
            "section too large: {length} bytes"
        )));
    }
    read_section_with_size(reader, options, length).await
}

/// Read a section whose content length is already known from metadata
/// (payload entries carry no per-entry length prefix on the wire).
async fn read_section_with_size<R: AsyncRead + Unpin>(
    reader: &mut R,
    options: Options,
    content_len: usize,
) -> Result<Section, ParseError> {
    if content_len > MAX_SECTION_SIZE {
        return Err(ParseError::InvalidV2Header(format!(
            "section too large: {content_len} bytes"
        )));
    }

    let mut content = vec![0u8; content_len];
    reader.read_exact(&mut content).await?;

    let digest_size = options.digest_size();
    let mut digest = vec![0u8; digest_size];
    if digest_size > 0 {
        reader.read_exact(&mut digest).await?;
    }

    Ok(Section::new(content, digest, options.checksum))
}

/// Parse the V2.2+ options header, starting from the version defaults.
///
/// The section itself is read without a digest; whether one follows (and how
/// long it is) depends on the options the content declares.
async fn parse_options_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    defaults: Options,
) -> Result<Options, ParseError> {
    let unchecked = Options {
        checksum: ChecksumType::None,
        checksum_size: None,
    };
    let section = read_section(reader, unchecked).await?;
    let content = section.content();

    if content.len() % 2 != 0 {
        return Err(ParseError::InvalidV22OptionsHeader(
            "options are expected to be byte tuples".to_string(),
        ));
    }

    let mut options = defaults;
    for pair in content.chunks_exact(2) {
        match pair[0] {
            0 => {
                // Unknown checksum values are ignored for forward
                // compatibility.
                if let Some(checksum) = ChecksumType::from_u8(pair[1]) {
                    options.checksum = checksum;
                }
            }
            1 => {
                options.checksum_size = (pair[1] != 0).then_some(pair[1]);
            }
            option => {
                tracing::trace!(option, "ignoring unknown archive option");
            }
        }
    }

    if options.digest_size() == 0 && options.checksum != ChecksumType::None {
        return Err(ParseError::InvalidV22OptionsHeader(
            "checksum size must be known".to_string(),
        ));
    }

    let digest_size = options.digest_size();
    if digest_size > 0 {
        let mut digest = vec![0u8; digest_size];
        reader.read_exact(&mut digest).await?;
        if !options.checksum.verify(content, &digest) {
            return Err(ParseError::InvalidV22OptionsHeaderHash);
        }
    }

    Ok(options)
}

#[derive(Debug)]
struct OffsetEntry {
    length: usize,
    specifier: String,
}

/// Record a pending slot in the offset index for its payload section.
fn index_slot(
    index: &mut HashMap<usize, OffsetEntry>,
    specifier: &str,
    slot: &SourceSlot,
    what: &str,
) -> Result<(), ParseError> {
    if slot.state() != SlotState::Pending || slot.length() == 0 {
        return Ok(());
    }

    let offset = slot.offset() as usize;
    let length = slot.length() as usize;
    if offset > MAX_SECTION_SIZE || length > MAX_SECTION_SIZE {
        return Err(ParseError::InvalidV2Header(format!(
            "{what} offset/length out of range for {specifier}"
        )));
    }

    if let Some(existing) = index.get(&offset) {
        return Err(ParseError::InvalidV2Header(format!(
            "duplicate {what} offset {offset} ({} and {specifier})",
            existing.specifier
        )));
    }

    index.insert(
        offset,
        OffsetEntry {
            length,
            specifier: specifier.to_string(),
        },
    );
    Ok(())
}

impl EszipV2 {
    /// Parse a V2 archive from a reader.
    ///
    /// Returns as soon as the metadata sections are consumed; module
    /// structure, kinds and redirect targets are observable immediately. The
    /// returned [`SourceLoader`] must be driven (inline or on a background
    /// task) to populate module sources.
    pub async fn parse<R: AsyncRead + Unpin>(
        mut reader: R,
    ) -> Result<(EszipV2, SourceLoader<R>), ParseError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).await?;
        let version = Version::from_magic(&magic).ok_or(ParseError::InvalidV2)?;
        EszipV2::parse_with_version(version, reader).await
    }

    /// Parse a V2 archive and load all payloads before returning.
    pub async fn parse_fully<R: AsyncRead + Unpin>(
        token: &CancellationToken,
        reader: R,
    ) -> Result<EszipV2, ParseError> {
        let (archive, loader) = EszipV2::parse(reader).await?;
        loader.load(token).await?;
        Ok(archive)
    }

    pub(crate) async fn parse_with_version<R: AsyncRead + Unpin>(
        version: Version,
        mut reader: R,
    ) -> Result<(EszipV2, SourceLoader<R>), ParseError> {
        let mut options = Options::default_for_version(version);
        if version.supports_options() {
            options = parse_options_header(&mut reader, options).await?;
            tracing::debug!(checksum = %options.checksum, "parsed archive options");
        }

        let header = read_section(&mut reader, options).await?;
        if !header.is_checksum_valid() {
            return Err(ParseError::InvalidV2HeaderHash);
        }

        let ModulesHeader {
            modules,
            npm_specifiers,
        } = parse_modules_header(header.content(), version.supports_npm())?;
        tracing::trace!(
            entries = modules.len(),
            npm_specifiers = npm_specifiers.len(),
            "parsed modules header"
        );

        let npm_snapshot = if version.supports_npm() {
            let section = read_section(&mut reader, options).await?;
            if !section.is_checksum_valid() {
                return Err(ParseError::InvalidV2HeaderHash);
            }
            NpmResolutionSnapshot::from_section(section.content(), &npm_specifiers)?
        } else {
            None
        };

        let mut sources = HashMap::new();
        let mut source_maps = HashMap::new();
        for (specifier, entry) in modules.iter() {
            let Some(data) = entry.as_module() else {
                continue;
            };
            index_slot(&mut sources, specifier, &data.source, "source")?;
            index_slot(&mut source_maps, specifier, &data.source_map, "source map")?;
        }

        let archive = EszipV2::from_parts(modules, version, options, npm_snapshot);
        let loader = SourceLoader {
            inner: Some(LoaderInner {
                reader,
                options,
                sources,
                source_maps,
                guard: PendingSlotGuard {
                    modules: archive.modules_handle(),
                },
            }),
        };

        Ok((archive, loader))
    }
}

/// Resolves every still-pending slot to ready-with-nothing when dropped.
///
/// This is the backstop that keeps waiters from blocking forever when the
/// payload phase fails, is cancelled, or is abandoned without running.
struct PendingSlotGuard {
    modules: Arc<Mutex<ModuleMap>>,
}

impl PendingSlotGuard {
    fn resolve_pending_slots(&self) {
        let modules = self.modules.lock();
        for (_, entry) in modules.iter() {
            let Some(data) = entry.as_module() else {
                continue;
            };
            data.source.set_ready(None);
            data.source_map.set_ready(None);
        }
    }
}

impl Drop for PendingSlotGuard {
    fn drop(&mut self) {
        self.resolve_pending_slots();
    }
}

/// The deferred payload-loading half of a streaming parse.
///
/// Driving [`SourceLoader::load`] reads the sources and source-maps sections
/// and resolves the archive's slots in offset order. Dropping the loader
/// without (or before finishing) a load resolves all remaining slots to
/// ready-with-nothing instead of stranding waiters.
pub struct SourceLoader<R> {
    inner: Option<LoaderInner<R>>,
}

struct LoaderInner<R> {
    reader: R,
    options: Options,
    sources: HashMap<usize, OffsetEntry>,
    source_maps: HashMap<usize, OffsetEntry>,
    guard: PendingSlotGuard,
}

impl<R> SourceLoader<R> {
    /// A loader with nothing to do (V1 archives have no payload phase).
    pub(crate) fn noop() -> SourceLoader<R> {
        SourceLoader { inner: None }
    }
}

impl<R: AsyncRead + Unpin> SourceLoader<R> {
    /// Load all payload sections, verifying each entry's digest and
    /// resolving its slot.
    ///
    /// Cancellation is observed at each payload entry boundary. Whatever the
    /// outcome, no slot in the archive is left pending afterwards.
    pub async fn load(self, token: &CancellationToken) -> Result<(), ParseError> {
        let Some(mut inner) = self.inner else {
            return Ok(());
        };

        let sources = std::mem::take(&mut inner.sources);
        inner.load_payload_section(token, &sources, false).await?;

        let source_maps = std::mem::take(&mut inner.source_maps);
        inner
            .load_payload_section(token, &source_maps, true)
            .await?;

        Ok(())
    }
}

impl<R: AsyncRead + Unpin> LoaderInner<R> {
    async fn load_payload_section(
        &mut self,
        token: &CancellationToken,
        offsets: &HashMap<usize, OffsetEntry>,
        is_source_map: bool,
    ) -> Result<(), ParseError> {
        let total_len = read_u32_be(&mut self.reader).await? as usize;
        if total_len > MAX_SECTION_SIZE {
            return Err(ParseError::InvalidV2Header(format!(
                "source section too large: {total_len} bytes"
            )));
        }

        let mut read = 0;
        while read < total_len {
            if token.is_cancelled() {
                return Err(ParseError::Canceled);
            }

            let entry = offsets
                .get(&read)
                .ok_or(ParseError::InvalidV2SourceOffset(read))?;

            let section =
                read_section_with_size(&mut self.reader, self.options, entry.length).await?;
            if !section.is_checksum_valid() {
                return Err(ParseError::InvalidV2SourceHash(entry.specifier.clone()));
            }

            read += section.total_len();

            if let Some(slot) = self.slot_for(&entry.specifier, is_source_map) {
                slot.set_ready(Some(Arc::from(section.into_content())));
            }
        }

        tracing::trace!(
            entries = offsets.len(),
            bytes = total_len,
            source_map = is_source_map,
            "loaded payload section"
        );
        Ok(())
    }

    fn slot_for(&self, specifier: &str, is_source_map: bool) -> Option<SourceSlot> {
        let modules = self.guard.modules.lock();
        let data = modules.get(specifier)?.as_module()?;
        Some(if is_source_map {
            data.source_map.clone()
        } else {
            data.source.clone()
        })
    }
}
