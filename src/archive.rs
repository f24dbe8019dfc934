//! The archive union: one handle over both the legacy V1 and the binary V2
//! formats.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::ParseError;
use crate::module::Module;
use crate::npm::NpmResolutionSnapshot;
use crate::v1::EszipV1;
use crate::v2::{EszipV2, SourceLoader};
use crate::version::Version;

/// A parsed archive of either format.
///
/// Format discrimination happens on the first 8 bytes: a known V2 magic
/// selects the binary parser, anything else is fed to the V1 JSON parser.
#[derive(Debug)]
pub enum Eszip {
    V1(EszipV1),
    V2(EszipV2),
}

impl Eszip {
    /// Parse an archive from a reader.
    ///
    /// Returns the archive once its metadata is available, plus a
    /// [`SourceLoader`] that loads the payload sections. For V1 everything
    /// is loaded up front and the loader is a no-op; for V2 the loader may
    /// run inline or on a background task while metadata is already being
    /// consumed.
    pub async fn parse<R: AsyncRead + Unpin>(
        mut reader: R,
    ) -> Result<(Eszip, SourceLoader<R>), ParseError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).await?;

        if let Some(version) = Version::from_magic(&magic) {
            let (archive, loader) = EszipV2::parse_with_version(version, reader).await?;
            return Ok((Eszip::V2(archive), loader));
        }

        // Not a V2 magic: re-feed the bytes to the V1 JSON parser.
        let mut data = magic.to_vec();
        reader.read_to_end(&mut data).await?;
        let archive = EszipV1::parse(&data)?;
        Ok((Eszip::V1(archive), SourceLoader::noop()))
    }

    /// Parse an archive and load all payloads before returning.
    pub async fn parse_fully<R: AsyncRead + Unpin>(
        token: &CancellationToken,
        reader: R,
    ) -> Result<Eszip, ParseError> {
        let (archive, loader) = Eszip::parse(reader).await?;
        loader.load(token).await?;
        Ok(archive)
    }

    /// Parse an archive from a byte slice, loading all payloads.
    pub async fn parse_bytes(
        token: &CancellationToken,
        data: &[u8],
    ) -> Result<Eszip, ParseError> {
        Eszip::parse_fully(token, data).await
    }

    pub fn is_v1(&self) -> bool {
        matches!(self, Eszip::V1(_))
    }

    pub fn is_v2(&self) -> bool {
        matches!(self, Eszip::V2(_))
    }

    #[inline(always)]
    pub fn v1(&self) -> Option<&EszipV1> {
        match self {
            Eszip::V1(archive) => Some(archive),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn v2(&self) -> Option<&EszipV2> {
        match self {
            Eszip::V2(archive) => Some(archive),
            _ => None,
        }
    }

    /// Resolve a specifier to a module, following V2 redirects.
    pub fn get_module(&self, specifier: &str) -> Option<Module> {
        match self {
            Eszip::V1(archive) => archive.get_module(specifier),
            Eszip::V2(archive) => archive.get_module(specifier),
        }
    }

    /// Resolve a specifier to an import map module.
    pub fn get_import_map(&self, specifier: &str) -> Option<Module> {
        match self {
            Eszip::V1(archive) => archive.get_import_map(specifier),
            Eszip::V2(archive) => archive.get_import_map(specifier),
        }
    }

    /// All specifiers in the archive, in table order.
    pub fn specifiers(&self) -> Vec<String> {
        match self {
            Eszip::V1(archive) => archive.specifiers(),
            Eszip::V2(archive) => archive.specifiers(),
        }
    }

    /// The npm snapshot, if any, without removing it. Always `None` for V1.
    pub fn npm_snapshot(&self) -> Option<NpmResolutionSnapshot> {
        self.v2().and_then(EszipV2::npm_snapshot)
    }

    /// Remove and return the npm snapshot. Always `None` for V1.
    pub fn take_npm_snapshot(&self) -> Option<NpmResolutionSnapshot> {
        self.v2().and_then(EszipV2::take_npm_snapshot)
    }
}
