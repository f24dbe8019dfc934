//! Module kinds, archive entry variants and the module façade.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::ParseError;
use crate::map::ModuleMap;
use crate::slot::SourceSlot;

/// The kind of artifact a module entry carries.
///
/// The V2 wire encoding is a single byte; any other value is a hard parse
/// error. The serde names are the V1 JSON `kind` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum ModuleKind {
    #[serde(rename = "javascript")]
    JavaScript = 0,
    #[serde(rename = "json")]
    Json = 1,
    /// JSON with comments. Only reachable through import-map lookup.
    #[serde(rename = "jsonc")]
    Jsonc = 2,
    /// Arbitrary bytes with no module semantics.
    #[serde(rename = "opaque_data")]
    OpaqueData = 3,
    #[serde(rename = "wasm")]
    Wasm = 4,
}

impl ModuleKind {
    /// Decode a module kind byte. Only 0..=4 are recognized.
    pub fn from_u8(byte: u8) -> Option<ModuleKind> {
        match byte {
            0 => Some(ModuleKind::JavaScript),
            1 => Some(ModuleKind::Json),
            2 => Some(ModuleKind::Jsonc),
            3 => Some(ModuleKind::OpaqueData),
            4 => Some(ModuleKind::Wasm),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModuleKind::JavaScript => "javascript",
            ModuleKind::Json => "json",
            ModuleKind::Jsonc => "jsonc",
            ModuleKind::OpaqueData => "opaque_data",
            ModuleKind::Wasm => "wasm",
        };
        f.write_str(name)
    }
}

/// A module with payload slots for its source and source map.
#[derive(Debug, Clone)]
pub struct ModuleData {
    pub kind: ModuleKind,
    pub source: SourceSlot,
    pub source_map: SourceSlot,
}

/// An alias pointing one specifier at another. The target does not have to
/// exist; resolution is lazy and happens per lookup.
#[derive(Debug, Clone)]
pub struct ModuleRedirect {
    pub target: String,
}

/// A bare npm specifier mapping to an index into the snapshot's sorted
/// package array.
#[derive(Debug, Clone, Copy)]
pub struct NpmSpecifierEntry {
    pub package_index: u32,
}

/// One entry of the module table.
#[derive(Debug, Clone)]
pub enum EszipEntry {
    Module(ModuleData),
    Redirect(ModuleRedirect),
    NpmSpecifier(NpmSpecifierEntry),
}

impl EszipEntry {
    #[inline(always)]
    pub fn as_module(&self) -> Option<&ModuleData> {
        match self {
            EszipEntry::Module(data) => Some(data),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_redirect(&self) -> Option<&ModuleRedirect> {
        match self {
            EszipEntry::Redirect(redirect) => Some(redirect),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_npm_specifier(&self) -> Option<&NpmSpecifierEntry> {
        match self {
            EszipEntry::NpmSpecifier(entry) => Some(entry),
            _ => None,
        }
    }
}

pub(crate) enum ModuleInner {
    /// V2 semantics: taking a payload empties its slot but the module stays
    /// in the archive.
    V2 {
        source: SourceSlot,
        source_map: SourceSlot,
    },
    /// V1 semantics: no source maps, and taking the source removes the
    /// module from the archive.
    V1 {
        source: SourceSlot,
        modules: Arc<Mutex<ModuleMap>>,
    },
}

/// A resolved module handle.
///
/// Obtained from the archive lookup methods; holds shared handles to the
/// underlying payload slots, so it stays valid while payloads load in the
/// background.
pub struct Module {
    pub specifier: String,
    pub kind: ModuleKind,
    pub(crate) inner: ModuleInner,
}

impl Module {
    pub(crate) fn v2(specifier: impl Into<String>, data: &ModuleData) -> Module {
        Module {
            specifier: specifier.into(),
            kind: data.kind,
            inner: ModuleInner::V2 {
                source: data.source.clone(),
                source_map: data.source_map.clone(),
            },
        }
    }

    pub(crate) fn v1(
        specifier: impl Into<String>,
        data: &ModuleData,
        modules: Arc<Mutex<ModuleMap>>,
    ) -> Module {
        Module {
            specifier: specifier.into(),
            kind: data.kind,
            inner: ModuleInner::V1 {
                source: data.source.clone(),
                modules,
            },
        }
    }

    /// The module source. Blocks while the payload is still loading.
    pub async fn source(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<[u8]>>, ParseError> {
        match &self.inner {
            ModuleInner::V2 { source, .. } | ModuleInner::V1 { source, .. } => {
                source.get(token).await
            }
        }
    }

    /// The module source map, if one was stored. Always `None` for V1.
    pub async fn source_map(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<[u8]>>, ParseError> {
        match &self.inner {
            ModuleInner::V2 { source_map, .. } => source_map.get(token).await,
            ModuleInner::V1 { .. } => Ok(None),
        }
    }

    /// Take the module source.
    ///
    /// V2: the slot transitions to taken and the module remains addressable.
    /// V1: the module is removed from the archive as well.
    pub async fn take_source(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<[u8]>>, ParseError> {
        match &self.inner {
            ModuleInner::V2 { source, .. } => source.take(token).await,
            ModuleInner::V1 { source, modules } => {
                let bytes = source.take(token).await?;
                modules.lock().remove(&self.specifier);
                Ok(bytes)
            }
        }
    }

    /// Take the module source map. Always `None` for V1.
    pub async fn take_source_map(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<[u8]>>, ParseError> {
        match &self.inner {
            ModuleInner::V2 { source_map, .. } => source_map.take(token).await,
            ModuleInner::V1 { .. } => Ok(None),
        }
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("specifier", &self.specifier)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
