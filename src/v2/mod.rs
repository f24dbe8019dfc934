//! The V2 binary archive: framed, integrity-protected and streamable.

mod reader;
mod writer;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

pub use reader::SourceLoader;

use crate::checksum::ChecksumType;
use crate::map::ModuleMap;
use crate::module::{
    EszipEntry, Module, ModuleData, ModuleKind, ModuleRedirect, NpmSpecifierEntry,
};
use crate::npm::NpmResolutionSnapshot;
use crate::slot::SourceSlot;
use crate::version::{Options, Version};

/// Redirect chains longer than this resolve to nothing.
const MAX_REDIRECT_HOPS: usize = 10;

struct ArchiveState {
    version: Version,
    options: Options,
    npm_snapshot: Option<NpmResolutionSnapshot>,
}

/// A V2 archive.
///
/// The module table and the payload slots inside it are shared with any
/// outstanding [`SourceLoader`] and [`Module`] handles, so module metadata is
/// usable while payloads are still loading.
pub struct EszipV2 {
    modules: Arc<Mutex<ModuleMap>>,
    state: Mutex<ArchiveState>,
}

impl EszipV2 {
    /// A new, empty archive at the latest format version.
    pub fn new() -> EszipV2 {
        EszipV2::from_parts(
            ModuleMap::new(),
            Version::LATEST,
            Options::default_for_version(Version::LATEST),
            None,
        )
    }

    pub(crate) fn from_parts(
        modules: ModuleMap,
        version: Version,
        options: Options,
        npm_snapshot: Option<NpmResolutionSnapshot>,
    ) -> EszipV2 {
        EszipV2 {
            modules: Arc::new(Mutex::new(modules)),
            state: Mutex::new(ArchiveState {
                version,
                options,
                npm_snapshot,
            }),
        }
    }

    pub(crate) fn modules_handle(&self) -> Arc<Mutex<ModuleMap>> {
        Arc::clone(&self.modules)
    }

    pub fn version(&self) -> Version {
        self.state.lock().version
    }

    pub fn options(&self) -> Options {
        self.state.lock().options
    }

    /// Select the checksum algorithm used for subsequent serialization.
    pub fn set_checksum(&self, checksum: ChecksumType) {
        let mut state = self.state.lock();
        state.options.checksum = checksum;
        state.options.checksum_size = None;
    }

    /// Add a module with the given source and optional source map. An
    /// existing entry under the same specifier is replaced in place.
    pub fn add_module(
        &self,
        specifier: impl Into<String>,
        kind: ModuleKind,
        source: &[u8],
        source_map: Option<&[u8]>,
    ) {
        let source_map = match source_map {
            Some(bytes) => SourceSlot::new_ready(bytes),
            None => SourceSlot::new_empty(),
        };
        self.modules.lock().insert(
            specifier,
            EszipEntry::Module(ModuleData {
                kind,
                source: SourceSlot::new_ready(source),
                source_map,
            }),
        );
    }

    /// Add an import map. Import maps are inserted at the front of the
    /// module table so they precede the modules they govern.
    pub fn add_import_map(&self, kind: ModuleKind, specifier: impl Into<String>, source: &[u8]) {
        self.modules.lock().insert_front(
            specifier,
            EszipEntry::Module(ModuleData {
                kind,
                source: SourceSlot::new_ready(source),
                source_map: SourceSlot::new_empty(),
            }),
        );
    }

    /// Add arbitrary bytes under a specifier.
    pub fn add_opaque_data(&self, specifier: impl Into<String>, data: &[u8]) {
        self.add_module(specifier, ModuleKind::OpaqueData, data, None);
    }

    /// Add a redirect from one specifier to another.
    pub fn add_redirect(&self, specifier: impl Into<String>, target: impl Into<String>) {
        self.modules.lock().insert(
            specifier,
            EszipEntry::Redirect(ModuleRedirect {
                target: target.into(),
            }),
        );
    }

    /// Attach (or replace) the npm resolution snapshot.
    pub fn set_npm_snapshot(&self, snapshot: NpmResolutionSnapshot) {
        self.state.lock().npm_snapshot = Some(snapshot);
    }

    /// The npm snapshot, if any, without removing it.
    pub fn npm_snapshot(&self) -> Option<NpmResolutionSnapshot> {
        self.state.lock().npm_snapshot.clone()
    }

    /// Remove and return the npm snapshot. A second call returns `None`.
    pub fn take_npm_snapshot(&self) -> Option<NpmResolutionSnapshot> {
        self.state.lock().npm_snapshot.take()
    }

    /// All specifiers in the module table, including redirects, in order.
    pub fn specifiers(&self) -> Vec<String> {
        self.modules.lock().keys().map(str::to_string).collect()
    }

    /// Handles for every module entry (redirects and npm specifiers are not
    /// modules and are skipped).
    pub fn modules(&self) -> Vec<Module> {
        let modules = self.modules.lock();
        modules
            .iter()
            .filter_map(|(specifier, entry)| Some(Module::v2(specifier, entry.as_module()?)))
            .collect()
    }

    /// Resolve a specifier to a module, following redirects.
    ///
    /// JSONC entries are not addressable here; they only resolve through
    /// [`EszipV2::get_import_map`].
    pub fn get_module(&self, specifier: &str) -> Option<Module> {
        self.lookup(specifier, false)
    }

    /// Resolve a specifier to an import map module, following redirects.
    /// Unlike [`EszipV2::get_module`] this accepts JSONC.
    pub fn get_import_map(&self, specifier: &str) -> Option<Module> {
        self.lookup(specifier, true)
    }

    fn lookup(&self, specifier: &str, accept_jsonc: bool) -> Option<Module> {
        let modules = self.modules.lock();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = specifier;

        for _ in 0..MAX_REDIRECT_HOPS {
            if !visited.insert(current) {
                // Redirect cycle.
                return None;
            }
            match modules.get(current)? {
                EszipEntry::Module(data) => {
                    if data.kind == ModuleKind::Jsonc && !accept_jsonc {
                        return None;
                    }
                    return Some(Module::v2(current, data));
                }
                EszipEntry::Redirect(redirect) => current = redirect.target.as_str(),
                EszipEntry::NpmSpecifier(NpmSpecifierEntry { .. }) => return None,
            }
        }
        None
    }

    /// Insert a raw entry. Primarily useful for tests and tooling that
    /// construct unusual archives.
    pub fn insert_entry(&self, specifier: impl Into<String>, entry: EszipEntry) {
        self.modules.lock().insert(specifier, entry);
    }
}

impl Default for EszipV2 {
    fn default() -> Self {
        EszipV2::new()
    }
}

impl std::fmt::Debug for EszipV2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EszipV2")
            .field("version", &state.version)
            .field("options", &state.options)
            .field("modules", &self.modules.lock().len())
            .finish_non_exhaustive()
    }
}
