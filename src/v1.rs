//! The legacy V1 archive: a plain JSON document.
//!
//! V1 predates streaming, checksums, source maps, redirects and npm state.
//! It is kept behind the same public surface as V2, with one behavioral
//! quirk preserved: taking a module's source removes the module from the
//! archive entirely.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, WriteError};
use crate::map::ModuleMap;
use crate::module::{EszipEntry, Module, ModuleData, ModuleKind};
use crate::slot::SourceSlot;

#[derive(Debug, Serialize, Deserialize)]
struct V1Document {
    version: u64,
    modules: IndexMap<String, V1Module>,
}

#[derive(Debug, Serialize, Deserialize)]
struct V1Module {
    kind: ModuleKind,
    source: String,
}

/// A parsed legacy archive. Every source is available immediately.
pub struct EszipV1 {
    modules: Arc<Mutex<ModuleMap>>,
}

impl EszipV1 {
    /// Parse a V1 JSON document. The document must declare `"version": 1`.
    pub fn parse(data: &[u8]) -> Result<EszipV1, ParseError> {
        let document: V1Document = serde_json::from_slice(data)?;
        if document.version != 1 {
            return Err(ParseError::InvalidV1Version(document.version));
        }

        let mut modules = ModuleMap::new();
        for (specifier, module) in document.modules {
            modules.insert(
                specifier,
                EszipEntry::Module(ModuleData {
                    kind: module.kind,
                    source: SourceSlot::new_ready(module.source.into_bytes()),
                    source_map: SourceSlot::new_empty(),
                }),
            );
        }

        Ok(EszipV1 {
            modules: Arc::new(Mutex::new(modules)),
        })
    }

    /// Serialize back to the V1 JSON document form.
    pub fn into_bytes(&self) -> Result<Vec<u8>, WriteError> {
        let modules = self.modules.lock();
        let mut document = V1Document {
            version: 1,
            modules: IndexMap::with_capacity(modules.len()),
        };

        for (specifier, entry) in modules.iter() {
            let Some(data) = entry.as_module() else {
                continue;
            };
            let source = data.source.peek().unwrap_or_else(|| Arc::from(&[][..]));
            document.modules.insert(
                specifier.to_string(),
                V1Module {
                    kind: data.kind,
                    source: String::from_utf8_lossy(&source).into_owned(),
                },
            );
        }

        Ok(serde_json::to_vec(&document)?)
    }

    /// Look up a module by specifier. V1 has no redirects; this is a direct
    /// table lookup.
    pub fn get_module(&self, specifier: &str) -> Option<Module> {
        let modules = self.modules.lock();
        let data = modules.get(specifier)?.as_module()?;
        Some(Module::v1(specifier, data, Arc::clone(&self.modules)))
    }

    /// V1 archives never carry import maps.
    pub fn get_import_map(&self, _specifier: &str) -> Option<Module> {
        None
    }

    /// All module specifiers, in document order.
    pub fn specifiers(&self) -> Vec<String> {
        self.modules.lock().keys().map(str::to_string).collect()
    }

    /// Handles for every module in the archive.
    pub fn modules(&self) -> Vec<Module> {
        let modules = self.modules.lock();
        modules
            .iter()
            .filter_map(|(specifier, entry)| {
                let data = entry.as_module()?;
                Some(Module::v1(specifier, data, Arc::clone(&self.modules)))
            })
            .collect()
    }
}

impl std::fmt::Debug for EszipV1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EszipV1")
            .field("modules", &self.modules.lock().len())
            .finish()
    }
}
