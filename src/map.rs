//! Insertion-ordered specifier → entry mapping.

use indexmap::IndexMap;

use crate::module::EszipEntry;

/// The archive's module table.
///
/// Iteration order is insertion order; [`ModuleMap::insert_front`] moves an
/// entry to the head (import maps must precede the modules they govern), and
/// removal preserves the relative order of the remaining entries.
#[derive(Debug, Default)]
pub struct ModuleMap {
    entries: IndexMap<String, EszipEntry>,
}

impl ModuleMap {
    pub fn new() -> ModuleMap {
        ModuleMap::default()
    }

    /// Insert an entry. An existing key keeps its position; its value is
    /// replaced.
    pub fn insert(&mut self, specifier: impl Into<String>, entry: EszipEntry) {
        self.entries.insert(specifier.into(), entry);
    }

    /// Insert an entry at the front. An existing key is moved to the front
    /// and its value replaced.
    pub fn insert_front(&mut self, specifier: impl Into<String>, entry: EszipEntry) {
        self.entries.shift_insert(0, specifier.into(), entry);
    }

    /// Remove an entry, preserving the order of the rest.
    pub fn remove(&mut self, specifier: &str) -> Option<EszipEntry> {
        self.entries.shift_remove(specifier)
    }

    pub fn get(&self, specifier: &str) -> Option<&EszipEntry> {
        self.entries.get(specifier)
    }

    /// Specifiers in iteration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EszipEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
