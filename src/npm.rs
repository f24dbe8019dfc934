//! The npm resolution snapshot: package identities, the dependency graph and
//! its wire form.
//!
//! On the wire the snapshot is split in two: root packages travel inside the
//! modules header as npm specifier frames (so they are indexable by
//! specifier), while the package array and dependency edges form the trailing
//! npm section. The parser joins the halves back together.

use std::collections::{BTreeMap, HashMap};

use crate::error::ParseError;
use crate::parse::{parse_str, parse_u32_be};

/// A package identity: name plus resolved version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NpmPackageId {
    pub name: String,
    pub version: String,
}

/// Error for a package id string that does not follow `name@version`.
#[derive(Debug, thiserror::Error)]
#[error("invalid npm package id: {0}")]
pub struct InvalidNpmPackageId(pub String);

impl NpmPackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> NpmPackageId {
        NpmPackageId {
            name: name.into(),
            version: version.into(),
        }
    }

    /// The canonical `name@version` form used on the wire and for sorting.
    pub fn as_serialized(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Parse the canonical `name@version` form. Scoped names keep their
    /// leading `@`, so the version separator is the first `@` past position
    /// zero.
    pub fn from_serialized(input: &str) -> Result<NpmPackageId, InvalidNpmPackageId> {
        let at = input
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '@')
            .map(|(i, _)| i)
            .ok_or_else(|| InvalidNpmPackageId(input.to_string()))?;

        let (name, version) = input.split_at(at);
        let version = &version[1..];
        if name.is_empty() || version.is_empty() {
            return Err(InvalidNpmPackageId(input.to_string()));
        }

        Ok(NpmPackageId {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl std::fmt::Display for NpmPackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A resolved package and its dependency edges, keyed by requirement string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmPackage {
    pub id: NpmPackageId,
    pub dependencies: BTreeMap<String, NpmPackageId>,
}

/// The package-resolution snapshot stored alongside the module graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpmResolutionSnapshot {
    pub packages: Vec<NpmPackage>,
    /// Requirement string → resolved package, for the workspace roots.
    pub root_packages: BTreeMap<String, NpmPackageId>,
}

impl NpmResolutionSnapshot {
    /// Reconstruct a snapshot from the npm section content and the npm
    /// specifier side table collected from the modules header.
    ///
    /// Returns `None` when both halves are empty (the archive simply has no
    /// npm state).
    pub(crate) fn from_section(
        content: &[u8],
        npm_specifiers: &HashMap<String, u32>,
    ) -> Result<Option<NpmResolutionSnapshot>, ParseError> {
        let mut raw: Vec<(NpmPackageId, Vec<(String, u32)>)> = Vec::new();

        let mut read = 0;
        while read < content.len() {
            let (id, consumed) = parse_str(&content[read..], "npm package id")?;
            read += consumed;
            let id = NpmPackageId::from_serialized(id)
                .map_err(|err| ParseError::InvalidV2Header(err.to_string()))?;

            let (dep_count, consumed) = parse_u32_be(&content[read..], "npm dependency count")?;
            read += consumed;

            let mut dependencies = Vec::with_capacity(dep_count as usize);
            for _ in 0..dep_count {
                let (requirement, consumed) =
                    parse_str(&content[read..], "npm dependency requirement")?;
                let requirement = requirement.to_string();
                read += consumed;

                let (index, consumed) = parse_u32_be(&content[read..], "npm dependency index")?;
                read += consumed;

                dependencies.push((requirement, index));
            }

            raw.push((id, dependencies));
        }

        if raw.is_empty() && npm_specifiers.is_empty() {
            return Ok(None);
        }

        let id_at = |index: u32| -> Result<NpmPackageId, ParseError> {
            raw.get(index as usize).map(|(id, _)| id.clone()).ok_or_else(|| {
                ParseError::InvalidV2Header(format!("npm package index {index} out of bounds"))
            })
        };

        let mut packages = Vec::with_capacity(raw.len());
        for (id, dependencies) in &raw {
            let mut resolved = BTreeMap::new();
            for (requirement, index) in dependencies {
                resolved.insert(requirement.clone(), id_at(*index)?);
            }
            packages.push(NpmPackage {
                id: id.clone(),
                dependencies: resolved,
            });
        }

        let mut root_packages = BTreeMap::new();
        for (specifier, index) in npm_specifiers {
            root_packages.insert(specifier.clone(), id_at(*index)?);
        }

        Ok(Some(NpmResolutionSnapshot {
            packages,
            root_packages,
        }))
    }
}
