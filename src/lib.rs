//! Reader and writer for the eszip format: a compact binary serialization of
//! ECMAScript module graphs.
//!
//! An archive bundles named modules (by URL-like specifier) with their
//! sources, optional source maps, redirect aliases and an optional npm
//! resolution snapshot. Two formats live behind one surface: the legacy V1
//! JSON document and the V2 binary layout (V2.0 through V2.3) with section
//! digests and streaming parse.
//!
//! Use [`Eszip::parse`] to read either format. The V2 parse is split in two
//! phases: metadata (specifiers, kinds, redirects, npm state) is usable as
//! soon as `parse` returns, while the returned [`SourceLoader`] streams the
//! payload sections in the background and releases per-module waiters as
//! each payload arrives. Build archives with [`EszipV2::new`] and the `add_*`
//! methods, then serialize with [`EszipV2::into_bytes`].

mod archive;
mod checksum;
mod error;
mod map;
mod module;
mod npm;
mod parse;
mod slot;
mod v1;
mod v2;
mod version;

pub use archive::Eszip;
pub use checksum::ChecksumType;
pub use error::{ParseError, WriteError};
pub use map::ModuleMap;
pub use module::{
    EszipEntry, Module, ModuleData, ModuleKind, ModuleRedirect, NpmSpecifierEntry,
};
pub use npm::{InvalidNpmPackageId, NpmPackage, NpmPackageId, NpmResolutionSnapshot};
pub use slot::{SlotState, SourceSlot};
pub use v1::EszipV1;
pub use v2::{EszipV2, SourceLoader};
pub use version::{
    has_magic, Options, Version, MAGIC_V2, MAGIC_V2_1, MAGIC_V2_2, MAGIC_V2_3,
};
