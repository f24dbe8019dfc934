//! Deterministic serializer for V2 archives.
//!
//! Serialization snapshots the archive's mutable options under its lock,
//! then walks the module table in insertion order, accumulating the modules
//! header while the payload buffers grow in first-seen order. Every
//! iteration order is fixed (table order, sorted npm orderings), so the same
//! archive state always produces byte-identical output.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::EszipV2;
use crate::checksum::ChecksumType;
use crate::error::WriteError;
use crate::module::EszipEntry;
use crate::npm::NpmPackage;

fn append_u32_be(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn append_string(buf: &mut Vec<u8>, s: &str) -> Result<(), WriteError> {
    let len = u32::try_from(s.len())
        .map_err(|_| WriteError::too_large("string", s.len()))?;
    append_u32_be(buf, len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn section_len(buf: &[u8], what: &str) -> Result<u32, WriteError> {
    u32::try_from(buf.len()).map_err(|_| WriteError::too_large(what, buf.len()))
}

/// Append one payload's `(offset, length)` pair to the modules header and,
/// when nonempty, the payload bytes plus digest to the payload buffer.
fn append_payload(
    header: &mut Vec<u8>,
    payload: &mut Vec<u8>,
    checksum: ChecksumType,
    specifier: &str,
    what: &str,
    bytes: Option<Arc<[u8]>>,
) -> Result<(), WriteError> {
    let bytes = bytes.as_deref().unwrap_or(&[]);
    let length = u32::try_from(bytes.len())
        .map_err(|_| WriteError::too_large(format!("{what} for {specifier}"), bytes.len()))?;

    if length == 0 {
        append_u32_be(header, 0);
        append_u32_be(header, 0);
        return Ok(());
    }

    let offset = u32::try_from(payload.len())
        .map_err(|_| WriteError::too_large(format!("{what} section"), payload.len()))?;
    payload.extend_from_slice(bytes);
    payload.extend_from_slice(&checksum.hash(bytes));

    append_u32_be(header, offset);
    append_u32_be(header, length);
    Ok(())
}

impl EszipV2 {
    /// Serialize the archive to its canonical byte form.
    ///
    /// Blocks on any module whose payload is still loading; the token
    /// cancels those waits. Output is deterministic for a given archive
    /// state.
    pub async fn into_bytes(&self, token: &CancellationToken) -> Result<Vec<u8>, WriteError> {
        let (version, options, npm_snapshot) = {
            let state = self.state.lock();
            (state.version, state.options, state.npm_snapshot.clone())
        };
        let checksum = options.checksum;

        let mut result = Vec::new();
        result.extend_from_slice(&version.to_magic());

        if version.supports_options() {
            let digest_size = options.digest_size() as u8;
            let content = [0, checksum as u8, 1, digest_size];
            append_u32_be(&mut result, content.len() as u32);
            result.extend_from_slice(&content);
            result.extend_from_slice(&checksum.hash(&content));
        }

        // Snapshot the table so no lock is held across slot waits.
        let entries: Vec<(String, EszipEntry)> = {
            let modules = self.modules.lock();
            modules
                .iter()
                .map(|(specifier, entry)| (specifier.to_string(), entry.clone()))
                .collect()
        };

        let mut modules_header = Vec::new();
        let mut sources = Vec::new();
        let mut source_maps = Vec::new();

        for (specifier, entry) in &entries {
            append_string(&mut modules_header, specifier)?;

            match entry {
                EszipEntry::Module(data) => {
                    modules_header.push(0);

                    let source = data
                        .source
                        .get(token)
                        .await
                        .map_err(|_| WriteError::Canceled)?;
                    append_payload(
                        &mut modules_header,
                        &mut sources,
                        checksum,
                        specifier,
                        "source",
                        source,
                    )?;

                    let source_map = data
                        .source_map
                        .get(token)
                        .await
                        .map_err(|_| WriteError::Canceled)?;
                    append_payload(
                        &mut modules_header,
                        &mut source_maps,
                        checksum,
                        specifier,
                        "source map",
                        source_map,
                    )?;

                    modules_header.push(data.kind as u8);
                }
                EszipEntry::Redirect(redirect) => {
                    modules_header.push(1);
                    append_string(&mut modules_header, &redirect.target)?;
                }
                EszipEntry::NpmSpecifier(npm) => {
                    modules_header.push(2);
                    append_u32_be(&mut modules_header, npm.package_index);
                }
            }
        }

        // Npm snapshot: roots ride in the modules header as npm specifier
        // frames, the package array forms the trailing npm section.
        let mut npm_bytes = Vec::new();
        if version.supports_npm() {
            if let Some(snapshot) = &npm_snapshot {
                let mut packages: Vec<&NpmPackage> = snapshot.packages.iter().collect();
                packages.sort_by_cached_key(|package| package.id.as_serialized());

                let id_to_index: HashMap<String, u32> = packages
                    .iter()
                    .enumerate()
                    .map(|(index, package)| (package.id.as_serialized(), index as u32))
                    .collect();

                for (requirement, id) in &snapshot.root_packages {
                    let index = id_to_index.get(&id.as_serialized()).ok_or_else(|| {
                        WriteError::UnknownNpmRoot {
                            requirement: requirement.clone(),
                            id: id.as_serialized(),
                        }
                    })?;
                    append_string(&mut modules_header, requirement)?;
                    modules_header.push(2);
                    append_u32_be(&mut modules_header, *index);
                }

                for package in &packages {
                    append_string(&mut npm_bytes, &package.id.as_serialized())?;
                    append_u32_be(&mut npm_bytes, package.dependencies.len() as u32);

                    for (requirement, dep_id) in &package.dependencies {
                        let index =
                            id_to_index.get(&dep_id.as_serialized()).ok_or_else(|| {
                                WriteError::UnknownNpmDependency {
                                    package: package.id.as_serialized(),
                                    requirement: requirement.clone(),
                                    id: dep_id.as_serialized(),
                                }
                            })?;
                        append_string(&mut npm_bytes, requirement)?;
                        append_u32_be(&mut npm_bytes, *index);
                    }
                }
            }
        }

        append_u32_be(
            &mut result,
            section_len(&modules_header, "modules header")?,
        );
        result.extend_from_slice(&modules_header);
        result.extend_from_slice(&checksum.hash(&modules_header));

        if version.supports_npm() {
            append_u32_be(&mut result, section_len(&npm_bytes, "npm section")?);
            result.extend_from_slice(&npm_bytes);
            result.extend_from_slice(&checksum.hash(&npm_bytes));
        }

        // Payload sections: the bodies already carry per-entry digests, so
        // no digest follows at the section boundary.
        append_u32_be(&mut result, section_len(&sources, "sources section")?);
        result.extend_from_slice(&sources);

        append_u32_be(
            &mut result,
            section_len(&source_maps, "source maps section")?,
        );
        result.extend_from_slice(&source_maps);

        tracing::trace!(bytes = result.len(), "serialized archive");
        Ok(result)
    }
}
