//! Manifest mapping: obfuscated archive path → canonical file name.
//!
//! The package document still declares every item with its real identifier, so
//! the identifier becomes the canonical name of the obfuscated file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::archive::Archive;
use crate::error::ManifestError;
use crate::layout::{self, Layout};
use crate::xml::XmlDocument;

/// Identifier that keeps its bare name: `toc.xhtml` would collide with
/// `TOC.xhtml` on case-insensitive readers.
const RESERVED_ID: &str = "toc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    /// Archive path exactly as declared in the manifest (percent-encoded).
    pub encoded_path: String,
    /// Canonical basename the entry gets after renaming.
    pub canonical: String,
}

/// Obfuscated archive path (percent-decoded) → canonical basename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ManifestMapping {
    entries: BTreeMap<String, MappingEntry>,
}

impl ManifestMapping {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up by decoded archive path.
    pub fn get(&self, decoded_path: &str) -> Option<&MappingEntry> {
        self.entries.get(decoded_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappingEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn insert(&mut self, encoded_path: &str, canonical: impl Into<String>) {
        self.entries.insert(
            decode_path(encoded_path),
            MappingEntry {
                encoded_path: encoded_path.to_string(),
                canonical: canonical.into(),
            },
        );
    }

    /// Encoded basename → canonical basename, the form in which references
    /// appear inside content documents.
    pub fn basename_lookup(&self) -> HashMap<String, String> {
        self.entries
            .values()
            .map(|e| {
                (
                    layout::basename(&e.encoded_path).to_string(),
                    e.canonical.clone(),
                )
            })
            .collect()
    }

    /// Reject mappings where two obfuscated paths would be renamed onto the
    /// same path; renaming would otherwise silently shadow one of them.
    pub fn check_injective(&self) -> Result<(), ManifestError> {
        let mut targets: HashMap<String, &str> = HashMap::new();
        for (source, entry) in &self.entries {
            let target = target_path(source, &entry.canonical);
            if let Some(first) = targets.insert(target.clone(), source) {
                return Err(ManifestError::NameCollision {
                    first: first.to_string(),
                    second: source.clone(),
                    target,
                });
            }
        }
        Ok(())
    }
}

/// Percent-decode an archive path; invalid UTF-8 sequences are replaced.
pub fn decode_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

/// Renamed path of `source`: same directory, canonical basename.
pub fn target_path(source: &str, canonical: &str) -> String {
    match layout::dirname(source) {
        "" => canonical.to_string(),
        dir => format!("{dir}/{canonical}"),
    }
}

/// Build the mapping from the package document inside `archive`.
pub fn build_mapping(archive: &Archive, layout: &Layout) -> Result<ManifestMapping, ManifestError> {
    let entry = archive
        .get(&layout.package_path)
        .ok_or_else(|| ManifestError::MissingEntry(layout.package_path.clone()))?;
    let xml = std::str::from_utf8(&entry.data)
        .map_err(|e| ManifestError::Encoding(e.to_string()))?;
    parse_manifest(xml, layout)
}

/// Build the mapping from package document text.
pub fn parse_manifest(xml: &str, layout: &Layout) -> Result<ManifestMapping, ManifestError> {
    let doc = XmlDocument::parse(xml)?;
    let mut mapping = ManifestMapping::default();

    for item in doc.find_all("item") {
        let (Some(id), Some(href)) = (item.attr("id"), item.attr("href")) else {
            continue;
        };
        if !href.contains('%') {
            continue;
        }

        let path = layout.manifest_item_path(href);
        let canonical = canonical_name(id, &path);
        tracing::debug!("Mapped {} -> {}", path, canonical);
        mapping.insert(&path, canonical);
    }

    Ok(mapping)
}

/// Canonical name for an item: its identifier, completed with the extension
/// of the declared file when the identifier has none.
pub fn canonical_name(id: &str, item_path: &str) -> String {
    if id == RESERVED_ID || Path::new(id).extension().is_some() {
        return id.to_string();
    }
    match Path::new(layout::basename(item_path)).extension() {
        Some(ext) => format!("{id}.{}", ext.to_string_lossy()),
        None => id.to_string(),
    }
}
