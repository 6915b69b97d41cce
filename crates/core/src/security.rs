//! Limits applied while unpacking an untrusted book, and inspection of its
//! encryption descriptor.

use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::{SecurityError, XmlError};
use crate::xml::XmlDocument;

const MIB: u64 = 1024 * 1024;

/// Below this uncompressed size an entry's compression ratio is not checked;
/// `mimetype` and empty stubs compress to odd ratios.
const RATIO_CHECK_MIN_BYTES: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Uncompressed / compressed size above which an entry counts as a zip bomb.
    pub max_compression_ratio: u64,
    pub max_file_count: u64,
    /// Per entry, uncompressed.
    pub max_resource_size_bytes: u64,
    /// Whole archive, uncompressed.
    pub max_total_size_bytes: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_compression_ratio: 100,
            max_file_count: 10_000,
            max_resource_size_bytes: 200 * MIB,
            max_total_size_bytes: 1024 * MIB,
        }
    }
}

/// Reject entry names that would escape the extraction root: absolute paths,
/// drive prefixes and `..` components.
pub fn check_path_traversal(entry_path: &str) -> Result<(), SecurityError> {
    let has_drive = entry_path.as_bytes().get(1) == Some(&b':');
    let escapes = entry_path.starts_with(['/', '\\'])
        || has_drive
        || Path::new(entry_path)
            .components()
            .any(|c| matches!(c, Component::ParentDir));
    if escapes {
        return Err(SecurityError::PathTraversal {
            path: entry_path.to_string(),
        });
    }
    Ok(())
}

pub fn check_compression_ratio(
    compressed_size: u64,
    uncompressed_size: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if uncompressed_size < RATIO_CHECK_MIN_BYTES {
        return Ok(());
    }
    let ratio = uncompressed_size
        .checked_div(compressed_size)
        .unwrap_or(u64::MAX);
    if ratio > limits.max_compression_ratio {
        return Err(SecurityError::ZipBomb {
            ratio,
            limit: limits.max_compression_ratio,
        });
    }
    Ok(())
}

pub fn check_file_count(count: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if count > limits.max_file_count {
        return Err(SecurityError::TooManyFiles {
            count,
            limit: limits.max_file_count,
        });
    }
    Ok(())
}

pub fn check_resource_size(
    name: &str,
    size_bytes: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    oversized(name, size_bytes, limits.max_resource_size_bytes)
}

pub fn check_total_size(total_bytes: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    oversized("<total>", total_bytes, limits.max_total_size_bytes)
}

fn oversized(name: &str, size: u64, limit: u64) -> Result<(), SecurityError> {
    if size > limit {
        return Err(SecurityError::OversizedResource {
            name: name.to_string(),
            size_mb: size / MIB,
            limit_mb: limit / MIB,
        });
    }
    Ok(())
}

/// A rights-management scheme whose content is actually encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DrmScheme {
    AdobeAdept,
    AppleFairPlay,
    SonyUrms,
}

impl fmt::Display for DrmScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DrmScheme::AdobeAdept => "Adobe ADEPT",
            DrmScheme::AppleFairPlay => "Apple FairPlay",
            DrmScheme::SonyUrms => "Sony URMS",
        })
    }
}

/// Namespace prefixes that identify real DRM.
const DRM_NAMESPACES: &[(&str, DrmScheme)] = &[
    ("http://ns.adobe.com/adept", DrmScheme::AdobeAdept),
    ("http://ns.adobe.com/digitaleditions", DrmScheme::AdobeAdept),
    ("http://www.apple.com/ibooks", DrmScheme::AppleFairPlay),
    ("http://urms.org", DrmScheme::SonyUrms),
];

/// IDPF and Adobe font obfuscation algorithms.
const FONT_OBFUSCATION_ALGORITHMS: &[&str] = &[
    "http://www.idpf.org/2008/embedding",
    "http://ns.adobe.com/pdf/enc#RC",
];

/// What an encryption descriptor declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionDescriptor {
    /// Real DRM found in an element namespace or a FairPlay `sinf` element.
    pub drm: Option<DrmScheme>,
    /// `CipherReference` URIs of every `EncryptedData` block.
    pub references: Vec<String>,
    /// `EncryptedData` blocks using a font obfuscation algorithm.
    pub font_obfuscated: usize,
}

impl EncryptionDescriptor {
    /// Inspect descriptor XML. Element names and namespaces are matched, not
    /// raw text, so entry paths inside `URI` attributes cannot trigger a
    /// false DRM verdict.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let doc = XmlDocument::parse(xml)?;
        let mut out = Self::default();

        for el in std::iter::once(doc.root()).chain(doc.root().all_descendants()) {
            if out.drm.is_none() {
                out.drm = drm_scheme_of(el.namespace.as_deref(), &el.name);
            }
            if el.name != "EncryptedData" {
                continue;
            }
            let inner = el.all_descendants();
            let font = inner.iter().any(|e| {
                e.name == "EncryptionMethod"
                    && e.attr("Algorithm")
                        .is_some_and(|a| FONT_OBFUSCATION_ALGORITHMS.contains(&a))
            });
            if font {
                out.font_obfuscated += 1;
            }
            out.references.extend(
                inner
                    .iter()
                    .filter(|e| e.name == "CipherReference")
                    .filter_map(|e| e.attr("URI"))
                    .map(str::to_string),
            );
        }
        Ok(out)
    }

    /// Fails when the descriptor declares real DRM.
    pub fn check_drm(&self) -> Result<(), SecurityError> {
        match self.drm {
            Some(scheme) => Err(SecurityError::DrmProtected { scheme }),
            None => Ok(()),
        }
    }
}

fn drm_scheme_of(namespace: Option<&str>, local: &str) -> Option<DrmScheme> {
    if local == "sinf" {
        return Some(DrmScheme::AppleFairPlay);
    }
    let ns = namespace?;
    DRM_NAMESPACES
        .iter()
        .find(|(prefix, _)| ns.starts_with(prefix))
        .map(|(_, scheme)| *scheme)
}
