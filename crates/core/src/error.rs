use crate::security::DrmScheme;

/// Top-level error type. All public API functions return this.
#[derive(Debug, thiserror::Error)]
pub enum EbookError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Rename error: {0}")]
    Rename(#[from] RenameError),

    #[error("Encryption descriptor error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("TOC repair error: {0}")]
    Toc(#[from] TocError),

    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("ZIP bomb detected: decompression ratio {ratio}:1 exceeds limit {limit}:1")]
    ZipBomb { ratio: u64, limit: u64 },

    #[error("Path traversal detected in archive entry: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} files, exceeding limit of {limit}")]
    TooManyFiles { count: u64, limit: u64 },

    #[error("Resource {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedResource {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },

    #[error("Book is protected by {scheme} DRM")]
    DrmProtected { scheme: DrmScheme },
}

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error(transparent)]
    Syntax(#[from] quick_xml::Error),

    #[error("document has no root element")]
    NoRoot,

    #[error("element <{0}> is never closed")]
    Unclosed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Invalid ZIP archive: {0}")]
    InvalidZip(String),

    #[error("Failed to read entry {path}: {detail}")]
    ReadEntry { path: String, detail: String },

    #[error("Failed to write entry {path}: {detail}")]
    WriteEntry { path: String, detail: String },

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Missing package document: {0}")]
    MissingEntry(String),

    #[error("Package document is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("Malformed package document: {0}")]
    MalformedXml(#[from] XmlError),

    #[error("Obfuscated entries {first} and {second} both map to {target}")]
    NameCollision {
        first: String,
        second: String,
        target: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RenameError {
    #[error("Renaming {source_path} to {target} collides with an existing entry")]
    Collision { source_path: String, target: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("Real DRM found, refusing to continue: {0}")]
    RealDrm(#[from] SecurityError),
}

#[derive(Debug, thiserror::Error)]
pub enum TocError {
    #[error("Missing TOC document: {0}")]
    MissingToc(String),

    #[error("TOC document is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("Malformed TOC document: {0}")]
    MalformedXml(#[from] XmlError),

    #[error("{}", unresolved_heading_message(.token, .heading, .suggestion.as_deref()))]
    UnresolvedHeading {
        token: String,
        heading: String,
        suggestion: Option<String>,
    },
}

fn unresolved_heading_message(token: &str, heading: &str, suggestion: Option<&str>) -> String {
    match suggestion {
        Some(s) => format!(
            "TOC link {token} points at heading \"{heading}\" which no chapter contains (closest heading: \"{s}\")"
        ),
        None => format!("TOC link {token} points at heading \"{heading}\" which no chapter contains"),
    }
}
