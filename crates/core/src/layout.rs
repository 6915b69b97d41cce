//! Fixed archive layout of the obfuscated books this tool targets.

use serde::{Deserialize, Serialize};

/// Where the pipeline expects each well-known entry. The defaults match the
/// layout used by the publishers that apply the name obfuscation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Top-level directory holding all reading-order and resource files.
    pub content_root: String,
    pub package_path: String,
    pub toc_path: String,
    pub encryption_path: String,
    /// Chapter files are `{chapter_prefix}<digits>.{chapter_extension}`.
    pub chapter_prefix: String,
    pub chapter_extension: String,
    /// Prepended to the input file name to form the output file name.
    pub output_prefix: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            content_root: "OEBPS/".to_string(),
            package_path: "OEBPS/content.opf".to_string(),
            toc_path: "OEBPS/Text/TOC.xhtml".to_string(),
            encryption_path: "META-INF/encryption.xml".to_string(),
            chapter_prefix: "chapter".to_string(),
            chapter_extension: "xhtml".to_string(),
            output_prefix: "[fixed]".to_string(),
        }
    }
}

impl Layout {
    /// Whether an archive path lives under the content root.
    pub fn is_content(&self, path: &str) -> bool {
        path.starts_with(&self.content_root)
    }

    /// Whether a basename follows the chapter naming convention.
    pub fn is_chapter(&self, basename: &str) -> bool {
        let Some(rest) = basename.strip_prefix(self.chapter_prefix.as_str()) else {
            return false;
        };
        let Some(digits) = rest
            .strip_suffix(self.chapter_extension.as_str())
            .and_then(|r| r.strip_suffix('.'))
        else {
            return false;
        };
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    }

    /// Archive path of an item declared in the package document.
    pub fn manifest_item_path(&self, href: &str) -> String {
        let dir = self
            .package_path
            .rfind('/')
            .map(|i| &self.package_path[..i + 1])
            .unwrap_or("");
        format!("{dir}{href}")
    }
}

/// Final path component of an archive path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Everything before the final path component, without the trailing slash.
pub fn dirname(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}
