//! Integrity audit: count references that are still obfuscated after repair.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::archive::{Archive, ArchiveEntry};
use crate::classify::decode_text;
use crate::layout::Layout;
use crate::token::{find_tokens, token_extension};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic only; the book reads fine.
    Info,
    /// Reading works but some parts (images, fonts, navigation) may be degraded.
    Warning,
    /// Content or metadata is unreachable.
    Critical,
    /// Extension not in the severity table.
    Unclassified,
}

impl Severity {
    /// Severity of a broken reference to a file with this extension.
    pub fn for_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "css" => Severity::Info,
            "xhtml" | "html" | "htm" | "opf" => Severity::Critical,
            "ncx" => Severity::Warning,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" => Severity::Warning,
            "ttf" | "otf" | "woff" | "woff2" => Severity::Warning,
            "js" => Severity::Warning,
            _ => Severity::Unclassified,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Unclassified => 1,
            Severity::Warning => 2,
            Severity::Critical => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Unclassified => "unclassified",
        })
    }
}

/// Human description of what a broken reference to `ext` means for the reader.
pub fn describe_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "css" => "style file, does not affect reading",
        "xhtml" | "html" | "htm" => "content file, affects reading",
        "opf" => "metadata file, affects opening the book",
        "ncx" => "TOC file, reading works but navigation may break",
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" => {
            "image file, some images may not display"
        }
        "ttf" | "otf" | "woff" | "woff2" => "font file, text may render with a fallback font",
        "js" => "script (mostly annotations), some interactive parts may not work",
        _ => "unknown file type",
    }
}

/// Unresolved references of one extension inside one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFinding {
    pub entry: String,
    /// Severity attached to the entry's own file type.
    pub entry_severity: Severity,
    pub extension: String,
    pub count: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Most severe finding, if any.
    pub fn worst(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max_by_key(Severity::rank)
    }

    pub fn total(&self) -> usize {
        self.findings.iter().map(|f| f.count).sum()
    }
}

/// Scan every text entry under the content root for leftover tokens. Never
/// mutates the archive and never fails.
pub fn audit(archive: &Archive, layout: &Layout) -> AuditReport {
    #[cfg(feature = "parallel")]
    let per_entry: Vec<Vec<AuditFinding>> = {
        use rayon::prelude::*;
        archive
            .entries()
            .par_iter()
            .map(|e| audit_entry(e, layout))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let per_entry: Vec<Vec<AuditFinding>> =
        archive.iter().map(|e| audit_entry(e, layout)).collect();

    AuditReport {
        findings: per_entry.into_iter().flatten().collect(),
    }
}

fn audit_entry(entry: &ArchiveEntry, layout: &Layout) -> Vec<AuditFinding> {
    if !layout.is_content(&entry.path) || entry.is_dir() {
        return Vec::new();
    }
    let Some(text) = decode_text(&entry.data) else {
        return Vec::new();
    };

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for token in find_tokens(text) {
        *counts.entry(token_extension(token)).or_default() += 1;
    }

    let entry_severity = Severity::for_extension(&token_extension(entry.basename()));
    counts
        .into_iter()
        .map(|(extension, count)| AuditFinding {
            entry: entry.path.clone(),
            entry_severity,
            severity: Severity::for_extension(&extension),
            extension,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn severity_table() {
        assert_eq!(Severity::for_extension("css"), Severity::Info);
        assert_eq!(Severity::for_extension("xhtml"), Severity::Critical);
        assert_eq!(Severity::for_extension("OPF"), Severity::Critical);
        assert_eq!(Severity::for_extension("jpg"), Severity::Warning);
        assert_eq!(Severity::for_extension("ttf"), Severity::Warning);
        assert_eq!(Severity::for_extension("js"), Severity::Warning);
        assert_eq!(Severity::for_extension("xyz"), Severity::Unclassified);
        assert_eq!(Severity::for_extension(""), Severity::Unclassified);
    }

    #[test]
    fn groups_by_extension_per_entry() {
        let page = r#"<link href="%AA.css"/><img src="%BB.png"/><img src="%CC.PNG"/><a href="%DD">x</a>"#;
        let archive = Archive::from_entries(vec![
            ArchiveEntry::new("OEBPS/Text/a.xhtml", page),
            ArchiveEntry::new("META-INF/container.xml", "%EE.opf"),
            ArchiveEntry::new("OEBPS/Images/b.jpg", vec![0xff, 0xd8, 0x25, 0x41, 0x41]),
        ]);
        let report = audit(&archive, &Layout::default());

        let summary: Vec<_> = report
            .findings
            .iter()
            .map(|f| (f.entry.as_str(), f.extension.as_str(), f.count, f.severity))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("OEBPS/Text/a.xhtml", "", 1, Severity::Unclassified),
                ("OEBPS/Text/a.xhtml", "css", 1, Severity::Info),
                ("OEBPS/Text/a.xhtml", "png", 2, Severity::Warning),
            ]
        );
        assert!(report.findings.iter().all(|f| f.entry_severity == Severity::Critical));
        assert_eq!(report.worst(), Some(Severity::Warning));
        assert_eq!(report.total(), 4);
    }

    #[test]
    fn clean_archive_has_no_findings() {
        let archive = Archive::from_entries(vec![ArchiveEntry::new(
            "OEBPS/Text/a.xhtml",
            r#"<a href="chapter0001.xhtml">100% done</a>"#,
        )]);
        let report = audit(&archive, &Layout::default());
        assert!(report.is_clean());
        assert_eq!(report.worst(), None);
    }

    #[test]
    fn audit_never_mutates() {
        let archive = Archive::from_entries(vec![ArchiveEntry::new("OEBPS/Text/a.xhtml", "%AA.xhtml")]);
        let before = archive.clone();
        let report = audit(&archive, &Layout::default());
        assert_eq!(report.worst(), Some(Severity::Critical));
        assert_eq!(archive, before);
    }
}
