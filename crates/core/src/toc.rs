//! TOC repair: second-level resolution of links the manifest could not fix.
//!
//! Some obfuscated names keep unencoded ASCII between the encoded bytes (for
//! example `%E7%AC%AC4%E8%AF%9D.xhtml`), so the token pattern only sees
//! fragments of them and the reference rewriter cannot match them against the
//! manifest. The TOC still carries each chapter's title as link label, and each
//! chapter file carries the same title as a heading, so the label is used to
//! find the real file.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::archive::{Archive, ArchiveEntry};
use crate::classify::decode_text;
use crate::error::TocError;
use crate::layout::Layout;
use crate::report::{Level, Reporter, Stage};
use crate::token::{find_tokens, has_tokens};
use crate::xml::XmlDocument;

/// Heading levels searched in chapter files; the level varies between books.
pub const HEADING_LEVELS: std::ops::RangeInclusive<u8> = 1..=4;

/// Minimum Jaro-Winkler similarity for a heading to be offered as suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Obfuscated link target → label text, read from the TOC document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TocLinkIndex {
    links: BTreeMap<String, String>,
}

impl TocLinkIndex {
    /// Index every `div > a[href] > p` navigation entry whose target is still
    /// obfuscated. The key is the basename of the href without fragment.
    pub fn from_xml(toc_xml: &str) -> Result<Self, TocError> {
        let doc = XmlDocument::parse(toc_xml)?;
        let ns = doc.namespace();
        let mut links = BTreeMap::new();

        for div in doc.find_all("div") {
            let Some(a) = div.child(ns, "a") else { continue };
            let Some(p) = a.child(ns, "p") else { continue };
            let Some(target) = a.attr("href").and_then(link_target) else {
                continue;
            };
            let label = p.normalized_text();
            if label.is_empty() {
                continue;
            }
            links.insert(target.to_string(), label);
        }

        Ok(Self { links })
    }

    pub fn get(&self, target: &str) -> Option<&str> {
        self.links.get(target).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.links.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Basename of an href's path part, if it still contains an obfuscation token.
fn link_target(href: &str) -> Option<&str> {
    let path = href.split(['#', '?']).next().unwrap_or(href);
    let name = crate::layout::basename(path);
    has_tokens(name).then_some(name)
}

/// Two chapter files declared the same heading; the later one won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingCollision {
    pub heading: String,
    pub previous: String,
    pub winner: String,
}

/// Heading text → basename of the chapter file containing it.
///
/// Files are indexed in archive order and later files overwrite earlier ones
/// on identical headings. Every overwrite is recorded in [`collisions`](Self::collisions).
#[derive(Debug, Clone, Default)]
pub struct HeadingIndex {
    headings: HashMap<String, String>,
    collisions: Vec<HeadingCollision>,
}

impl HeadingIndex {
    pub fn insert(&mut self, heading: impl Into<String>, file: impl Into<String>) {
        let heading = heading.into();
        let file = file.into();
        if let Some(previous) = self.headings.insert(heading.clone(), file.clone()) {
            if previous != file {
                self.collisions.push(HeadingCollision {
                    heading,
                    previous,
                    winner: file,
                });
            }
        }
    }

    pub fn get(&self, heading: &str) -> Option<&str> {
        self.headings.get(heading).map(String::as_str)
    }

    pub fn collisions(&self) -> &[HeadingCollision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.headings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headings.is_empty()
    }

    /// Most similar known heading, for error messages.
    pub fn closest(&self, heading: &str) -> Option<&str> {
        self.headings
            .keys()
            .map(|k| (strsim::jaro_winkler(heading, k), k))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, k)| k.as_str())
    }

    /// Index the headings of every chapter file in `archive`.
    pub fn from_archive(archive: &Archive, layout: &Layout, reporter: &dyn Reporter) -> Self {
        let mut index = Self::default();
        for entry in archive.iter() {
            if !layout.is_chapter(entry.basename()) {
                continue;
            }
            match chapter_headings(entry) {
                Ok(headings) => {
                    for heading in headings {
                        index.insert(heading, entry.basename());
                    }
                }
                Err(detail) => reporter.report(
                    Stage::Toc,
                    Level::Warning,
                    &format!("Skipping chapter {}: {}", entry.path, detail),
                ),
            }
        }
        index
    }
}

fn chapter_headings(entry: &ArchiveEntry) -> Result<Vec<String>, String> {
    let text = decode_text(&entry.data).ok_or_else(|| "not UTF-8 text".to_string())?;
    let doc = XmlDocument::parse(text).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    for level in HEADING_LEVELS {
        for h in doc.find_all(&format!("h{level}")) {
            let text = h.normalized_text();
            if !text.is_empty() {
                out.push(text);
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TocOutcome {
    /// Stage not run (no obfuscation detected).
    Skipped,
    /// The TOC had no unresolved tokens.
    Clean,
    /// Every unresolved link was resolved.
    Repaired { links: usize },
    /// Links were resolved but tokens remain.
    Incomplete { links: usize, remaining: Vec<String> },
}

/// Resolve the TOC's remaining obfuscated links through chapter headings.
///
/// A link whose label matches no chapter heading is fatal, as the book would
/// otherwise ship with a broken navigation entry. Tokens that survive the
/// repair are reported and returned in [`TocOutcome::Incomplete`].
pub fn repair_toc(
    archive: &Archive,
    layout: &Layout,
    reporter: &dyn Reporter,
) -> Result<(Archive, TocOutcome), TocError> {
    let entry = archive
        .get(&layout.toc_path)
        .ok_or_else(|| TocError::MissingToc(layout.toc_path.clone()))?;
    let text = std::str::from_utf8(&entry.data).map_err(|e| TocError::Encoding(e.to_string()))?;

    if !has_tokens(text) {
        reporter.report(Stage::Toc, Level::Info, "TOC is fine");
        return Ok((archive.clone(), TocOutcome::Clean));
    }
    reporter.report(Stage::Toc, Level::Info, "Unresolved TOC links found, starting fix");

    let links = TocLinkIndex::from_xml(text)?;
    let headings = HeadingIndex::from_archive(archive, layout, reporter);
    if headings.is_empty() {
        reporter.report(
            Stage::Toc,
            Level::Warning,
            &format!(
                "No chapter files named {}<digits>.{} were found; TOC links cannot be resolved",
                layout.chapter_prefix, layout.chapter_extension
            ),
        );
    }
    for c in headings.collisions() {
        reporter.report(
            Stage::Toc,
            Level::Warning,
            &format!(
                "Heading \"{}\" appears in both {} and {}; using {}",
                c.heading, c.previous, c.winner, c.winner
            ),
        );
    }

    let mut replacements: Vec<(&str, &str)> = Vec::new();
    for (target, label) in links.iter() {
        if !text.contains(target) {
            continue;
        }
        let file = headings
            .get(label)
            .ok_or_else(|| TocError::UnresolvedHeading {
                token: target.to_string(),
                heading: label.to_string(),
                suggestion: headings.closest(label).map(str::to_string),
            })?;
        replacements.push((target, file));
    }

    // Longest first, so a target that is a fragment of another cannot split it.
    replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    let mut repaired = text.to_string();
    for &(target, file) in &replacements {
        tracing::debug!("TOC link {} -> {}", target, file);
        repaired = repaired.replace(target, file);
    }

    let remaining: Vec<String> = find_tokens(&repaired)
        .into_iter()
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let toc_path = layout.toc_path.as_str();
    let next: Archive = archive
        .iter()
        .map(|e| {
            if e.path == toc_path {
                e.with_data(repaired.as_bytes().to_vec())
            } else {
                e.clone()
            }
        })
        .collect();

    let outcome = if remaining.is_empty() {
        reporter.report(Stage::Toc, Level::Info, "Fix completed");
        TocOutcome::Repaired {
            links: replacements.len(),
        }
    } else {
        reporter.report(
            Stage::Toc,
            Level::Error,
            &format!("Fix failed, unresolved: {}", remaining.join(", ")),
        );
        TocOutcome::Incomplete {
            links: replacements.len(),
            remaining,
        }
    };

    Ok((next, outcome))
}
