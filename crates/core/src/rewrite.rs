//! In-content reference rewriting: obfuscated tokens → canonical names.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::archive::{Archive, ArchiveEntry};
use crate::classify::decode_text;
use crate::layout::Layout;
use crate::manifest::ManifestMapping;
use crate::token::replace_tokens;

/// Rewrite every text entry under the content root. Binary entries and
/// entries outside the content root are copied unchanged; tokens unknown to
/// the mapping are left for TOC repair or the audit.
pub fn rewrite_references(archive: &Archive, mapping: &ManifestMapping, layout: &Layout) -> Archive {
    let lookup = mapping.basename_lookup();
    archive.map_entries(|entry| rewrite_entry(entry, &lookup, layout))
}

fn rewrite_entry(
    entry: &ArchiveEntry,
    lookup: &HashMap<String, String>,
    layout: &Layout,
) -> ArchiveEntry {
    if !layout.is_content(&entry.path) || entry.is_dir() {
        return entry.clone();
    }
    let Some(text) = decode_text(&entry.data) else {
        tracing::debug!("Passing {} through as binary", entry.path);
        return entry.clone();
    };

    match rewrite_text(text, lookup) {
        Cow::Borrowed(_) => entry.clone(),
        Cow::Owned(rewritten) => {
            tracing::debug!("Rewrote references in {}", entry.path);
            entry.with_data(rewritten.into_bytes())
        }
    }
}

/// Replace every token present in `lookup` with its canonical name.
pub fn rewrite_text<'t>(text: &'t str, lookup: &HashMap<String, String>) -> Cow<'t, str> {
    replace_tokens(text, |token| lookup.get(token).cloned())
}
