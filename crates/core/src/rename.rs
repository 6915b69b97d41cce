//! Entry renaming: obfuscated archive paths get their canonical basenames back.

use std::collections::HashSet;

use crate::archive::{Archive, ArchiveEntry};
use crate::error::RenameError;
use crate::manifest::{decode_path, target_path, ManifestMapping};

/// Produce a snapshot where every mapped entry carries its canonical name.
///
/// Content, timestamps and order are untouched and the entry count is
/// preserved. A rename that would land on a path already used by another
/// entry is an error rather than a silent overwrite.
pub fn rename_entries(archive: &Archive, mapping: &ManifestMapping) -> Result<Archive, RenameError> {
    let mut seen: HashSet<String> = HashSet::with_capacity(archive.len());
    let mut entries: Vec<ArchiveEntry> = Vec::with_capacity(archive.len());

    for entry in archive.iter() {
        let decoded = decode_path(&entry.path);
        let renamed = match mapping.get(&decoded) {
            Some(m) => {
                let target = target_path(&entry.path, &m.canonical);
                tracing::debug!("Renaming {} -> {}", entry.path, target);
                entry.renamed(target)
            }
            None => entry.clone(),
        };

        if !seen.insert(renamed.path.clone()) {
            return Err(RenameError::Collision {
                source_path: entry.path.clone(),
                target: renamed.path,
            });
        }
        entries.push(renamed);
    }

    Ok(Archive::from_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use zip::DateTime;

    fn mapping() -> ManifestMapping {
        let mut m = ManifestMapping::default();
        m.insert("OEBPS/Text/%E6%96%87%E6%9C%AC.xhtml", "text0001.xhtml");
        m
    }

    #[test]
    fn renames_decoded_and_encoded_entry_paths() {
        let stamp = DateTime::from_date_and_time(2020, 1, 2, 3, 4, 6).unwrap();
        let mut decoded = ArchiveEntry::new("OEBPS/Text/文本.xhtml", "body");
        decoded.modified = stamp;
        let archive = Archive::from_entries(vec![
            ArchiveEntry::new("mimetype", "application/epub+zip"),
            decoded,
            ArchiveEntry::new("OEBPS/Text/other.xhtml", "x"),
        ]);

        let out = rename_entries(&archive, &mapping()).unwrap();
        assert_eq!(
            out.paths().collect::<Vec<_>>(),
            vec!["mimetype", "OEBPS/Text/text0001.xhtml", "OEBPS/Text/other.xhtml"]
        );
        assert_eq!(out.entries()[1].modified, stamp);
        assert_eq!(out.entries()[1].data, b"body".to_vec());

        let encoded = Archive::from_entries(vec![ArchiveEntry::new(
            "OEBPS/Text/%E6%96%87%E6%9C%AC.xhtml",
            "body",
        )]);
        let out = rename_entries(&encoded, &mapping()).unwrap();
        assert_eq!(out.entries()[0].path, "OEBPS/Text/text0001.xhtml");
    }

    #[test]
    fn rename_onto_existing_entry_is_rejected() {
        let archive = Archive::from_entries(vec![
            ArchiveEntry::new("OEBPS/Text/text0001.xhtml", "already here"),
            ArchiveEntry::new("OEBPS/Text/文本.xhtml", "body"),
        ]);
        assert!(matches!(
            rename_entries(&archive, &mapping()),
            Err(RenameError::Collision { .. })
        ));
    }

    #[test]
    fn empty_mapping_is_identity() {
        let archive = Archive::from_entries(vec![
            ArchiveEntry::new("mimetype", "application/epub+zip"),
            ArchiveEntry::new("OEBPS/Text/文本.xhtml", "body"),
        ]);
        let out = rename_entries(&archive, &ManifestMapping::default()).unwrap();
        assert_eq!(out, archive);
    }

    proptest! {
        #[test]
        fn entry_count_and_bytes_preserved(names in proptest::collection::hash_set("[a-z]{1,8}", 1..20)) {
            let mut mapping = ManifestMapping::default();
            let mut entries = Vec::new();
            for (i, name) in names.iter().enumerate() {
                let encoded = format!("OEBPS/Text/%{:02X}{}.xhtml", i, name);
                mapping.insert(&encoded, format!("renamed{i:04}.xhtml"));
                entries.push(ArchiveEntry::new(encoded, name.as_bytes().to_vec()));
            }
            let archive = Archive::from_entries(entries);
            let out = rename_entries(&archive, &mapping).unwrap();

            prop_assert_eq!(out.len(), archive.len());
            for (before, after) in archive.iter().zip(out.iter()) {
                prop_assert_eq!(&before.data, &after.data);
                prop_assert!(after.path.starts_with("OEBPS/Text/renamed"));
            }
        }
    }
}
