//! Immutable in-memory archive snapshots.
//!
//! Every pipeline stage takes a borrowed [`Archive`] and builds a brand-new one;
//! no stage mutates a snapshot it did not create. Entry order, timestamps and
//! compression methods survive a read → write round trip.

use std::io::{Cursor, Read, Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime};

use crate::error::ArchiveError;
use crate::layout;
use crate::security::{self, SecurityLimits};

/// A single archive member: path, timestamp and content bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub path: String,
    pub modified: DateTime,
    pub compression: CompressionMethod,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            modified: DateTime::default(),
            compression: CompressionMethod::Deflated,
            data: data.into(),
        }
    }

    /// Same entry under another path. Timestamp and compression are kept.
    pub fn renamed(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            modified: self.modified,
            compression: self.compression,
            data: self.data.clone(),
        }
    }

    /// Same entry with replaced content. Timestamp and compression are kept.
    pub fn with_data(&self, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: self.path.clone(),
            modified: self.modified,
            compression: self.compression,
            data: data.into(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    pub fn basename(&self) -> &str {
        layout::basename(&self.path)
    }
}

/// An ordered, immutable snapshot of archive entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
}

impl FromIterator<ArchiveEntry> for Archive {
    fn from_iter<I: IntoIterator<Item = ArchiveEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Archive {
    pub fn from_entries(entries: Vec<ArchiveEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArchiveEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its exact path.
    pub fn get(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    /// Build the next snapshot by transforming every entry independently.
    /// With the `parallel` feature the work runs on the rayon pool; the
    /// output keeps the input order either way.
    pub fn map_entries<F>(&self, f: F) -> Archive
    where
        F: Fn(&ArchiveEntry) -> ArchiveEntry + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            Archive::from_entries(self.entries.par_iter().map(f).collect())
        }
        #[cfg(not(feature = "parallel"))]
        {
            Archive::from_entries(self.entries.iter().map(f).collect())
        }
    }

    /// Read a zip container into a snapshot, enforcing the security limits.
    pub fn read_zip<R: Read + Seek>(
        input: R,
        limits: &SecurityLimits,
    ) -> Result<Self, ArchiveError> {
        let mut zip =
            zip::ZipArchive::new(input).map_err(|e| ArchiveError::InvalidZip(e.to_string()))?;

        security::check_file_count(zip.len() as u64, limits)?;

        let mut entries = Vec::with_capacity(zip.len());
        let mut total: u64 = 0;
        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| ArchiveError::InvalidZip(e.to_string()))?;
            let path = file.name().to_string();

            security::check_path_traversal(&path)?;
            security::check_resource_size(&path, file.size(), limits)?;
            security::check_compression_ratio(file.compressed_size(), file.size(), limits)?;
            total = total.saturating_add(file.size());
            security::check_total_size(total, limits)?;

            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| ArchiveError::ReadEntry {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;

            entries.push(ArchiveEntry {
                modified: file.last_modified().unwrap_or_default(),
                compression: file.compression(),
                path,
                data,
            });
        }

        tracing::debug!("Read {} archive entries", entries.len());
        Ok(Self { entries })
    }

    pub fn from_bytes(bytes: &[u8], limits: &SecurityLimits) -> Result<Self, ArchiveError> {
        Self::read_zip(Cursor::new(bytes), limits)
    }

    /// Serialize the snapshot as a zip container, entry order preserved.
    pub fn write_zip<W: Write + Seek>(&self, output: W) -> Result<W, ArchiveError> {
        let mut zip = zip::ZipWriter::new(output);

        for entry in &self.entries {
            let method = match entry.compression {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let options = SimpleFileOptions::default()
                .compression_method(method)
                .last_modified_time(entry.modified);
            let write_err = |e: zip::result::ZipError| ArchiveError::WriteEntry {
                path: entry.path.clone(),
                detail: e.to_string(),
            };

            if entry.is_dir() {
                zip.add_directory(entry.path.as_str(), options)
                    .map_err(write_err)?;
            } else {
                zip.start_file(entry.path.as_str(), options)
                    .map_err(write_err)?;
                zip.write_all(&entry.data)?;
            }
        }

        zip.finish().map_err(|e| ArchiveError::WriteEntry {
            path: "<central directory>".into(),
            detail: e.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        Ok(self.write_zip(Cursor::new(Vec::new()))?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Archive {
        let mut mimetype = ArchiveEntry::new("mimetype", "application/epub+zip");
        mimetype.compression = CompressionMethod::Stored;
        let mut chapter = ArchiveEntry::new("OEBPS/Text/chapter0001.xhtml", "<html/>");
        chapter.modified = DateTime::from_date_and_time(2021, 3, 14, 15, 9, 26).unwrap();
        Archive::from_entries(vec![
            mimetype,
            ArchiveEntry::new("META-INF/", Vec::new()),
            chapter,
            ArchiveEntry::new("OEBPS/Images/cover.jpg", vec![0xff, 0xd8, 0xff, 0xe0]),
        ])
    }

    #[test]
    fn zip_round_trip_keeps_order_times_and_methods() {
        let archive = sample();
        let bytes = archive.to_bytes().unwrap();
        let back = Archive::from_bytes(&bytes, &SecurityLimits::default()).unwrap();

        assert_eq!(
            back.paths().collect::<Vec<_>>(),
            archive.paths().collect::<Vec<_>>()
        );
        let chapter = back.get("OEBPS/Text/chapter0001.xhtml").unwrap();
        assert_eq!(chapter.modified, archive.entries()[2].modified);
        assert_eq!(chapter.data, b"<html/>".to_vec());
        assert_eq!(back.entries()[0].compression, CompressionMethod::Stored);
        assert!(back.entries()[1].is_dir());
    }

    #[test]
    fn read_rejects_garbage() {
        let err = Archive::from_bytes(b"not a zip", &SecurityLimits::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidZip(_)));
    }

    #[test]
    fn read_enforces_file_count() {
        let bytes = sample().to_bytes().unwrap();
        let limits = SecurityLimits {
            max_file_count: 2,
            ..SecurityLimits::default()
        };
        assert!(matches!(
            Archive::from_bytes(&bytes, &limits),
            Err(ArchiveError::Security(_))
        ));
    }

    #[test]
    fn map_entries_preserves_order() {
        let archive = sample();
        let upper = archive.map_entries(|e| e.renamed(e.path.to_uppercase()));
        assert_eq!(upper.entries()[0].path, "MIMETYPE");
        assert_eq!(upper.entries()[3].path, "OEBPS/IMAGES/COVER.JPG");
        assert_eq!(upper.len(), archive.len());
    }
}
