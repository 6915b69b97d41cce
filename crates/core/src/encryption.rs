//! Encryption descriptor removal.

use crate::archive::Archive;
use crate::error::EncryptionError;
use crate::layout::Layout;
use crate::report::{Level, Reporter, Stage};
use crate::security::EncryptionDescriptor;

/// Drop the encryption descriptor, if any. Every other entry passes through
/// unchanged.
///
/// The obfuscated books declare their renamed files as encrypted although the
/// content is plain, so `EncryptedData` blocks are expected here. Only a
/// descriptor naming a real DRM scheme aborts the run. A descriptor that
/// cannot be read is still dropped.
pub fn strip_encryption(
    archive: &Archive,
    layout: &Layout,
    reporter: &dyn Reporter,
) -> Result<Archive, EncryptionError> {
    let Some(entry) = archive.get(&layout.encryption_path) else {
        reporter.report(Stage::Encryption, Level::Info, "No encryption descriptor present");
        return Ok(archive.clone());
    };

    let xml = String::from_utf8_lossy(&entry.data);
    match EncryptionDescriptor::parse(&xml) {
        Ok(descriptor) => {
            descriptor.check_drm()?;
            if !descriptor.references.is_empty() {
                reporter.report(
                    Stage::Encryption,
                    Level::Info,
                    &format!(
                        "Descriptor declares {} encrypted entries",
                        descriptor.references.len()
                    ),
                );
            }
            if descriptor.font_obfuscated > 0 {
                reporter.report(
                    Stage::Encryption,
                    Level::Warning,
                    "Descriptor declares font obfuscation; embedded fonts will stay obfuscated",
                );
            }
        }
        Err(e) => reporter.report(
            Stage::Encryption,
            Level::Warning,
            &format!("Unreadable encryption descriptor ({e}), removing it anyway"),
        ),
    }

    Ok(archive
        .iter()
        .filter(|e| e.path != layout.encryption_path)
        .cloned()
        .collect())
}
