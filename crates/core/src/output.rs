//! Reading the input book and writing the repaired copy next to it.

use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};

use crate::error::EbookError;
use crate::layout::Layout;
use crate::pipeline::{fix_bytes, PipelineOutput};
use crate::report::{Level, Reporter, Stage};
use crate::security::SecurityLimits;

/// `<dir of input>/<output_prefix><file name>`.
pub fn output_path(input: &Path, layout: &Layout) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = format!("{}{}", layout.output_prefix, name);
    match input.parent() {
        Some(dir) => dir.join(file),
        None => PathBuf::from(file),
    }
}

/// Copy access and modification times from `from` onto `to`.
pub fn copy_times(from: &Path, to: &Path) -> std::io::Result<()> {
    let meta = fs::metadata(from)?;
    let times = FileTimes::new()
        .set_accessed(meta.accessed()?)
        .set_modified(meta.modified()?);
    File::options().write(true).open(to)?.set_times(times)
}

/// Result of [`fix_file`].
#[derive(Debug)]
pub struct FixedFile {
    pub output_path: PathBuf,
    pub pipeline: PipelineOutput,
}

/// Repair the book at `input` and write it to `output` (or the default
/// output path). The output carries the input's timestamps.
pub fn fix_file(
    input: &Path,
    output: Option<&Path>,
    layout: &Layout,
    limits: &SecurityLimits,
    reporter: &dyn Reporter,
) -> Result<FixedFile, EbookError> {
    let bytes = fs::read(input)?;
    let (fixed, pipeline) = fix_bytes(&bytes, layout, limits, reporter)?;

    let output_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output_path(input, layout));
    reporter.report(Stage::Output, Level::Start, "Writing output");
    fs::write(&output_path, fixed)?;
    if let Err(e) = copy_times(input, &output_path) {
        reporter.report(
            Stage::Output,
            Level::Warning,
            &format!("Could not copy timestamps: {e}"),
        );
    }
    reporter.report(
        Stage::Output,
        Level::Success,
        &format!("Output saved as: {}", output_path.display()),
    );

    Ok(FixedFile {
        output_path,
        pipeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn output_goes_next_to_input_with_prefix() {
        let layout = Layout::default();
        assert_eq!(
            output_path(Path::new("/books/novel.epub"), &layout),
            PathBuf::from("/books/[fixed]novel.epub")
        );
        assert_eq!(
            output_path(Path::new("novel.epub"), &layout),
            PathBuf::from("[fixed]novel.epub")
        );
    }

    #[test]
    fn timestamps_are_copied() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.epub");
        let dst = dir.path().join("b.epub");
        fs::write(&src, b"a").unwrap();
        fs::write(&dst, b"b").unwrap();

        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_times(FileTimes::new().set_accessed(old).set_modified(old))
            .unwrap();

        copy_times(&src, &dst).unwrap();
        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), old);
    }
}
