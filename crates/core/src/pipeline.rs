//! The repair pipeline: manifest → rename → rewrite → strip encryption → TOC → audit.
//!
//! Stages run strictly in order. Each one borrows the previous snapshot and
//! returns a new one; the mapping is built once and only read afterwards.

use crate::archive::Archive;
use crate::audit::{audit, describe_extension, AuditReport, Severity};
use crate::encryption::strip_encryption;
use crate::error::EbookError;
use crate::layout::Layout;
use crate::manifest::{build_mapping, ManifestMapping};
use crate::rename::rename_entries;
use crate::report::{Level, NoopReporter, Reporter, Stage};
use crate::rewrite::rewrite_references;
use crate::security::SecurityLimits;
use crate::toc::{repair_toc, TocOutcome};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub archive: Archive,
    pub mapping: ManifestMapping,
    pub toc: TocOutcome,
    pub audit: AuditReport,
    /// Whether the manifest declared any obfuscated item. When it did not,
    /// `archive` is the untouched input.
    pub obfuscation_detected: bool,
}

pub struct Pipeline<'r> {
    layout: Layout,
    reporter: &'r dyn Reporter,
}

impl Pipeline<'static> {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            reporter: &NoopReporter,
        }
    }
}

impl<'r> Pipeline<'r> {
    pub fn with_reporter<'n>(self, reporter: &'n dyn Reporter) -> Pipeline<'n> {
        Pipeline {
            layout: self.layout,
            reporter,
        }
    }

    fn start(&self, stage: Stage) {
        self.reporter
            .report(stage, Level::Start, &format!("Starting {}", stage.label()));
    }

    fn done(&self, stage: Stage) {
        self.reporter
            .report(stage, Level::Success, &format!("Completed {}", stage.label()));
    }

    fn skip(&self, stage: Stage) {
        self.reporter.report(
            stage,
            Level::Info,
            &format!("Skipped {}: no obfuscation detected", stage.label()),
        );
    }

    /// Run every stage on `source`.
    pub fn run(&self, source: &Archive) -> Result<PipelineOutput, EbookError> {
        let layout = &self.layout;

        self.start(Stage::Manifest);
        let mapping = build_mapping(source, layout)?;
        mapping.check_injective()?;
        if mapping.is_empty() {
            self.reporter.report(
                Stage::Manifest,
                Level::Warning,
                "Unable to identify encryption, possibly no fake DRM encryption",
            );
        } else {
            self.reporter.report(
                Stage::Manifest,
                Level::Info,
                &format!("Found {} obfuscated entries", mapping.len()),
            );
        }
        self.done(Stage::Manifest);

        let (archive, toc) = if mapping.is_empty() {
            for stage in [Stage::Rename, Stage::Rewrite, Stage::Encryption, Stage::Toc] {
                self.skip(stage);
            }
            (source.clone(), TocOutcome::Skipped)
        } else {
            self.start(Stage::Rename);
            let renamed = rename_entries(source, &mapping)?;
            self.done(Stage::Rename);

            self.start(Stage::Rewrite);
            let rewritten = rewrite_references(&renamed, &mapping, layout);
            self.done(Stage::Rewrite);

            self.start(Stage::Encryption);
            let stripped = strip_encryption(&rewritten, layout, self.reporter)?;
            self.done(Stage::Encryption);

            self.start(Stage::Toc);
            let repaired = repair_toc(&stripped, layout, self.reporter)?;
            self.done(Stage::Toc);
            repaired
        };

        self.start(Stage::Audit);
        let report = audit(&archive, layout);
        self.report_audit(&report);
        self.done(Stage::Audit);

        Ok(PipelineOutput {
            archive,
            obfuscation_detected: !mapping.is_empty(),
            mapping,
            toc,
            audit: report,
        })
    }

    fn report_audit(&self, report: &AuditReport) {
        if report.is_clean() {
            self.reporter
                .report(Stage::Audit, Level::Info, "No unresolved references left");
            return;
        }
        for f in &report.findings {
            let name = crate::layout::basename(&f.entry);
            let entry_ext = crate::token::token_extension(name);
            let level = match f.severity {
                Severity::Info => Level::Info,
                Severity::Critical => Level::Error,
                Severity::Warning | Severity::Unclassified => Level::Warning,
            };
            self.reporter.report(
                Stage::Audit,
                level,
                &format!(
                    "In {name}, {} references to {} files failed to match [{}]; {name} is a {}; unmatched references are a {}",
                    f.count,
                    if f.extension.is_empty() { "extensionless" } else { &f.extension },
                    f.severity,
                    describe_extension(&entry_ext),
                    describe_extension(&f.extension),
                ),
            );
        }
    }
}

/// Zip bytes in, zip bytes out. When no obfuscation is detected the input
/// bytes are returned verbatim.
pub fn fix_bytes(
    input: &[u8],
    layout: &Layout,
    limits: &SecurityLimits,
    reporter: &dyn Reporter,
) -> Result<(Vec<u8>, PipelineOutput), EbookError> {
    let source = Archive::from_bytes(input, limits)?;
    let output = Pipeline::new(layout.clone())
        .with_reporter(reporter)
        .run(&source)?;
    let bytes = if output.obfuscation_detected {
        output.archive.to_bytes()?
    } else {
        input.to_vec()
    };
    Ok((bytes, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEntry;
    use crate::report::MemoryReporter;

    const OPF: &str = r#"<package xmlns="http://www.idpf.org/2007/opf"><manifest>
<item id="text0001" href="Text/%E6%96%87%E6%9C%AC.xhtml" media-type="application/xhtml+xml"/>
</manifest></package>"#;

    const TOC: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><body>
<div><a href="%E6%96%87%E6%9C%AC.xhtml"><p>Text</p></a></div></body></html>"#;

    fn book() -> Archive {
        Archive::from_entries(vec![
            ArchiveEntry::new("mimetype", "application/epub+zip"),
            ArchiveEntry::new("META-INF/encryption.xml", "<encryption/>"),
            ArchiveEntry::new("OEBPS/content.opf", OPF),
            ArchiveEntry::new("OEBPS/Text/TOC.xhtml", TOC),
            ArchiveEntry::new("OEBPS/Text/文本.xhtml", "<html><body><h1>Text</h1></body></html>"),
        ])
    }

    #[test]
    fn every_stage_reports_start_and_success() {
        let reporter = MemoryReporter::new();
        let out = Pipeline::new(Layout::default())
            .with_reporter(&reporter)
            .run(&book())
            .unwrap();

        assert!(out.obfuscation_detected);
        assert_eq!(out.toc, TocOutcome::Clean);
        for stage in Stage::ALL {
            assert_eq!(reporter.messages(stage, Level::Start).len(), 1, "{stage}");
            assert_eq!(reporter.messages(stage, Level::Success).len(), 1, "{stage}");
        }
        assert!(out.archive.get("OEBPS/Text/text0001.xhtml").is_some());
        assert!(out.archive.get("META-INF/encryption.xml").is_none());
    }

    #[test]
    fn audit_findings_are_reported_at_their_severity() {
        let mut entries = book().iter().cloned().collect::<Vec<_>>();
        entries.push(ArchiveEntry::new(
            "OEBPS/Text/extra.xhtml",
            r#"<link href="../Styles/%AA.css"/><a href="%BB.xhtml">x</a><img src="%CC.png"/>"#,
        ));
        let reporter = MemoryReporter::new();
        Pipeline::new(Layout::default())
            .with_reporter(&reporter)
            .run(&Archive::from_entries(entries))
            .unwrap();

        let info = reporter.messages(Stage::Audit, Level::Info);
        let errors = reporter.messages(Stage::Audit, Level::Error);
        let warnings = reporter.messages(Stage::Audit, Level::Warning);
        assert_eq!(info.len(), 1);
        assert!(info[0].contains("css files") && info[0].contains("[info]"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("xhtml files") && errors[0].contains("[critical]"));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("png files"));
    }

    #[test]
    fn missing_manifest_aborts() {
        let archive = Archive::from_entries(vec![ArchiveEntry::new("mimetype", "application/epub+zip")]);
        let err = Pipeline::new(Layout::default()).run(&archive).unwrap_err();
        assert!(matches!(err, EbookError::Manifest(_)));
    }
}
