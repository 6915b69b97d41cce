//! CLI integration tests.

#![allow(deprecated)] // Command::cargo_bin deprecated for custom build-dir; still works for default

use std::io::{Cursor, Write};

use assert_cmd::Command;
use zip::write::SimpleFileOptions;

const OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <manifest>
    <item id="text0001" href="Text/%E6%96%87%E6%9C%AC.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
</package>"#;

const TOC: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml"><body>
<div><a href="%E6%96%87%E6%9C%AC.xhtml"><p>Preface</p></a></div>
</body></html>"#;

fn book() -> Vec<u8> {
    book_with_opf(OPF)
}

fn book_with_opf(opf: &str) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, data) in [
        ("mimetype", "application/epub+zip"),
        ("OEBPS/content.opf", opf),
        ("OEBPS/Text/TOC.xhtml", TOC),
        ("OEBPS/Text/文本.xhtml", "<html><body><h1>Preface</h1></body></html>"),
    ] {
        zip.start_file(path, SimpleFileOptions::default()).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn cmd(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("epub-unmangle").unwrap();
    // Keep the user's real config out of the way.
    cmd.env("XDG_CONFIG_HOME", config_home).env("HOME", config_home);
    cmd
}

#[test]
fn help_prints_and_exits_success() {
    let home = tempfile::tempdir().unwrap();
    cmd(home.path()).arg("--help").assert().success();
}

#[test]
fn fix_writes_prefixed_copy_next_to_input() {
    let home = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("novel.epub");
    std::fs::write(&input, book()).unwrap();

    cmd(home.path())
        .args(["fix", input.to_str().unwrap(), "--no-pause"])
        .assert()
        .success();

    let output = dir.path().join("[fixed]novel.epub");
    let mut archive = zip::ZipArchive::new(std::fs::File::open(&output).unwrap()).unwrap();
    assert!(archive.by_name("OEBPS/Text/text0001.xhtml").is_ok());
    assert!(archive.by_name("OEBPS/Text/文本.xhtml").is_err());
}

#[test]
fn fix_json_reports_mapping() {
    let home = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("novel.epub");
    let output = dir.path().join("out.epub");
    std::fs::write(&input, book()).unwrap();

    let out = cmd(home.path())
        .args(["--json", "fix", input.to_str().unwrap(), "-o", output.to_str().unwrap()])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    let summary: serde_json::Value = serde_json::from_str(stdout).unwrap();

    assert_eq!(summary["obfuscation_detected"], true);
    assert_eq!(summary["mapping"]["OEBPS/Text/文本.xhtml"]["canonical"], "text0001.xhtml");
    assert_eq!(summary["toc"]["status"], "clean");
    assert!(output.exists());
}

#[test]
fn mapping_lists_canonical_names() {
    let home = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("novel.epub");
    std::fs::write(&input, book()).unwrap();

    let out = cmd(home.path())
        .args(["mapping", input.to_str().unwrap()])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    assert!(stdout.contains("OEBPS/Text/文本.xhtml -> text0001.xhtml"));
}

#[test]
fn audit_json_is_valid() {
    let home = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("novel.epub");
    std::fs::write(&input, book()).unwrap();

    let out = cmd(home.path())
        .args(["audit", input.to_str().unwrap(), "--json"])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    let report: serde_json::Value = serde_json::from_str(stdout).unwrap();
    assert!(!report["findings"].as_array().unwrap().is_empty());
}

#[test]
fn fix_without_obfuscation_copies_input_and_says_so() {
    let home = tempfile::tempdir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plain.epub");
    let plain = book_with_opf(&OPF.replace("%E6%96%87%E6%9C%AC", "chapter0001"));
    std::fs::write(&input, &plain).unwrap();

    let out = cmd(home.path())
        .args(["fix", input.to_str().unwrap(), "--no-pause"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(out).unwrap();
    assert!(stdout.contains("possibly no fake DRM encryption"), "{stdout}");
    assert!(stdout.contains("unchanged copy"), "{stdout}");

    let copied = std::fs::read(dir.path().join("[fixed]plain.epub")).unwrap();
    assert_eq!(copied, plain);
}

#[test]
fn fix_nonexistent_file_fails() {
    let home = tempfile::tempdir().unwrap();
    let out = cmd(home.path())
        .args(["fix", "/nonexistent/file.epub", "--no-pause"])
        .assert()
        .failure()
        .code(1);
    let stderr = std::str::from_utf8(&out.get_output().stderr).unwrap();
    assert!(stderr.contains("Input file not found"));
}

#[test]
fn config_show_json_valid() {
    let home = tempfile::tempdir().unwrap();
    let out = cmd(home.path())
        .args(["config", "show", "--json"])
        .assert()
        .success();
    let stdout = std::str::from_utf8(&out.get_output().stdout).unwrap();
    let _: serde_json::Value =
        serde_json::from_str(stdout).expect("config show --json should output valid JSON");
}
