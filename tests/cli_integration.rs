// CLI integration tests for document, render and font flows.
use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::Value;

const EXIT_USAGE: i32 = 2;
const EXIT_NOT_FOUND: i32 = 3;
const EXIT_UNAVAILABLE: i32 = 4;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_pdfapp");
    Command::new(exe)
}

fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

fn stderr_error(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text
        .lines()
        .rev()
        .find(|line| line.starts_with('{'))
        .expect("json error line");
    serde_json::from_str(line).expect("error json")
}

#[test]
fn default_document_prints_letter_defaults() {
    let output = cmd().arg("default-document").output().expect("run");
    assert!(output.status.success());
    let doc = parse_json(&output.stdout);
    assert_eq!(doc["Font"], "Adobe Garamond Pro");
    assert_eq!(doc["Text"], "Lorem Ipsum");
    assert_eq!(doc["FontSize"], "12pt");
    assert_eq!(doc["PageWidth"], "8.5\"");
    assert_eq!(doc["PageHeight"], "11\"");
    assert!(doc.get("id").is_none());
}

#[test]
fn render_default_writes_pdf_or_reports_unavailable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let out = temp.path().join("default.pdf");
    let output = cmd()
        .args(["render", "--default", "-o", out.to_str().unwrap()])
        .output()
        .expect("run");

    match output.status.code() {
        Some(0) => {
            let summary = parse_json(&output.stdout);
            let bytes = std::fs::read(&out).expect("pdf");
            assert!(bytes.starts_with(b"%PDF-"));
            assert_eq!(summary["rendered"]["bytes"].as_u64(), Some(bytes.len() as u64));
        }
        Some(EXIT_UNAVAILABLE) => {
            let err = stderr_error(&output.stderr);
            assert_eq!(err["error"]["kind"], "Unavailable");
            assert!(!out.exists(), "partial output must be removed");
        }
        other => panic!("unexpected exit {other:?}: {}", String::from_utf8_lossy(&output.stderr)),
    }
}

#[test]
fn render_reads_document_from_stdin() {
    let mut child = cmd()
        .args(["render", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(br#"{"Text":"From stdin","PageWidth":"4in","PageHeight":"6in"}"#)
        .expect("write");
    let output = child.wait_with_output().expect("wait");
    match output.status.code() {
        Some(0) => assert!(output.stdout.starts_with(b"%PDF-")),
        Some(EXIT_UNAVAILABLE) => {}
        other => panic!("unexpected exit {other:?}: {}", String::from_utf8_lossy(&output.stderr)),
    }
}

#[test]
fn render_rejects_invalid_document_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let doc = temp.path().join("bad.json");
    std::fs::write(&doc, r#"{"LeftMargin":"an inch"}"#).expect("write");
    let output = cmd()
        .args(["render", doc.to_str().unwrap(), "-o"])
        .arg(temp.path().join("bad.pdf"))
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(EXIT_USAGE));
    let err = stderr_error(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["path"].as_str().unwrap().ends_with("bad.json"));
}

#[test]
fn render_missing_stored_id_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = cmd()
        .arg("--store-dir")
        .arg(temp.path().join("docs"))
        .args(["render", "--id", "42"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(EXIT_NOT_FOUND));
    let err = stderr_error(&output.stderr);
    assert_eq!(err["error"]["kind"], "NotFound");
}

#[test]
fn render_requires_a_single_source() {
    let output = cmd().arg("render").output().expect("run");
    assert_eq!(output.status.code(), Some(EXIT_USAGE));
    let err = stderr_error(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert_eq!(err["error"]["hint"], "Try `pdfapp --help`.");
}

#[test]
fn fonts_lists_families_or_reports_unavailable() {
    let output = cmd().args(["fonts", "--json"]).output().expect("run");
    match output.status.code() {
        Some(0) => {
            let value = parse_json(&output.stdout);
            let families = value["families"].as_array().expect("families");
            let names = families
                .iter()
                .map(|family| family["name"].as_str().expect("name").to_string())
                .collect::<Vec<_>>();
            let mut sorted = names.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(names, sorted);
        }
        Some(EXIT_UNAVAILABLE) => {
            let err = stderr_error(&output.stderr);
            assert_eq!(err["error"]["kind"], "Unavailable");
            assert!(err["error"]["hint"].is_string());
        }
        other => panic!("unexpected exit {other:?}: {}", String::from_utf8_lossy(&output.stderr)),
    }
}

#[test]
fn completion_emits_a_script() {
    let output = cmd().args(["completion", "bash"]).output().expect("run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("pdfapp"));
}
