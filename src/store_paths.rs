//! Purpose: Default document-store location and per-id document paths.
//! Exports: `default_store_dir`, `resolve_document_ref`.
//! Role: Keep CLI path semantics for `--store-dir` and `render` arguments in one place.
//! Invariants: Default store directory remains `~/.pdfapp/documents`.
//! Invariants: `-` always means stdin, never a file named `-`.

use std::path::{Path, PathBuf};

pub(crate) fn default_store_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".pdfapp").join("documents")
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum DocumentRef<'a> {
    Stdin,
    File(&'a Path),
}

pub(crate) fn resolve_document_ref(path: &Path) -> DocumentRef<'_> {
    if path.as_os_str() == "-" {
        DocumentRef::Stdin
    } else {
        DocumentRef::File(path)
    }
}
