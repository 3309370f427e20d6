//! Purpose: Library crate behind the `pdfapp` CLI and document service.
//! Exports: `core` (native bindings, typesetting, documents, storage, errors) and `api`.
//! Role: Rust surface over cairo's PDF stream surfaces and pango's font enumeration.
//! Invariants: Native libraries are loaded at runtime; nothing here links against them.
//! Invariants: Raw pointers never leave `core`; callers see owned or borrowed safe handles.
pub mod api;
pub mod core;
