//! Purpose: Define the public Rust API boundary for pdfapp.
//! Exports: Surface, family, typesetting, document and store types plus errors.
//! Role: Stable, additive-only surface used by the CLI, the server and tests.
//! Invariants: This module is the only public path callers need; `core` layout may change.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::document::{Document, DocumentId};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::family::{FontFamilies, FontFamily, list_font_families};
pub use crate::core::length::{LENGTH_PATTERN, Length, LengthUnit};
pub use crate::core::native::Native;
pub use crate::core::store::{DocumentStore, FileStore, MemoryStore};
pub use crate::core::stream::{
    Canvas, PdfMetadata, PdfStreamSurface, PdfVersion, create_pdf_stream_surface,
};
pub use crate::core::text::{PdfTextWriter, TextObject, TypesettingProps};
