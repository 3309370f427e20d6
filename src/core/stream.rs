//! Purpose: PDF surfaces that deliver their bytes to an in-process `io::Write` sink.
//! Exports: `PdfStreamSurface`, `Canvas`, `PdfMetadata`, `PdfVersion`, `create_pdf_stream_surface`.
//! Role: Adapts a Rust writer into the C write callback cairo expects for stream surfaces.
//! Invariants: The sink lives on the heap at a fixed address for the whole life of the surface.
//! Invariants: Each chunk emitted by cairo is handed to the sink exactly once, in order.
//! Invariants: Teardown order is context, then surface, then sink; the surface may still write while finishing.
//! Invariants: Panics in the sink never unwind into cairo; they are reported as write errors.
use std::ffi::CString;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::os::raw::{c_uchar, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;

use crate::core::error::{Error, ErrorKind};
use crate::core::native::{Native, sys};

/// PDF versions cairo can be restricted to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PdfVersion {
    V1_4,
    V1_5,
}

impl PdfVersion {
    fn to_raw(self) -> sys::cairo_pdf_version_t {
        match self {
            PdfVersion::V1_4 => sys::CAIRO_PDF_VERSION_1_4,
            PdfVersion::V1_5 => sys::CAIRO_PDF_VERSION_1_5,
        }
    }
}

/// Document-information entries cairo writes into the PDF.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PdfMetadata {
    Title,
    Author,
    Subject,
    Keywords,
    Creator,
    /// ISO 8601 date; cairo stamps the current time when unset.
    CreateDate,
    ModDate,
}

impl PdfMetadata {
    fn to_raw(self) -> sys::cairo_pdf_metadata_t {
        match self {
            PdfMetadata::Title => sys::CAIRO_PDF_METADATA_TITLE,
            PdfMetadata::Author => sys::CAIRO_PDF_METADATA_AUTHOR,
            PdfMetadata::Subject => sys::CAIRO_PDF_METADATA_SUBJECT,
            PdfMetadata::Keywords => sys::CAIRO_PDF_METADATA_KEYWORDS,
            PdfMetadata::Creator => sys::CAIRO_PDF_METADATA_CREATOR,
            PdfMetadata::CreateDate => sys::CAIRO_PDF_METADATA_CREATE_DATE,
            PdfMetadata::ModDate => sys::CAIRO_PDF_METADATA_MOD_DATE,
        }
    }
}

struct StreamSink<W> {
    writer: W,
    failure: Option<io::Error>,
    chunks: u64,
    bytes: u64,
}

/// A cairo PDF surface writing into `W`.
pub struct PdfStreamSurface<W: Write> {
    native: &'static Native,
    surface: NonNull<sys::cairo_surface_t>,
    context: Option<NonNull<sys::cairo_t>>,
    sink: NonNull<StreamSink<W>>,
}

/// Creates a PDF surface of `width_pt` x `height_pt` points whose output goes to `closure`.
///
/// The page size is passed to cairo unchanged; if cairo rejects it the returned
/// error carries cairo's own status.
pub fn create_pdf_stream_surface<W: Write>(
    closure: W,
    width_pt: f64,
    height_pt: f64,
) -> Result<PdfStreamSurface<W>, Error> {
    PdfStreamSurface::create(closure, width_pt, height_pt)
}

unsafe extern "C" fn write_to_stream<W: Write>(
    closure: *mut c_void,
    data: *const c_uchar,
    length: c_uint,
) -> sys::cairo_status_t {
    // cairo hands back the pointer registered in `PdfStreamSurface::create`.
    let sink = unsafe { &mut *(closure as *mut StreamSink<W>) };
    if sink.failure.is_some() {
        return sys::CAIRO_STATUS_WRITE_ERROR;
    }
    let chunk: &[u8] = if data.is_null() || length == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, length as usize) }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| sink.writer.write_all(chunk))) {
        Ok(Ok(())) => {
            sink.chunks += 1;
            sink.bytes += chunk.len() as u64;
            sys::CAIRO_STATUS_SUCCESS
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, bytes = chunk.len(), "pdf sink write failed");
            sink.failure = Some(err);
            sys::CAIRO_STATUS_WRITE_ERROR
        }
        Err(_) => {
            tracing::warn!(bytes = chunk.len(), "pdf sink panicked");
            sink.failure = Some(io::Error::other("pdf sink panicked"));
            sys::CAIRO_STATUS_WRITE_ERROR
        }
    }
}

impl<W: Write> PdfStreamSurface<W> {
    pub fn create(writer: W, width_pt: f64, height_pt: f64) -> Result<Self, Error> {
        let native = Native::get()?;
        let api = native.api();
        let sink = Box::into_raw(Box::new(StreamSink {
            writer,
            failure: None,
            chunks: 0,
            bytes: 0,
        }));

        let raw = unsafe {
            (api.cairo_pdf_surface_create_for_stream)(
                Some(write_to_stream::<W>),
                sink as *mut c_void,
                width_pt,
                height_pt,
            )
        };
        let status = match NonNull::new(raw) {
            Some(surface) => unsafe { (api.cairo_surface_status)(surface.as_ptr()) },
            None => sys::CAIRO_STATUS_NO_MEMORY,
        };
        if status != sys::CAIRO_STATUS_SUCCESS {
            if !raw.is_null() {
                unsafe { (api.cairo_surface_destroy)(raw) };
            }
            drop(unsafe { Box::from_raw(sink) });
            return Err(native
                .status_error(status, "failed to create pdf stream surface")
                .with_hint("Check that the page size is positive."));
        }

        tracing::debug!(width_pt, height_pt, "created pdf stream surface");
        Ok(Self {
            native,
            surface: unsafe { NonNull::new_unchecked(raw) },
            context: None,
            sink: unsafe { NonNull::new_unchecked(sink) },
        })
    }

    /// Restricts the output to `version`; must be called before anything is drawn.
    pub fn restrict_to_version(&mut self, version: PdfVersion) -> Result<(), Error> {
        if self.context.is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("pdf version must be set before drawing"));
        }
        unsafe {
            (self.native.api().cairo_pdf_surface_restrict_to_version)(
                self.surface.as_ptr(),
                version.to_raw(),
            )
        };
        self.status()
    }

    /// Sets a document-information entry; may be called any time before `finish`.
    pub fn set_metadata(&mut self, key: PdfMetadata, value: &str) -> Result<(), Error> {
        let value = CString::new(value).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("pdf metadata contains a nul byte")
                .with_source(err)
        })?;
        unsafe {
            (self.native.api().cairo_pdf_surface_set_metadata)(
                self.surface.as_ptr(),
                key.to_raw(),
                value.as_ptr(),
            )
        };
        self.status()
    }

    /// Drawing context for this surface; created on first use and kept until finish.
    pub fn canvas(&mut self) -> Result<Canvas<'_>, Error> {
        let context = match self.context {
            Some(context) => context,
            None => {
                let native = self.native;
                let api = native.api();
                let raw = unsafe { (api.cairo_create)(self.surface.as_ptr()) };
                let Some(context) = NonNull::new(raw) else {
                    return Err(Error::new(ErrorKind::Native)
                        .with_message("cairo_create returned null"));
                };
                let status = unsafe { (api.cairo_status)(context.as_ptr()) };
                if status != sys::CAIRO_STATUS_SUCCESS {
                    unsafe { (api.cairo_destroy)(context.as_ptr()) };
                    return Err(native.status_error(status, "failed to create context"));
                }
                self.context = Some(context);
                context
            }
        };
        Ok(Canvas {
            native: self.native,
            context,
            _surface: PhantomData,
        })
    }

    /// Current surface status, as reported by cairo.
    pub fn status(&self) -> Result<(), Error> {
        let status = unsafe { (self.native.api().cairo_surface_status)(self.surface.as_ptr()) };
        if status == sys::CAIRO_STATUS_SUCCESS {
            Ok(())
        } else {
            Err(self.native.status_error(status, "pdf surface in error state"))
        }
    }

    /// Number of chunks delivered to the sink so far.
    pub fn chunks_written(&self) -> u64 {
        unsafe { self.sink.as_ref() }.chunks
    }

    /// Number of bytes delivered to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        unsafe { self.sink.as_ref() }.bytes
    }

    pub(crate) fn native(&self) -> &'static Native {
        self.native
    }

    /// Finishes the document, flushes the sink and hands it back.
    pub fn finish(self) -> Result<W, Error> {
        let mut this = std::mem::ManuallyDrop::new(self);
        let native = this.native;
        let api = native.api();
        this.release_context();
        unsafe { (api.cairo_surface_finish)(this.surface.as_ptr()) };
        let status = unsafe { (api.cairo_surface_status)(this.surface.as_ptr()) };
        unsafe { (api.cairo_surface_destroy)(this.surface.as_ptr()) };
        let mut sink = unsafe { Box::from_raw(this.sink.as_ptr()) };

        if let Some(err) = sink.failure.take() {
            return Err(Error::new(ErrorKind::Io)
                .with_message("failed to write pdf stream")
                .with_source(err));
        }
        if status != sys::CAIRO_STATUS_SUCCESS {
            return Err(native.status_error(status, "failed to finish pdf surface"));
        }
        sink.writer.flush().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to flush pdf stream")
                .with_source(err)
        })?;
        tracing::debug!(chunks = sink.chunks, bytes = sink.bytes, "finished pdf stream surface");
        Ok(sink.writer)
    }

    fn release_context(&mut self) {
        if let Some(context) = self.context.take() {
            unsafe { (self.native.api().cairo_destroy)(context.as_ptr()) };
        }
    }
}

impl<W: Write> Drop for PdfStreamSurface<W> {
    fn drop(&mut self) {
        self.release_context();
        unsafe { (self.native.api().cairo_surface_destroy)(self.surface.as_ptr()) };
        drop(unsafe { Box::from_raw(self.sink.as_ptr()) });
    }
}

/// Borrowed drawing context of a `PdfStreamSurface`.
pub struct Canvas<'s> {
    native: &'static Native,
    context: NonNull<sys::cairo_t>,
    _surface: PhantomData<&'s mut ()>,
}

impl Canvas<'_> {
    pub fn set_source_rgb(&mut self, red: f64, green: f64, blue: f64) {
        unsafe { (self.native.api().cairo_set_source_rgb)(self.context.as_ptr(), red, green, blue) };
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        unsafe { (self.native.api().cairo_move_to)(self.context.as_ptr(), x, y) };
    }

    pub fn rectangle(&mut self, x: f64, y: f64, width: f64, height: f64) {
        unsafe {
            (self.native.api().cairo_rectangle)(self.context.as_ptr(), x, y, width, height)
        };
    }

    pub fn fill(&mut self) {
        unsafe { (self.native.api().cairo_fill)(self.context.as_ptr()) };
    }

    /// Emits the current page and starts a new one.
    pub fn show_page(&mut self) {
        unsafe { (self.native.api().cairo_show_page)(self.context.as_ptr()) };
    }

    pub fn status(&self) -> Result<(), Error> {
        let status = unsafe { (self.native.api().cairo_status)(self.context.as_ptr()) };
        if status == sys::CAIRO_STATUS_SUCCESS {
            Ok(())
        } else {
            Err(self.native.status_error(status, "drawing failed"))
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut sys::cairo_t {
        self.context.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::{Canvas, PdfMetadata, PdfVersion, create_pdf_stream_surface};
    use crate::core::error::ErrorKind;
    use crate::core::native::{Native, sys};
    use std::ffi::CString;
    use std::marker::PhantomData;
    use std::ptr::NonNull;
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    fn native_available() -> bool {
        Native::is_available()
    }

    fn draw_letter_page(bytes: Vec<u8>) -> Vec<u8> {
        let mut surface = create_pdf_stream_surface(bytes, 612.0, 792.0).expect("surface");
        {
            let mut canvas = surface.canvas().expect("canvas");
            canvas.set_source_rgb(0.2, 0.4, 0.6);
            canvas.rectangle(72.0, 72.0, 200.0, 100.0);
            canvas.fill();
            canvas.status().expect("canvas status");
        }
        surface.finish().expect("finish")
    }

    #[test]
    fn letter_page_streams_a_complete_pdf() {
        if !native_available() {
            return;
        }
        let bytes = draw_letter_page(Vec::new());
        assert!(bytes.starts_with(b"%PDF-"), "missing pdf header");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.trim_end().ends_with("%%EOF"), "missing pdf trailer");
    }

    const PINNED_DATE: &str = "2020-02-02T12:00:00Z";

    fn paint(canvas: &mut Canvas<'_>) {
        canvas.set_source_rgb(0.8, 0.1, 0.1);
        canvas.rectangle(72.0, 72.0, 468.0, 648.0);
        canvas.fill();
        canvas.show_page();
        canvas.set_source_rgb(0.0, 0.0, 0.5);
        canvas.rectangle(100.0, 100.0, 50.0, 50.0);
        canvas.fill();
    }

    fn render_through_file(native: &'static Native, path: &std::path::Path) {
        let api = native.api();
        let c_path = CString::new(path.to_str().expect("utf8 path")).expect("c path");
        let date = CString::new(PINNED_DATE).expect("date");
        let surface = unsafe { (api.cairo_pdf_surface_create)(c_path.as_ptr(), 612.0, 792.0) };
        assert_eq!(unsafe { (api.cairo_surface_status)(surface) }, sys::CAIRO_STATUS_SUCCESS);
        unsafe {
            (api.cairo_pdf_surface_set_metadata)(
                surface,
                sys::CAIRO_PDF_METADATA_CREATE_DATE,
                date.as_ptr(),
            )
        };
        let context = NonNull::new(unsafe { (api.cairo_create)(surface) }).expect("context");
        {
            let mut canvas = Canvas {
                native,
                context,
                _surface: PhantomData,
            };
            paint(&mut canvas);
            canvas.status().expect("canvas status");
        }
        unsafe {
            (api.cairo_destroy)(context.as_ptr());
            (api.cairo_surface_finish)(surface);
            assert_eq!((api.cairo_surface_status)(surface), sys::CAIRO_STATUS_SUCCESS);
            (api.cairo_surface_destroy)(surface);
        }
    }

    #[test]
    fn streamed_bytes_match_the_file_surface_exactly() {
        let Ok(native) = Native::get() else {
            return;
        };
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("file-surface.pdf");
        render_through_file(native, &path);
        let from_file = std::fs::read(&path).expect("read file surface");

        let mut surface = create_pdf_stream_surface(Vec::new(), 612.0, 792.0).expect("surface");
        surface
            .set_metadata(PdfMetadata::CreateDate, PINNED_DATE)
            .expect("metadata");
        {
            let mut canvas = surface.canvas().expect("canvas");
            paint(&mut canvas);
        }
        let streamed = surface.finish().expect("finish");

        assert!(streamed.starts_with(b"%PDF-"));
        assert_eq!(streamed.len(), from_file.len());
        assert!(streamed == from_file, "stream and file surfaces differ");
    }

    #[test]
    fn metadata_with_nul_is_rejected() {
        if !native_available() {
            return;
        }
        let mut surface = create_pdf_stream_surface(Vec::new(), 612.0, 792.0).expect("surface");
        let err = surface
            .set_metadata(PdfMetadata::Title, "bad\0title")
            .expect_err("nul");
        assert_eq!(err.kind(), ErrorKind::Usage);
        surface
            .set_metadata(PdfMetadata::Title, "Quarterly report")
            .expect("title");
        let bytes = surface.finish().expect("finish");
        assert!(String::from_utf8_lossy(&bytes).contains("Quarterly report"));
    }

    #[test]
    fn sink_keeps_bytes_written_before_the_surface() {
        if !native_available() {
            return;
        }
        let bytes = draw_letter_page(b"prefix".to_vec());
        assert!(bytes.starts_with(b"prefix%PDF-"));
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        calls: Rc<RefCell<Vec<usize>>>,
        data: Rc<RefCell<Vec<u8>>>,
    }

    impl Write for RecordingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls.borrow_mut().push(buf.len());
            self.data.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn every_chunk_reaches_the_sink_in_order() {
        if !native_available() {
            return;
        }
        let sink = RecordingSink::default();
        let mut surface = create_pdf_stream_surface(sink.clone(), 612.0, 792.0).expect("surface");
        {
            let mut canvas = surface.canvas().expect("canvas");
            canvas.rectangle(0.0, 0.0, 10.0, 10.0);
            canvas.fill();
        }
        surface.status().expect("status");
        let before_finish = surface.bytes_written();
        let returned = surface.finish().expect("finish");

        let calls = returned.calls.borrow();
        assert!(!calls.is_empty(), "sink was never called");
        let total: usize = calls.iter().sum();
        assert_eq!(total, sink.data.borrow().len());
        assert!(total as u64 >= before_finish);
        assert!(sink.data.borrow().starts_with(b"%PDF-"));
    }

    #[test]
    fn counters_track_delivered_bytes() {
        if !native_available() {
            return;
        }
        let mut surface = create_pdf_stream_surface(Vec::new(), 200.0, 200.0).expect("surface");
        {
            let mut canvas = surface.canvas().expect("canvas");
            canvas.rectangle(10.0, 10.0, 50.0, 50.0);
            canvas.fill();
            canvas.show_page();
        }
        let chunks = surface.chunks_written();
        let bytes = surface.bytes_written();
        let out = surface.finish().expect("finish");
        assert!(out.len() as u64 >= bytes);
        assert!(chunks <= out.len() as u64);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_reported_by_finish() {
        if !native_available() {
            return;
        }
        let mut surface = create_pdf_stream_surface(FailingSink, 612.0, 792.0).expect("surface");
        {
            let mut canvas = surface.canvas().expect("canvas");
            canvas.rectangle(0.0, 0.0, 10.0, 10.0);
            canvas.fill();
        }
        let err = surface.finish().err().expect("finish should fail");
        assert_eq!(err.kind(), ErrorKind::Io);
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "closed");
    }

    struct PanickingSink;

    impl Write for PanickingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            panic!("sink exploded");
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_panic_becomes_write_error() {
        if !native_available() {
            return;
        }
        let mut surface = create_pdf_stream_surface(PanickingSink, 612.0, 792.0).expect("surface");
        {
            let mut canvas = surface.canvas().expect("canvas");
            canvas.rectangle(0.0, 0.0, 10.0, 10.0);
            canvas.fill();
        }
        let err = surface.finish().err().expect("finish should fail");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn dropping_an_unfinished_surface_still_flushes_into_the_sink() {
        if !native_available() {
            return;
        }
        let sink = RecordingSink::default();
        {
            let mut surface =
                create_pdf_stream_surface(sink.clone(), 300.0, 300.0).expect("surface");
            let mut canvas = surface.canvas().expect("canvas");
            canvas.rectangle(0.0, 0.0, 10.0, 10.0);
            canvas.fill();
        }
        let data = sink.data.borrow();
        assert!(data.starts_with(b"%PDF-"));
    }

    #[test]
    fn restricted_version_shows_in_header() {
        if !native_available() {
            return;
        }
        let mut surface = create_pdf_stream_surface(Vec::new(), 612.0, 792.0).expect("surface");
        surface
            .restrict_to_version(PdfVersion::V1_4)
            .expect("restrict");
        {
            let mut canvas = surface.canvas().expect("canvas");
            canvas.rectangle(0.0, 0.0, 10.0, 10.0);
            canvas.fill();
        }
        let bytes = surface.finish().expect("finish");
        assert!(bytes.starts_with(b"%PDF-1.4"));
    }

    #[test]
    fn version_cannot_change_after_drawing_starts() {
        if !native_available() {
            return;
        }
        let mut surface = create_pdf_stream_surface(Vec::new(), 612.0, 792.0).expect("surface");
        drop(surface.canvas().expect("canvas"));
        let err = surface
            .restrict_to_version(PdfVersion::V1_5)
            .expect_err("should refuse");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn negative_page_size_follows_cairo_contract() {
        if !native_available() {
            return;
        }
        match create_pdf_stream_surface(Vec::new(), -1.0, 792.0) {
            Ok(surface) => {
                let _ = surface.finish();
            }
            Err(err) => assert_eq!(err.kind(), ErrorKind::Native),
        }
    }

    #[test]
    fn missing_libraries_surface_as_unavailable() {
        if native_available() {
            return;
        }
        let err = create_pdf_stream_surface(Vec::new(), 612.0, 792.0)
            .err()
            .expect("should fail without native libraries");
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.hint().is_some());
    }
}
