//! Purpose: Typeset plain text into a streamed PDF with pango layouts.
//! Exports: `TypesettingProps`, `TextObject`, `PdfTextWriter`.
//! Role: Line-by-line placement on top of `PdfStreamSurface`; pango does shaping and line breaking.
//! Invariants: Every value in `TypesettingProps` is in points.
//! Invariants: Line `i` of a paragraph sits on baseline `y + i * baseline_skip` until the page overflows.
//! Invariants: Pango objects created for a paragraph are released before `write_at` returns.
use std::ffi::CString;
use std::io::Write;
use std::os::raw::{c_int, c_void};
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::native::{Native, sys};
use crate::core::stream::{Canvas, PdfStreamSurface};

/// Page geometry and font settings, all in points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypesettingProps {
    pub font_name: String,
    pub font_size: f64,
    pub baseline_skip: f64,
    pub top_margin: f64,
    pub left_margin: f64,
    pub bottom_margin: f64,
    pub right_margin: f64,
    pub page_width: f64,
    pub page_height: f64,
}

impl TypesettingProps {
    /// Width available to a line between the side margins.
    pub fn text_width(&self) -> f64 {
        self.page_width - self.left_margin - self.right_margin
    }

    /// Baseline of the first line on a fresh page.
    pub fn first_baseline(&self) -> f64 {
        self.top_margin + self.font_size
    }

    /// Lowest baseline allowed before a page break, if the page has a height.
    pub fn last_baseline(&self) -> Option<f64> {
        (self.page_height > 0.0).then(|| self.page_height - self.bottom_margin)
    }

    /// Whether a line on `baseline` falls below the text block and a fresh page would hold it.
    pub fn breaks_page_at(&self, baseline: f64) -> bool {
        self.last_baseline()
            .is_some_and(|last| baseline > last && self.first_baseline() <= last)
    }
}

pub trait TextObject {
    /// Lays out `text` and draws it with the first baseline at (`x`, `y`).
    fn write_at(
        &mut self,
        text: &str,
        props: &TypesettingProps,
        x: f64,
        y: f64,
    ) -> Result<(), Error>;
}

/// Writes typeset text as PDF into `W`.
pub struct PdfTextWriter<W: Write> {
    surface: PdfStreamSurface<W>,
    pages: u32,
}

impl<W: Write> PdfTextWriter<W> {
    pub fn new(writer: W, width_pt: f64, height_pt: f64) -> Result<Self, Error> {
        Ok(Self {
            surface: PdfStreamSurface::create(writer, width_pt, height_pt)?,
            pages: 1,
        })
    }

    /// Pages started so far, including the current one.
    pub fn pages(&self) -> u32 {
        self.pages
    }

    pub fn surface_mut(&mut self) -> &mut PdfStreamSurface<W> {
        &mut self.surface
    }

    /// Closes the document and returns the writer.
    pub fn finish(self) -> Result<W, Error> {
        self.surface.finish()
    }
}

impl<W: Write> TextObject for PdfTextWriter<W> {
    fn write_at(
        &mut self,
        text: &str,
        props: &TypesettingProps,
        x: f64,
        y: f64,
    ) -> Result<(), Error> {
        let native = self.surface.native();
        let mut canvas = self.surface.canvas()?;
        let layout = ParagraphLayout::new(native, &canvas, text, props)?;

        canvas.set_source_rgb(0.0, 0.0, 0.0);
        let mut baseline = y;
        for index in 0..layout.line_count() {
            if index > 0 {
                baseline += props.baseline_skip;
            }
            if props.breaks_page_at(baseline) {
                canvas.show_page();
                self.pages += 1;
                baseline = props.first_baseline();
            }
            canvas.move_to(x, baseline);
            layout.show_line(&canvas, index);
        }
        tracing::debug!(
            lines = layout.line_count(),
            pages = self.pages,
            "typeset paragraph"
        );
        canvas.status()
    }
}

struct FontDescription {
    native: &'static Native,
    raw: NonNull<sys::PangoFontDescription>,
}

impl FontDescription {
    fn new(native: &'static Native, props: &TypesettingProps) -> Result<Self, Error> {
        let api = native.api();
        let family = CString::new(props.font_name.as_str()).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("font name contains a nul byte")
                .with_source(err)
        })?;
        let raw = NonNull::new(unsafe { (api.pango_font_description_new)() }).ok_or_else(|| {
            Error::new(ErrorKind::Native).with_message("pango_font_description_new returned null")
        })?;
        let description = Self { native, raw };
        unsafe {
            (api.pango_font_description_set_family)(description.raw.as_ptr(), family.as_ptr());
            (api.pango_font_description_set_weight)(
                description.raw.as_ptr(),
                sys::PANGO_WEIGHT_NORMAL,
            );
            (api.pango_font_description_set_absolute_size)(
                description.raw.as_ptr(),
                props.font_size * f64::from(sys::PANGO_SCALE),
            );
        }
        Ok(description)
    }
}

impl Drop for FontDescription {
    fn drop(&mut self) {
        unsafe { (self.native.api().pango_font_description_free)(self.raw.as_ptr()) };
    }
}

struct ParagraphLayout {
    native: &'static Native,
    raw: NonNull<sys::PangoLayout>,
    lines: c_int,
}

impl ParagraphLayout {
    fn new(
        native: &'static Native,
        canvas: &Canvas<'_>,
        text: &str,
        props: &TypesettingProps,
    ) -> Result<Self, Error> {
        let api = native.api();
        let text = CString::new(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("text contains a nul byte")
                .with_source(err)
        })?;
        let description = FontDescription::new(native, props)?;
        let raw = NonNull::new(unsafe { (api.pango_cairo_create_layout)(canvas.as_ptr()) })
            .ok_or_else(|| {
                Error::new(ErrorKind::Native).with_message("pango_cairo_create_layout returned null")
            })?;
        let mut layout = Self {
            native,
            raw,
            lines: 0,
        };

        let width = props.text_width();
        let pango_width = if width > 0.0 {
            (width * f64::from(sys::PANGO_SCALE)) as c_int
        } else {
            -1
        };
        unsafe {
            (api.pango_layout_set_font_description)(layout.raw.as_ptr(), description.raw.as_ptr());
            (api.pango_layout_set_width)(layout.raw.as_ptr(), pango_width);
            (api.pango_layout_set_justify)(layout.raw.as_ptr(), 1);
            (api.pango_layout_set_text)(layout.raw.as_ptr(), text.as_ptr(), -1);
            layout.lines = (api.pango_layout_get_line_count)(layout.raw.as_ptr());
        }
        Ok(layout)
    }

    fn line_count(&self) -> c_int {
        self.lines
    }

    fn show_line(&self, canvas: &Canvas<'_>, index: c_int) {
        let api = self.native.api();
        let line = unsafe { (api.pango_layout_get_line_readonly)(self.raw.as_ptr(), index) };
        if line.is_null() {
            return;
        }
        unsafe { (api.pango_cairo_show_layout_line)(canvas.as_ptr(), line) };
    }
}

impl Drop for ParagraphLayout {
    fn drop(&mut self) {
        unsafe { (self.native.api().g_object_unref)(self.raw.as_ptr() as *mut c_void) };
    }
}
