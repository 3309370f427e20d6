//! Purpose: Checked access to the font-family array produced by pango's family enumeration.
//! Exports: `FontFamilies`, `FontFamily`, `list_font_families`.
//! Role: Owns the `g_malloc`ed handle array for the duration of a view; families stay owned by the font map.
//! Invariants: `family_at` never reads outside `[0, len)`; out-of-range indexes are `Usage` errors.
//! Invariants: Family handles borrow the view and cannot outlive it.
use std::marker::PhantomData;
use std::os::raw::{c_int, c_void};
use std::ptr::{self, NonNull};

use crate::core::error::{Error, ErrorKind};
use crate::core::native::{Native, c_string_lossy, sys};

/// The families known to pango's default cairo font map, in font-map order.
pub struct FontFamilies {
    native: &'static Native,
    array: *mut *mut sys::PangoFontFamily,
    len: usize,
}

impl FontFamilies {
    pub fn enumerate() -> Result<Self, Error> {
        let native = Native::get()?;
        let api = native.api();
        let fontmap = unsafe { (api.pango_cairo_font_map_get_default)() };
        if fontmap.is_null() {
            return Err(Error::new(ErrorKind::Native)
                .with_message("pango has no default cairo font map"));
        }

        let mut array: *mut *mut sys::PangoFontFamily = ptr::null_mut();
        let mut count: c_int = 0;
        unsafe { (api.pango_font_map_list_families)(fontmap, &mut array, &mut count) };
        let len = usize::try_from(count).unwrap_or(0);
        tracing::debug!(families = len, "enumerated font families");
        Ok(Self { native, array, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the family at `index`.
    pub fn family_at(&self, index: i32) -> Result<FontFamily<'_>, Error> {
        let position = checked_index(index, self.len)?;
        self.entry(position)
    }

    /// Every entry in array order; item `i` is exactly what `family_at(i)` returns.
    pub fn iter(&self) -> impl Iterator<Item = Result<FontFamily<'_>, Error>> + '_ {
        (0..self.len).map(move |position| self.entry(position))
    }

    /// Family names in font-map order.
    pub fn names(&self) -> Result<Vec<String>, Error> {
        self.iter().map(|family| family.map(|family| family.name())).collect()
    }

    fn handles(&self) -> &[*mut sys::PangoFontFamily] {
        if self.array.is_null() || self.len == 0 {
            return &[];
        }
        // pango reports the element count alongside the array it allocated.
        unsafe { std::slice::from_raw_parts(self.array, self.len) }
    }

    fn entry(&self, position: usize) -> Result<FontFamily<'_>, Error> {
        let handle = handle_at(self.handles(), position)?;
        Ok(FontFamily {
            native: self.native,
            handle,
            _families: PhantomData,
        })
    }
}

fn handle_at(
    handles: &[*mut sys::PangoFontFamily],
    position: usize,
) -> Result<NonNull<sys::PangoFontFamily>, Error> {
    let raw = handles.get(position).copied().unwrap_or(ptr::null_mut());
    NonNull::new(raw).ok_or_else(|| {
        Error::new(ErrorKind::Native)
            .with_message("font family array holds a null entry")
            .with_index(i64::try_from(position).unwrap_or(i64::MAX))
    })
}

impl Drop for FontFamilies {
    fn drop(&mut self) {
        if !self.array.is_null() {
            unsafe { (self.native.api().g_free)(self.array as *mut c_void) };
        }
    }
}

/// One entry of a `FontFamilies` view.
#[derive(Clone, Copy)]
pub struct FontFamily<'a> {
    native: &'static Native,
    handle: NonNull<sys::PangoFontFamily>,
    _families: PhantomData<&'a FontFamilies>,
}

impl FontFamily<'_> {
    pub fn name(&self) -> String {
        let ptr = unsafe { (self.native.api().pango_font_family_get_name)(self.handle.as_ptr()) };
        c_string_lossy(ptr)
    }

    pub fn is_monospace(&self) -> bool {
        unsafe { (self.native.api().pango_font_family_is_monospace)(self.handle.as_ptr()) != 0 }
    }

    /// Identity of the underlying pango object.
    pub fn as_ptr(&self) -> *const c_void {
        self.handle.as_ptr() as *const c_void
    }
}

impl PartialEq for FontFamily<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for FontFamily<'_> {}

impl std::fmt::Debug for FontFamily<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFamily")
            .field("name", &self.name())
            .finish()
    }
}

/// Names of every family available to the default font map.
pub fn list_font_families() -> Result<Vec<String>, Error> {
    let families = FontFamilies::enumerate()?;
    let count = i32::try_from(families.len()).map_err(|_| {
        Error::new(ErrorKind::Internal).with_message("font family count exceeds i32")
    })?;
    let mut names = Vec::with_capacity(families.len());
    for index in 0..count {
        names.push(families.family_at(index)?.name());
    }
    Ok(names)
}

fn checked_index(index: i32, len: usize) -> Result<usize, Error> {
    match usize::try_from(index) {
        Ok(position) if position < len => Ok(position),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("family index out of range (len {len})"))
            .with_index(i64::from(index))),
    }
}
