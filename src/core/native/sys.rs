// Raw types and the runtime-resolved function table for cairo, pango and glib.
#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_double, c_int, c_uchar, c_uint, c_void};

use super::Libraries;
use crate::core::error::Error;

#[repr(C)]
pub struct cairo_surface_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct cairo_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct PangoFontMap {
    _private: [u8; 0],
}

#[repr(C)]
pub struct PangoFontFamily {
    _private: [u8; 0],
}

#[repr(C)]
pub struct PangoFontDescription {
    _private: [u8; 0],
}

#[repr(C)]
pub struct PangoLayout {
    _private: [u8; 0],
}

#[repr(C)]
pub struct PangoLayoutLine {
    _private: [u8; 0],
}

pub type cairo_status_t = c_int;
pub type cairo_pdf_version_t = c_int;
pub type gboolean = c_int;

pub type cairo_write_func_t =
    Option<unsafe extern "C" fn(*mut c_void, *const c_uchar, c_uint) -> cairo_status_t>;

pub const CAIRO_STATUS_SUCCESS: cairo_status_t = 0;
pub const CAIRO_STATUS_NO_MEMORY: cairo_status_t = 1;
pub const CAIRO_STATUS_WRITE_ERROR: cairo_status_t = 11;

pub const CAIRO_PDF_VERSION_1_4: cairo_pdf_version_t = 0;
pub const CAIRO_PDF_VERSION_1_5: cairo_pdf_version_t = 1;

pub type cairo_pdf_metadata_t = c_int;

pub const CAIRO_PDF_METADATA_TITLE: cairo_pdf_metadata_t = 0;
pub const CAIRO_PDF_METADATA_AUTHOR: cairo_pdf_metadata_t = 1;
pub const CAIRO_PDF_METADATA_SUBJECT: cairo_pdf_metadata_t = 2;
pub const CAIRO_PDF_METADATA_KEYWORDS: cairo_pdf_metadata_t = 3;
pub const CAIRO_PDF_METADATA_CREATOR: cairo_pdf_metadata_t = 4;
pub const CAIRO_PDF_METADATA_CREATE_DATE: cairo_pdf_metadata_t = 5;
pub const CAIRO_PDF_METADATA_MOD_DATE: cairo_pdf_metadata_t = 6;

pub const PANGO_SCALE: c_int = 1024;
pub const PANGO_WEIGHT_NORMAL: c_int = 400;

macro_rules! native_api {
    ($($lib:ident => { $(fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;)* })*) => {
        pub struct NativeApi {
            $($(pub $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?,)*)*
        }

        impl NativeApi {
            pub(super) fn resolve(libs: &Libraries) -> Result<Self, Error> {
                Ok(Self {
                    $($($name: {
                        let symbol = libs.$lib.symbol(concat!(stringify!($name), "\0"))?;
                        // The symbol was resolved by name from the library that declares it.
                        unsafe {
                            std::mem::transmute::<*mut c_void, unsafe extern "C" fn($($ty),*) $(-> $ret)?>(symbol)
                        }
                    },)*)*
                })
            }
        }
    };
}

native_api! {
    cairo => {
        fn cairo_version_string() -> *const c_char;
        fn cairo_status_to_string(status: cairo_status_t) -> *const c_char;
        fn cairo_pdf_surface_create_for_stream(
            write_func: cairo_write_func_t,
            closure: *mut c_void,
            width_in_points: c_double,
            height_in_points: c_double,
        ) -> *mut cairo_surface_t;
        fn cairo_pdf_surface_create(
            filename: *const c_char,
            width_in_points: c_double,
            height_in_points: c_double,
        ) -> *mut cairo_surface_t;
        fn cairo_pdf_surface_set_metadata(
            surface: *mut cairo_surface_t,
            metadata: cairo_pdf_metadata_t,
            utf8: *const c_char,
        );
        fn cairo_pdf_surface_restrict_to_version(
            surface: *mut cairo_surface_t,
            version: cairo_pdf_version_t,
        );
        fn cairo_surface_status(surface: *mut cairo_surface_t) -> cairo_status_t;
        fn cairo_surface_finish(surface: *mut cairo_surface_t);
        fn cairo_surface_destroy(surface: *mut cairo_surface_t);
        fn cairo_create(target: *mut cairo_surface_t) -> *mut cairo_t;
        fn cairo_destroy(cr: *mut cairo_t);
        fn cairo_status(cr: *mut cairo_t) -> cairo_status_t;
        fn cairo_set_source_rgb(cr: *mut cairo_t, red: c_double, green: c_double, blue: c_double);
        fn cairo_move_to(cr: *mut cairo_t, x: c_double, y: c_double);
        fn cairo_rectangle(
            cr: *mut cairo_t,
            x: c_double,
            y: c_double,
            width: c_double,
            height: c_double,
        );
        fn cairo_fill(cr: *mut cairo_t);
        fn cairo_show_page(cr: *mut cairo_t);
    }
    glib => {
        fn g_free(mem: *mut c_void);
    }
    gobject => {
        fn g_object_unref(object: *mut c_void);
    }
    pango => {
        fn pango_font_map_list_families(
            fontmap: *mut PangoFontMap,
            families: *mut *mut *mut PangoFontFamily,
            n_families: *mut c_int,
        );
        fn pango_font_family_get_name(family: *mut PangoFontFamily) -> *const c_char;
        fn pango_font_family_is_monospace(family: *mut PangoFontFamily) -> gboolean;
        fn pango_font_description_new() -> *mut PangoFontDescription;
        fn pango_font_description_free(desc: *mut PangoFontDescription);
        fn pango_font_description_set_family(desc: *mut PangoFontDescription, family: *const c_char);
        fn pango_font_description_set_weight(desc: *mut PangoFontDescription, weight: c_int);
        fn pango_font_description_set_absolute_size(desc: *mut PangoFontDescription, size: c_double);
        fn pango_layout_set_font_description(
            layout: *mut PangoLayout,
            desc: *const PangoFontDescription,
        );
        fn pango_layout_set_width(layout: *mut PangoLayout, width: c_int);
        fn pango_layout_set_justify(layout: *mut PangoLayout, justify: gboolean);
        fn pango_layout_set_text(layout: *mut PangoLayout, text: *const c_char, length: c_int);
        fn pango_layout_get_line_count(layout: *mut PangoLayout) -> c_int;
        fn pango_layout_get_line_readonly(layout: *mut PangoLayout, line: c_int) -> *mut PangoLayoutLine;
    }
    pangocairo => {
        fn pango_cairo_font_map_get_default() -> *mut PangoFontMap;
        fn pango_cairo_create_layout(cr: *mut cairo_t) -> *mut PangoLayout;
        fn pango_cairo_show_layout_line(cr: *mut cairo_t, line: *mut PangoLayoutLine);
    }
}
