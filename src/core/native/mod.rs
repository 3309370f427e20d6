//! Purpose: Locate and open the cairo/pango shared libraries and expose one resolved function table.
//! Exports: `Native`, `sys`.
//! Role: Single point of contact with the dynamic loader; everything else calls through `Native::api`.
//! Invariants: Libraries are opened once per process and never closed.
//! Invariants: A load failure is remembered and reported as `ErrorKind::Unavailable` on every call.
//! Invariants: All raw FFI interaction is confined to `core::native`, `core::stream`, `core::family`, `core::text`.
use std::ffi::{CStr, CString};
use std::os::raw::c_void;
use std::sync::OnceLock;

use crate::core::error::{Error, ErrorKind};

pub mod sys;

const CAIRO_CANDIDATES: &[&str] = &["libcairo.so.2", "libcairo.2.dylib", "libcairo.so"];
const GLIB_CANDIDATES: &[&str] = &["libglib-2.0.so.0", "libglib-2.0.0.dylib", "libglib-2.0.so"];
const GOBJECT_CANDIDATES: &[&str] = &[
    "libgobject-2.0.so.0",
    "libgobject-2.0.0.dylib",
    "libgobject-2.0.so",
];
const PANGO_CANDIDATES: &[&str] = &["libpango-1.0.so.0", "libpango-1.0.0.dylib", "libpango-1.0.so"];
const PANGOCAIRO_CANDIDATES: &[&str] = &[
    "libpangocairo-1.0.so.0",
    "libpangocairo-1.0.0.dylib",
    "libpangocairo-1.0.so",
];

const INSTALL_HINT: &str =
    "Install the cairo and pango runtime libraries (e.g. libcairo2 and libpangocairo-1.0-0).";

pub(crate) struct Library {
    name: &'static str,
    handle: *mut c_void,
}

// dlopen handles are process-wide and immutable once opened.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    #[cfg(unix)]
    fn open(candidates: &[&'static str]) -> Result<Self, Error> {
        let mut last_error = None;
        for &name in candidates {
            let Ok(c_name) = CString::new(name) else {
                continue;
            };
            let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
            if !handle.is_null() {
                tracing::debug!(library = name, "opened native library");
                return Ok(Self { name, handle });
            }
            last_error = dl_error();
        }
        let mut err = Error::new(ErrorKind::Unavailable)
            .with_message(format!(
                "could not load any of: {}",
                candidates.join(", ")
            ))
            .with_hint(INSTALL_HINT);
        if let Some(detail) = last_error {
            err = err.with_source(std::io::Error::other(detail));
        }
        Err(err)
    }

    #[cfg(not(unix))]
    fn open(candidates: &[&'static str]) -> Result<Self, Error> {
        Err(Error::new(ErrorKind::Unavailable)
            .with_message(format!(
                "dynamic loading is not supported on this platform: {}",
                candidates.join(", ")
            ))
            .with_hint(INSTALL_HINT))
    }

    #[cfg(unix)]
    pub(crate) fn symbol(&self, name: &'static str) -> Result<*mut c_void, Error> {
        let c_name = CStr::from_bytes_with_nul(name.as_bytes()).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("symbol name is not nul-terminated")
                .with_source(err)
        })?;
        let symbol = unsafe { libc::dlsym(self.handle, c_name.as_ptr()) };
        if symbol.is_null() {
            return Err(Error::new(ErrorKind::Unavailable)
                .with_message(format!(
                    "{} does not export {}",
                    self.name,
                    name.trim_end_matches('\0')
                ))
                .with_hint("The installed library is too old; cairo >= 1.16 and pango >= 1.16 are required."));
        }
        Ok(symbol)
    }

    #[cfg(not(unix))]
    pub(crate) fn symbol(&self, name: &'static str) -> Result<*mut c_void, Error> {
        let _ = self.handle;
        Err(Error::new(ErrorKind::Unavailable).with_message(format!(
            "{} does not export {}",
            self.name,
            name.trim_end_matches('\0')
        )))
    }
}

#[cfg(unix)]
fn dl_error() -> Option<String> {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return None;
    }
    Some(
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned(),
    )
}

pub(crate) struct Libraries {
    pub(crate) cairo: Library,
    pub(crate) glib: Library,
    pub(crate) gobject: Library,
    pub(crate) pango: Library,
    pub(crate) pangocairo: Library,
}

impl Libraries {
    fn open() -> Result<Self, Error> {
        Ok(Self {
            cairo: Library::open(CAIRO_CANDIDATES)?,
            glib: Library::open(GLIB_CANDIDATES)?,
            gobject: Library::open(GOBJECT_CANDIDATES)?,
            pango: Library::open(PANGO_CANDIDATES)?,
            pangocairo: Library::open(PANGOCAIRO_CANDIDATES)?,
        })
    }
}

/// The loaded native libraries together with their resolved entry points.
pub struct Native {
    api: sys::NativeApi,
    _libraries: Libraries,
}

struct LoadFailure {
    message: String,
    hint: Option<String>,
}

static NATIVE: OnceLock<Result<Native, LoadFailure>> = OnceLock::new();

impl Native {
    /// Returns the process-wide native table, loading it on first use.
    pub fn get() -> Result<&'static Native, Error> {
        let loaded = NATIVE.get_or_init(|| {
            Self::load().map_err(|err| {
                tracing::debug!(error = %err, "native libraries unavailable");
                LoadFailure {
                    message: err.message().unwrap_or("native libraries unavailable").to_string(),
                    hint: err.hint().map(str::to_string),
                }
            })
        });
        match loaded {
            Ok(native) => Ok(native),
            Err(failure) => {
                let err = Error::new(ErrorKind::Unavailable).with_message(failure.message.clone());
                Err(match &failure.hint {
                    Some(hint) => err.with_hint(hint.clone()),
                    None => err,
                })
            }
        }
    }

    /// Reports whether the native libraries can be used in this process.
    pub fn is_available() -> bool {
        Self::get().is_ok()
    }

    fn load() -> Result<Self, Error> {
        let libraries = Libraries::open()?;
        let api = sys::NativeApi::resolve(&libraries)?;
        Ok(Self {
            api,
            _libraries: libraries,
        })
    }

    pub(crate) fn api(&self) -> &sys::NativeApi {
        &self.api
    }

    /// Version string of the loaded cairo library, e.g. `1.18.0`.
    pub fn cairo_version(&self) -> String {
        let ptr = unsafe { (self.api.cairo_version_string)() };
        c_string_lossy(ptr)
    }

    pub(crate) fn status_message(&self, status: sys::cairo_status_t) -> String {
        let ptr = unsafe { (self.api.cairo_status_to_string)(status) };
        c_string_lossy(ptr)
    }

    pub(crate) fn status_error(&self, status: sys::cairo_status_t, context: &str) -> Error {
        Error::new(ErrorKind::Native).with_message(format!(
            "{context}: {} (cairo status {status})",
            self.status_message(status)
        ))
    }
}

pub(crate) fn c_string_lossy(ptr: *const std::os::raw::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}
