//! Dynamic library loading and entry point resolution
//!
//! Platform-agnostic wrapper around dlopen/LoadLibrary. The library stays
//! loaded for as long as the entry resolved from it is alive.

use super::{RuntimeEntry, RuntimeStartFn};
use core::ffi::c_void;
use core::ptr::NonNull;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Handle to dynamically loaded library
pub struct Library {
    handle: NonNull<c_void>,
}

impl Library {
    /// Load a library by name or path.
    ///
    /// Bare names go through the platform search path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let library = Self::load_impl(path)?;
        debug!(target: "runtime", path = %path.display(), "runtime library loaded");
        Ok(library)
    }

    #[cfg(unix)]
    fn load_impl(path: &Path) -> Result<Self, LoadError> {
        use std::os::unix::ffi::OsStrExt;

        let cname = CString::new(path.as_os_str().as_bytes()).map_err(|_| LoadError::InvalidName)?;

        unsafe {
            let handle = libc::dlopen(cname.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL);
            NonNull::new(handle)
                .map(|h| Self { handle: h })
                .ok_or_else(|| LoadError::LoadFailed {
                    path: path.to_path_buf(),
                    reason: last_dl_error(),
                })
        }
    }

    #[cfg(windows)]
    fn load_impl(path: &Path) -> Result<Self, LoadError> {
        use std::os::windows::ffi::OsStrExt;

        extern "system" {
            fn LoadLibraryW(filename: *const u16) -> *mut c_void;
            fn GetLastError() -> u32;
        }

        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();

        unsafe {
            let handle = LoadLibraryW(wide.as_ptr());
            NonNull::new(handle)
                .map(|h| Self { handle: h })
                .ok_or_else(|| LoadError::LoadFailed {
                    path: path.to_path_buf(),
                    reason: format!("error code {}", GetLastError()),
                })
        }
    }

    /// Get a symbol's address by name
    pub fn symbol(&self, name: &str) -> Result<NonNull<c_void>, SymbolError> {
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;
        self.symbol_impl(&cname)
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &CString) -> Result<NonNull<c_void>, SymbolError> {
        let ptr = unsafe { libc::dlsym(self.handle.as_ptr(), name.as_ptr()) };
        NonNull::new(ptr).ok_or(SymbolError::NotFound)
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &CString) -> Result<NonNull<c_void>, SymbolError> {
        extern "system" {
            fn GetProcAddress(module: *mut c_void, name: *const c_char) -> *mut c_void;
        }

        let ptr = unsafe { GetProcAddress(self.handle.as_ptr(), name.as_ptr()) };
        NonNull::new(ptr).ok_or(SymbolError::NotFound)
    }
}

#[cfg(unix)]
unsafe fn last_dl_error() -> String {
    let err = libc::dlerror();
    if err.is_null() {
        "unknown error".into()
    } else {
        std::ffi::CStr::from_ptr(err).to_string_lossy().into_owned()
    }
}

impl Drop for Library {
    #[cfg(unix)]
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        extern "system" {
            fn FreeLibrary(module: *mut c_void) -> i32;
        }
        unsafe {
            FreeLibrary(self.handle.as_ptr());
        }
    }
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("handle", &self.handle).finish()
    }
}

/// Runtime entry point resolved from a shared library.
///
/// Keeps the library loaded so the function pointer stays valid.
#[derive(Debug)]
pub struct LibraryEntry {
    func: RuntimeStartFn,
    symbol: String,
    _library: Library,
}

impl LibraryEntry {
    /// Load `path` and resolve `symbol` as a [`RuntimeStartFn`].
    ///
    /// # Safety
    /// The exported symbol must really have the `RuntimeStartFn` signature and
    /// honour its contract; nothing can be checked across the boundary.
    pub unsafe fn open(path: impl AsRef<Path>, symbol: &str) -> Result<Self, EntryError> {
        let path = path.as_ref();
        let library = Library::load(path).map_err(|e| {
            error!(target: "runtime", path = %path.display(), error = %e, "cannot load runtime library");
            EntryError::Load(e)
        })?;

        let addr = library.symbol(symbol).map_err(|e| {
            error!(target: "runtime", symbol, error = %e, "cannot resolve runtime entry point");
            EntryError::Symbol {
                path: path.to_path_buf(),
                symbol: symbol.to_string(),
                source: e,
            }
        })?;

        let func = std::mem::transmute::<*mut c_void, RuntimeStartFn>(addr.as_ptr());
        debug!(target: "runtime", symbol, "runtime entry point resolved");

        Ok(Self {
            func,
            symbol: symbol.to_string(),
            _library: library,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl RuntimeEntry for LibraryEntry {
    #[inline]
    fn start(&mut self, argc: c_int, argv: *mut *mut c_char) -> c_int {
        // SAFETY: the signature was vouched for in `open`; the library is
        // kept loaded by `_library`.
        unsafe { (self.func)(argc, argv) }
    }
}

/// Library loading errors
#[derive(Debug)]
pub enum LoadError {
    InvalidName,
    LoadFailed { path: PathBuf, reason: String },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid library name"),
            Self::LoadFailed { path, reason } => {
                write!(f, "Failed to load library {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for LoadError {}

/// Symbol lookup errors
#[derive(Debug)]
pub enum SymbolError {
    InvalidName,
    NotFound,
}

impl std::fmt::Display for SymbolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid symbol name"),
            Self::NotFound => write!(f, "Symbol not found"),
        }
    }
}

impl std::error::Error for SymbolError {}

/// The runtime entry point could not be made available.
#[derive(Debug)]
pub enum EntryError {
    Load(LoadError),
    Symbol {
        path: PathBuf,
        symbol: String,
        source: SymbolError,
    },
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(e) => write!(f, "{}", e),
            Self::Symbol { path, symbol, source } => {
                write!(f, "{} in {}: {}", symbol, path.display(), source)
            }
        }
    }
}

impl std::error::Error for EntryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(e) => Some(e),
            Self::Symbol { source, .. } => Some(source),
        }
    }
}
