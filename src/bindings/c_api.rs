//! C API for hosts that embed the bridge directly
//!
//! Design: integer-only interface. Local failures come back as the
//! sentinels in [`crate::errors`], which sit far outside the range of
//! conventional exit codes.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::str::Utf8Error;

use crate::config::BridgeConfig;
use crate::errors::{CONVERSION_FAILED, ENTRY_UNAVAILABLE};
use crate::logging::{error, flush_global_logging, init_global_logging};
use crate::marshal::{Limits, Marshaller, RawArgv};
use crate::runtime::{ExternEntry, LibraryEntry, RuntimeEntry, RuntimeStartFn};

/// Install logging from `$ARGV_BRIDGE_CONFIG` (or defaults).
/// Returns 0 on success, 1 if logging was already set up, -1 on a config error.
#[no_mangle]
pub extern "C" fn argv_bridge_init_logging() -> c_int {
    let config = match BridgeConfig::discover().and_then(|c| c.log_config()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("argv-bridge: {}", e);
            return -1;
        }
    };

    if init_global_logging(config) {
        0
    } else {
        1
    }
}

/// Flush and tear down logging installed by `argv_bridge_init_logging`.
#[no_mangle]
pub extern "C" fn argv_bridge_shutdown_logging() {
    flush_global_logging();
}

/// Marshal `count` C strings and call `entry` with them.
///
/// Returns whatever `entry` returns, or a sentinel if marshalling failed.
///
/// # Safety
/// `arguments` must be null or point to `count` pointers, each null or
/// pointing to a NUL-terminated string. `entry` must honour the
/// `RuntimeStartFn` contract.
#[no_mangle]
pub unsafe extern "C" fn argv_bridge_start(
    count: c_int,
    arguments: *const *const c_char,
    entry: Option<RuntimeStartFn>,
) -> c_int {
    let Some(func) = entry else {
        error!(target: "runtime", "argv_bridge_start called without an entry point");
        return ENTRY_UNAVAILABLE;
    };

    let mut entry = ExternEntry::new(func);
    start_with(count, arguments, &mut entry, Limits::default())
}

/// Like `argv_bridge_start`, resolving the entry point from a shared library.
///
/// A null `library` or `symbol` falls back to the configured (or default)
/// value. A symbol that is not UTF-8 is rejected, never replaced. On unix
/// the library path is taken as raw bytes.
///
/// # Safety
/// As for `argv_bridge_start`; `library` and `symbol` must be null or
/// NUL-terminated, and the named symbol must have the `RuntimeStartFn` signature.
#[no_mangle]
pub unsafe extern "C" fn argv_bridge_start_library(
    count: c_int,
    arguments: *const *const c_char,
    library: *const c_char,
    symbol: *const c_char,
) -> c_int {
    let config = match BridgeConfig::discover() {
        Ok(c) => c,
        Err(e) => {
            error!(target: "runtime", error = %e, "cannot load bridge configuration");
            return ENTRY_UNAVAILABLE;
        }
    };

    start_library_with(&config, count, arguments, library, symbol)
}

unsafe fn start_library_with(
    config: &BridgeConfig,
    count: c_int,
    arguments: *const *const c_char,
    library: *const c_char,
    symbol: *const c_char,
) -> c_int {
    let library = match c_str_arg(library) {
        Some(raw) => match path_from_c(raw) {
            Ok(path) => path,
            Err(e) => {
                error!(target: "runtime", error = %e, "library path is not valid UTF-8");
                return ENTRY_UNAVAILABLE;
            }
        },
        None => match config.runtime.library.clone() {
            Some(path) => path,
            None => {
                error!(target: "runtime", "no runtime library given or configured");
                return ENTRY_UNAVAILABLE;
            }
        },
    };

    let symbol = match c_str_arg(symbol).map(CStr::to_str) {
        Some(Ok(name)) => name,
        Some(Err(e)) => {
            error!(target: "runtime", error = %e, "entry symbol is not valid UTF-8");
            return ENTRY_UNAVAILABLE;
        }
        None => config.runtime.symbol.as_str(),
    };

    let mut entry = match LibraryEntry::open(&library, symbol) {
        Ok(entry) => entry,
        Err(_) => return ENTRY_UNAVAILABLE,
    };

    start_with(count, arguments, &mut entry, config.limits())
}

unsafe fn start_with<E: RuntimeEntry>(
    count: c_int,
    arguments: *const *const c_char,
    entry: &mut E,
    limits: Limits,
) -> c_int {
    let Ok(count) = usize::try_from(count) else {
        error!(target: "marshal", count, "negative argument count");
        return CONVERSION_FAILED;
    };

    let source = RawArgv::new(arguments, count);
    match Marshaller::with_limits(limits).marshal_and_start(&source, entry) {
        Ok(code) => code,
        Err(e) => e.exit_code(),
    }
}

unsafe fn c_str_arg<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr))
}

#[cfg(unix)]
fn path_from_c(path: &CStr) -> Result<PathBuf, Utf8Error> {
    use std::os::unix::ffi::OsStrExt;
    Ok(PathBuf::from(std::ffi::OsStr::from_bytes(path.to_bytes())))
}

#[cfg(not(unix))]
fn path_from_c(path: &CStr) -> Result<PathBuf, Utf8Error> {
    path.to_str().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[cfg(unix)]
    #[test]
    fn library_path_keeps_raw_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let raw = CString::new(b"/opt/n\xffde/libnode.so".to_vec()).unwrap();
        let path = path_from_c(unsafe { c_str_arg(raw.as_ptr()) }.unwrap()).unwrap();
        assert_eq!(path.as_os_str().as_bytes(), b"/opt/n\xffde/libnode.so");
    }

    #[test]
    fn null_arguments_are_absent() {
        assert!(unsafe { c_str_arg(std::ptr::null()) }.is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_symbol_does_not_fall_back_to_config() {
        // `abs` would run, and return argc, if the configured symbol were used instead.
        let mut config = BridgeConfig::default();
        config.runtime.symbol = "abs".to_string();

        let node = CString::new("node").unwrap();
        let argv = [node.as_ptr(), node.as_ptr(), node.as_ptr()];
        let library = CString::new("libc.so.6").unwrap();
        let symbol = CString::new(b"x\xff".to_vec()).unwrap();

        let code = unsafe {
            start_library_with(&config, 3, argv.as_ptr(), library.as_ptr(), symbol.as_ptr())
        };
        assert_eq!(code, ENTRY_UNAVAILABLE);
    }
}
