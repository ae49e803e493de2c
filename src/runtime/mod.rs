//! Runtime entry points - the outbound side of the bridge
//!
//! The embedded runtime is an opaque capability with one contract:
//! `(argc, argv) -> exit code`. Nothing else about it is assumed.
//!
//! - `library.rs` - Resolving the entry point out of a shared library

mod library;

pub use library::{EntryError, Library, LibraryEntry, LoadError, SymbolError};

use std::os::raw::{c_char, c_int};

/// Native startup signature, as in `int main(int argc, char** argv)`.
pub type RuntimeStartFn = unsafe extern "C" fn(argc: c_int, argv: *mut *mut c_char) -> c_int;

/// Something that can start the embedded runtime.
///
/// `argv` points to `argc` NUL-terminated strings followed by a null
/// pointer, all valid only until `start` returns. Implementations must not
/// retain `argv` or any pointer derived from it.
pub trait RuntimeEntry {
    fn start(&mut self, argc: c_int, argv: *mut *mut c_char) -> c_int;
}

impl<F> RuntimeEntry for F
where
    F: FnMut(c_int, *mut *mut c_char) -> c_int,
{
    #[inline]
    fn start(&mut self, argc: c_int, argv: *mut *mut c_char) -> c_int {
        self(argc, argv)
    }
}

/// A bare `extern "C"` entry point, e.g. one linked into the host binary.
#[derive(Debug, Clone, Copy)]
pub struct ExternEntry {
    func: RuntimeStartFn,
}

impl ExternEntry {
    /// # Safety
    /// `func` must follow the `RuntimeStartFn` contract: read at most `argc`
    /// entries of `argv` and keep no pointer into it after returning.
    pub unsafe fn new(func: RuntimeStartFn) -> Self {
        Self { func }
    }
}

impl RuntimeEntry for ExternEntry {
    #[inline]
    fn start(&mut self, argc: c_int, argv: *mut *mut c_char) -> c_int {
        // SAFETY: the contract was vouched for in `new`, and the marshaller
        // guarantees the argv layout for the duration of this call.
        unsafe { (self.func)(argc, argv) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    unsafe extern "C" fn count_bytes(argc: c_int, argv: *mut *mut c_char) -> c_int {
        let mut total = 0;
        for i in 0..argc as usize {
            total += CStr::from_ptr(*argv.add(i)).to_bytes().len() as c_int;
        }
        total
    }

    #[test]
    fn extern_entry_calls_through() {
        let mut a = *b"ab\0";
        let mut b = *b"cde\0";
        let mut argv = [
            a.as_mut_ptr() as *mut c_char,
            b.as_mut_ptr() as *mut c_char,
            std::ptr::null_mut(),
        ];

        let mut entry = unsafe { ExternEntry::new(count_bytes) };
        assert_eq!(entry.start(2, argv.as_mut_ptr()), 5);
    }

    #[test]
    fn closures_are_entries() {
        let mut seen = None;
        let mut entry = |argc: c_int, _argv: *mut *mut c_char| {
            seen = Some(argc);
            7
        };
        assert_eq!(RuntimeEntry::start(&mut entry, 3, std::ptr::null_mut()), 7);
        assert_eq!(seen, Some(3));
    }
}
