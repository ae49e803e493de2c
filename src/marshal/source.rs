//! Foreign string access - scoped, per-element acquisition
//!
//! Design: a foreign string is never borrowed past a single closure call.
//! The marshaller acquires each element twice (size pass, copy pass) and
//! must not assume the bytes live at the same address both times.

use crate::errors::ConversionError;
use std::ffi::{CStr, CString, OsStr, OsString};
use std::os::raw::c_char;

/// A string owned by another memory domain that can lend out its bytes.
///
/// `with_bytes` acquires a read-only view, hands it to `f`, and releases it
/// before returning. The view must not contain the terminator.
pub trait ForeignString {
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R;
}

/// An ordered, indexable sequence of foreign strings.
///
/// Elements are fetched fresh on every call; implementations must not cache
/// pointers between calls.
pub trait ArgumentSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquire element `index`, run `f` over its bytes, release it.
    fn with_element<R, F>(&self, index: usize, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R;
}

impl ForeignString for str {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        Ok(f(self.as_bytes()))
    }
}

impl ForeignString for String {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.as_str().with_bytes(f)
    }
}

impl ForeignString for CStr {
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        let bytes = self.to_bytes();
        std::str::from_utf8(bytes).map_err(|e| ConversionError::InvalidEncoding {
            index: 0,
            reason: e.to_string(),
        })?;
        Ok(f(bytes))
    }
}

impl ForeignString for CString {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.as_c_str().with_bytes(f)
    }
}

impl ForeignString for OsStr {
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        match self.to_str() {
            Some(s) => s.with_bytes(f),
            None => Err(ConversionError::InvalidEncoding {
                index: 0,
                reason: format!("{:?} is not valid unicode", self),
            }),
        }
    }
}

impl ForeignString for OsString {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.as_os_str().with_bytes(f)
    }
}

/// `None` models a null element handle.
impl<T: ForeignString> ForeignString for Option<T> {
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        match self {
            Some(s) => s.with_bytes(f),
            None => Err(ConversionError::NullElement { index: 0 }),
        }
    }
}

impl<T: ForeignString + ?Sized> ForeignString for &T {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        (**self).with_bytes(f)
    }
}

impl<T: ForeignString + ?Sized> ForeignString for Box<T> {
    #[inline]
    fn with_bytes<R, F>(&self, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        (**self).with_bytes(f)
    }
}

impl<T: ForeignString> ArgumentSource for [T] {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn with_element<R, F>(&self, index: usize, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.get(index)
            .ok_or(ConversionError::MissingElement { index })?
            .with_bytes(f)
            .map_err(|e| e.at(index))
    }
}

impl<T: ForeignString> ArgumentSource for Vec<T> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn with_element<R, F>(&self, index: usize, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.as_slice().with_element(index, f)
    }
}

impl<T: ForeignString, const N: usize> ArgumentSource for [T; N] {
    fn len(&self) -> usize {
        N
    }

    fn with_element<R, F>(&self, index: usize, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        self.as_slice().with_element(index, f)
    }
}

/// A caller-supplied `const char* const*` array of known length.
///
/// Null entries and a null array with a non-zero count are reported as
/// [`ConversionError::NullElement`]. Each element must be valid UTF-8.
#[derive(Debug, Clone, Copy)]
pub struct RawArgv {
    ptr: *const *const c_char,
    count: usize,
}

impl RawArgv {
    /// # Safety
    /// `ptr` must be null or point to `count` readable pointers, each null or
    /// pointing to a NUL-terminated string, all valid while this value is used.
    pub unsafe fn new(ptr: *const *const c_char, count: usize) -> Self {
        Self { ptr, count }
    }
}

impl ArgumentSource for RawArgv {
    fn len(&self) -> usize {
        self.count
    }

    fn with_element<R, F>(&self, index: usize, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        if index >= self.count {
            return Err(ConversionError::MissingElement { index });
        }
        if self.ptr.is_null() {
            return Err(ConversionError::NullElement { index });
        }

        // SAFETY: `new` requires `count` readable entries behind a non-null `ptr`.
        let element = unsafe { *self.ptr.add(index) };
        if element.is_null() {
            return Err(ConversionError::NullElement { index });
        }

        // SAFETY: non-null entries are NUL-terminated per the `new` contract.
        let c_str = unsafe { CStr::from_ptr(element) };
        c_str.with_bytes(f).map_err(|e| e.at(index))
    }
}
