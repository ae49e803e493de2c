//! Packed buffer - the single arena backing every argument slot
//!
//! Design: one zeroed allocation sized by the size pass, sliced into
//! slots by offset, released exactly once on drop.

use crate::errors::AllocationError;
use crate::logging::{log_buffer_allocated, log_buffer_released};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Exclusively owned, zero-initialised block of argument storage.
pub struct PackedBuffer {
    start: NonNull<u8>,
    // `None` for the empty buffer, which owns no allocation.
    layout: Option<Layout>,
}

impl PackedBuffer {
    /// Allocate exactly `size` zeroed bytes.
    pub fn zeroed(size: usize) -> Result<Self, AllocationError> {
        if size == 0 {
            return Ok(Self {
                start: NonNull::dangling(),
                layout: None,
            });
        }

        let layout =
            Layout::from_size_align(size, 1).map_err(|_| AllocationError::InvalidLayout { size })?;

        // SAFETY: `layout` has a non-zero size.
        let start = unsafe { alloc_zeroed(layout) };
        let start = NonNull::new(start).ok_or(AllocationError::OutOfMemory { size })?;

        log_buffer_allocated(size, start.as_ptr());
        Ok(Self {
            start,
            layout: Some(layout),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.map_or(0, |l| l.size())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.start.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.start.as_ptr()
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `start` is valid for `len()` initialised bytes (dangling only when empty).
        unsafe { std::slice::from_raw_parts(self.start.as_ptr(), self.len()) }
    }

    /// Mutable view of `[offset, offset + len)`, or `None` if it leaves the buffer.
    pub fn slot_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.len() {
            return None;
        }
        // SAFETY: bounds checked above; the buffer is exclusively borrowed.
        Some(unsafe { std::slice::from_raw_parts_mut(self.start.as_ptr().add(offset), len) })
    }
}

impl Drop for PackedBuffer {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            log_buffer_released(layout.size(), self.start.as_ptr());
            // SAFETY: allocated in `zeroed` with this exact layout.
            unsafe {
                dealloc(self.start.as_ptr(), layout);
            }
        }
    }
}

impl std::fmt::Debug for PackedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedBuffer")
            .field("start", &self.start)
            .field("len", &self.len())
            .finish()
    }
}

// The buffer owns its memory outright, like `Box<[u8]>`.
unsafe impl Send for PackedBuffer {}
