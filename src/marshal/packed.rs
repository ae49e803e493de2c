//! Size plan and packed argument set
//!
//! `SizePlan` is the result of the size pass. `PackedArgs` is the buffer
//! after the copy pass together with the index vector into it.

use super::buffer::PackedBuffer;
use crate::errors::AllocationError;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

/// Per-argument byte lengths and the total slot size they require.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizePlan {
    lengths: Vec<usize>,
    total: usize,
}

impl SizePlan {
    pub fn with_capacity(count: usize) -> Self {
        Self {
            lengths: Vec::with_capacity(count),
            total: 0,
        }
    }

    /// Account for one argument of `len` bytes plus its terminator.
    pub fn push(&mut self, len: usize) -> Result<(), AllocationError> {
        self.total = len
            .checked_add(1)
            .and_then(|slot| self.total.checked_add(slot))
            .ok_or(AllocationError::SizeOverflow)?;
        self.lengths.push(len);
        Ok(())
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.lengths.len()
    }
}

/// Arguments copied into one contiguous buffer, plus the argv pointing into it.
///
/// The native vector holds `argc()` entries followed by a null pointer.
/// Every pointer is derived from the owned buffer, so moving this value
/// does not invalidate them.
#[derive(Debug)]
pub struct PackedArgs {
    buffer: PackedBuffer,
    offsets: Vec<usize>,
    lengths: Vec<usize>,
    argv: Vec<*mut c_char>,
}

// Owns the buffer the argv entries point into; nothing is shared.
unsafe impl Send for PackedArgs {}

impl PackedArgs {
    pub(crate) fn new(mut buffer: PackedBuffer, offsets: Vec<usize>, lengths: Vec<usize>) -> Self {
        debug_assert_eq!(offsets.len(), lengths.len());

        let base = buffer.as_mut_ptr();
        let mut argv = Vec::with_capacity(offsets.len() + 1);
        for &offset in &offsets {
            // SAFETY: offsets were produced by the copy pass and lie inside the buffer.
            argv.push(unsafe { base.add(offset) } as *mut c_char);
        }
        argv.push(ptr::null_mut());

        Self {
            buffer,
            offsets,
            lengths,
            argv,
        }
    }

    #[inline]
    pub fn argc(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Size of the packed buffer in bytes.
    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Start offset of each slot, in argument order.
    #[inline]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Byte length of each argument, terminator excluded.
    #[inline]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// The index vector, without the trailing null.
    #[inline]
    pub fn entries(&self) -> &[*mut c_char] {
        &self.argv[..self.argc()]
    }

    #[inline]
    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Base address of the packed buffer.
    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    /// Argument `index` as stored in its slot.
    pub fn get(&self, index: usize) -> Option<&CStr> {
        let start = *self.offsets.get(index)?;
        let end = start + self.lengths[index] + 1;
        CStr::from_bytes_with_nul(&self.buffer()[start..end]).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> + '_ {
        (0..self.argc()).filter_map(move |i| self.get(i))
    }

    /// Native argv for the runtime call. Valid until `self` is dropped.
    #[inline]
    pub fn as_mut_argv(&mut self) -> *mut *mut c_char {
        self.argv.as_mut_ptr()
    }
}
