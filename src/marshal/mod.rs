//! Argument marshalling - foreign strings to one contiguous argv
//!
//! Design: two passes over the foreign source with an arena in between.
//! The size pass measures, one zeroed buffer is allocated, the copy pass
//! fills it, and the runtime sees `(argc, argv)` pointing into that buffer.
//! The buffer is released when the packed set drops, after the call returns
//! or on any failure path.
//!
//! Architecture:
//! - `source.rs` - Scoped foreign string access (ForeignString, ArgumentSource)
//! - `buffer.rs` - The packed buffer arena
//! - `packed.rs` - Size plan and the packed argument set

mod buffer;
mod packed;
mod source;


pub use buffer::PackedBuffer;
pub use packed::{PackedArgs, SizePlan};
pub use source::{ArgumentSource, ForeignString, RawArgv};

use crate::errors::{AllocationError, ConversionError, MarshalError};
use crate::logging::{log_marshal_error, log_runtime_call, log_runtime_return};
use crate::runtime::RuntimeEntry;
use std::os::raw::c_int;
use tracing::{debug, trace};

/// Optional bounds checked before the buffer is allocated.
///
/// Unbounded by default; the `c_int` argument count and the allocator
/// itself are the only hard limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_total_bytes: usize,
    pub max_arguments: usize,
}

impl Limits {
    pub const fn unbounded() -> Self {
        Self {
            max_total_bytes: usize::MAX,
            max_arguments: usize::MAX,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Lifecycle of one marshal-and-start sequence. Strictly linear.
///
/// `Copying` is also where a marshaller rests while the packed set it
/// produced is outstanding; the buffer itself is freed whenever that set
/// drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MarshalState {
    Idle,
    Sizing,
    Allocated,
    Copying,
    Invoking,
    Released,
}

/// Drives one argument list through size, allocate, copy, invoke, release.
///
/// A marshaller is single-use: `pack` only runs from `Idle`, `invoke` only
/// before the runtime has been called, and `Released` is terminal. Any
/// other use fails with [`MarshalError::Reused`].
#[derive(Debug)]
pub struct Marshaller {
    limits: Limits,
    state: MarshalState,
    allocated: bool,
    invoked: bool,
}

impl Marshaller {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            limits,
            state: MarshalState::Idle,
            allocated: false,
            invoked: false,
        }
    }

    #[inline]
    pub fn state(&self) -> MarshalState {
        self.state
    }

    /// Whether a packed buffer was allocated.
    #[inline]
    pub fn allocated(&self) -> bool {
        self.allocated
    }

    /// Whether the runtime entry point was actually called.
    #[inline]
    pub fn invoked(&self) -> bool {
        self.invoked
    }

    #[inline]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    fn advance(&mut self, next: MarshalState) {
        debug_assert!(next > self.state, "illegal transition {:?} -> {:?}", self.state, next);
        trace!(target: "marshal", from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    /// Size, allocate and copy `args` into a packed argv.
    ///
    /// On failure nothing has been invoked and any partially built buffer
    /// has already been released.
    pub fn pack<S>(&mut self, args: &S) -> Result<PackedArgs, MarshalError>
    where
        S: ArgumentSource + ?Sized,
    {
        if self.state != MarshalState::Idle {
            return Err(self.reused());
        }

        let result = self.pack_inner(args);
        if let Err(e) = &result {
            log_marshal_error(e);
            self.advance(MarshalState::Released);
        }
        result
    }

    fn pack_inner<S>(&mut self, args: &S) -> Result<PackedArgs, MarshalError>
    where
        S: ArgumentSource + ?Sized,
    {
        self.advance(MarshalState::Sizing);
        let plan = self.size_pass(args)?;

        let mut buffer = PackedBuffer::zeroed(plan.total())?;
        self.allocated = true;
        self.advance(MarshalState::Allocated);

        self.advance(MarshalState::Copying);
        let count = plan.count();
        let mut offsets = Vec::with_capacity(count);
        let mut cursor = 0usize;

        for (index, &measured) in plan.lengths().iter().enumerate() {
            let slot = buffer
                .slot_mut(cursor, measured + 1)
                .ok_or(MarshalError::Allocation(AllocationError::SizeOverflow))?;

            let copied = args.with_element(index, |bytes| {
                if bytes.len() != measured {
                    return Err(MarshalError::SourceChanged {
                        index,
                        measured,
                        found: bytes.len(),
                    });
                }
                if let Some(position) = nul_position(bytes) {
                    return Err(ConversionError::InteriorNul { index, position }.into());
                }
                slot[..measured].copy_from_slice(bytes);
                slot[measured] = 0;
                Ok(())
            })?;
            copied?;

            trace!(target: "marshal", index, offset = cursor, len = measured, "argument copied");
            offsets.push(cursor);
            cursor += measured + 1;
        }

        debug_assert_eq!(cursor, plan.total());
        debug!(target: "marshal", count, total_bytes = plan.total(), "arguments packed");

        let lengths = plan.lengths().to_vec();
        Ok(PackedArgs::new(buffer, offsets, lengths))
    }

    fn size_pass<S>(&self, args: &S) -> Result<SizePlan, MarshalError>
    where
        S: ArgumentSource + ?Sized,
    {
        let count = args.len();
        check_limit("argument count", count, self.limits.max_arguments)?;
        check_limit("argument count", count, c_int::MAX as usize)?;

        let mut plan = SizePlan::with_capacity(count);
        for index in 0..count {
            let len = args.with_element(index, |bytes| match nul_position(bytes) {
                Some(position) => Err(ConversionError::InteriorNul { index, position }),
                None => Ok(bytes.len()),
            })??;
            plan.push(len)?;
        }

        check_limit("argument bytes", plan.total(), self.limits.max_total_bytes)?;
        debug!(target: "marshal", count, total_bytes = plan.total(), "size pass complete");
        Ok(plan)
    }

    /// Hand the packed argv to `entry` and release it once the call returns.
    ///
    /// The returned code is exactly what the entry point returned. `packed`
    /// may come from another marshaller (e.g. one that ran on a different
    /// thread); this one must not have invoked or released already.
    pub fn invoke<E>(&mut self, mut packed: PackedArgs, entry: &mut E) -> Result<c_int, MarshalError>
    where
        E: RuntimeEntry + ?Sized,
    {
        if self.state >= MarshalState::Invoking {
            let err = self.reused();
            log_marshal_error(&err);
            return Err(err);
        }

        self.advance(MarshalState::Invoking);
        self.invoked = true;

        // Bounded by `size_pass`.
        let argc = packed.argc() as c_int;
        log_runtime_call(argc);
        let code = entry.start(argc, packed.as_mut_argv());

        drop(packed);
        self.advance(MarshalState::Released);
        log_runtime_return(code);
        Ok(code)
    }

    /// Full sequence: pack `args`, invoke `entry`, release, return its code.
    pub fn marshal_and_start<S, E>(&mut self, args: &S, entry: &mut E) -> Result<c_int, MarshalError>
    where
        S: ArgumentSource + ?Sized,
        E: RuntimeEntry + ?Sized,
    {
        let packed = self.pack(args)?;
        self.invoke(packed, entry)
    }

    fn reused(&self) -> MarshalError {
        MarshalError::Reused { state: self.state }
    }
}

impl Default for Marshaller {
    fn default() -> Self {
        Self::new()
    }
}

/// Marshal `args` without limits and start the runtime through `entry`.
pub fn marshal_and_start<S, E>(args: &S, entry: &mut E) -> Result<c_int, MarshalError>
where
    S: ArgumentSource + ?Sized,
    E: RuntimeEntry + ?Sized,
{
    Marshaller::new().marshal_and_start(args, entry)
}

/// Pack `args` without limits and without invoking anything.
pub fn pack<S>(args: &S) -> Result<PackedArgs, MarshalError>
where
    S: ArgumentSource + ?Sized,
{
    Marshaller::new().pack(args)
}

#[inline]
fn nul_position(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == 0)
}

#[inline]
fn check_limit(what: &'static str, requested: usize, limit: usize) -> Result<(), AllocationError> {
    if requested > limit {
        return Err(AllocationError::LimitExceeded {
            what,
            requested,
            limit,
        });
    }
    Ok(())
}
