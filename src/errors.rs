//! Error taxonomy for the argument marshaller
//!
//! Local failures (conversion, allocation, a source that changes between
//! passes) never reach the runtime. A non-zero runtime exit code is not an
//! error here and is passed through verbatim.

use crate::marshal::MarshalState;
use std::fmt;
use std::os::raw::c_int;

/// Returned through integer-only channels when the packed buffer could not be allocated.
pub const ALLOCATION_FAILED: c_int = c_int::MIN;

/// Returned through integer-only channels when an argument could not be converted.
pub const CONVERSION_FAILED: c_int = c_int::MIN + 1;

/// Returned through integer-only channels when no runtime entry point is available.
pub const ENTRY_UNAVAILABLE: c_int = c_int::MIN + 2;

/// An argument could not be turned into a null-terminated byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The element handle was null.
    NullElement { index: usize },
    /// The element is not valid in the encoding the runtime expects.
    InvalidEncoding { index: usize, reason: String },
    /// The element contains a NUL byte, which would truncate it on the native side.
    InteriorNul { index: usize, position: usize },
    /// The source reported fewer elements than its length.
    MissingElement { index: usize },
}

impl ConversionError {
    pub fn index(&self) -> usize {
        match self {
            Self::NullElement { index }
            | Self::InvalidEncoding { index, .. }
            | Self::InteriorNul { index, .. }
            | Self::MissingElement { index } => *index,
        }
    }

    /// Re-tag an error produced without knowledge of its position in the list.
    pub(crate) fn at(self, index: usize) -> Self {
        match self {
            Self::NullElement { .. } => Self::NullElement { index },
            Self::InvalidEncoding { reason, .. } => Self::InvalidEncoding { index, reason },
            Self::InteriorNul { position, .. } => Self::InteriorNul { index, position },
            Self::MissingElement { .. } => Self::MissingElement { index },
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullElement { index } => {
                write!(f, "argument {} is null", index)
            }
            Self::InvalidEncoding { index, reason } => {
                write!(f, "argument {} cannot be encoded as UTF-8: {}", index, reason)
            }
            Self::InteriorNul { index, position } => {
                write!(f, "argument {} contains a NUL byte at position {}", index, position)
            }
            Self::MissingElement { index } => {
                write!(f, "argument {} is missing from the source", index)
            }
        }
    }
}

impl std::error::Error for ConversionError {}

/// The packed buffer could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// `sum(len + 1)` does not fit in `usize`.
    SizeOverflow,
    /// The request exceeds a configured limit.
    LimitExceeded { what: &'static str, requested: usize, limit: usize },
    /// The size cannot be described as an allocation layout.
    InvalidLayout { size: usize },
    /// The allocator returned null.
    OutOfMemory { size: usize },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeOverflow => {
                write!(f, "argument buffer size overflows the address space")
            }
            Self::LimitExceeded { what, requested, limit } => {
                write!(f, "{} limit exceeded: requested {}, limit {}", what, requested, limit)
            }
            Self::InvalidLayout { size } => {
                write!(f, "cannot lay out an argument buffer of {} bytes", size)
            }
            Self::OutOfMemory { size } => {
                write!(f, "out of memory allocating {} bytes for arguments", size)
            }
        }
    }
}

impl std::error::Error for AllocationError {}

/// Any failure that stops marshalling before the runtime is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    Conversion(ConversionError),
    Allocation(AllocationError),
    /// An element's length differs between the size pass and the copy pass.
    SourceChanged { index: usize, measured: usize, found: usize },
    /// The marshaller already ran; it starts the runtime at most once.
    Reused { state: MarshalState },
}

impl MarshalError {
    /// Integer sentinel for channels that can only carry an exit code.
    pub fn exit_code(&self) -> c_int {
        match self {
            Self::Conversion(_) | Self::SourceChanged { .. } => CONVERSION_FAILED,
            Self::Allocation(_) => ALLOCATION_FAILED,
            Self::Reused { .. } => ENTRY_UNAVAILABLE,
        }
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversion(e) => write!(f, "conversion error: {}", e),
            Self::Allocation(e) => write!(f, "allocation error: {}", e),
            Self::SourceChanged { index, measured, found } => write!(
                f,
                "argument {} changed while marshalling: measured {} bytes, found {}",
                index, measured, found
            ),
            Self::Reused { state } => {
                write!(f, "marshaller already used (state {:?})", state)
            }
        }
    }
}

impl std::error::Error for MarshalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Conversion(e) => Some(e),
            Self::Allocation(e) => Some(e),
            Self::SourceChanged { .. } | Self::Reused { .. } => None,
        }
    }
}

impl From<ConversionError> for MarshalError {
    fn from(e: ConversionError) -> Self {
        Self::Conversion(e)
    }
}

impl From<AllocationError> for MarshalError {
    fn from(e: AllocationError) -> Self {
        Self::Allocation(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct_and_negative() {
        let codes = [ALLOCATION_FAILED, CONVERSION_FAILED, ENTRY_UNAVAILABLE];
        for (i, a) in codes.iter().enumerate() {
            assert!(*a < -255, "sentinel {} collides with byte-sized exit codes", a);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn marshal_error_maps_to_sentinel() {
        let conv: MarshalError = ConversionError::NullElement { index: 2 }.into();
        assert_eq!(conv.exit_code(), CONVERSION_FAILED);

        let alloc: MarshalError = AllocationError::SizeOverflow.into();
        assert_eq!(alloc.exit_code(), ALLOCATION_FAILED);

        let changed = MarshalError::SourceChanged { index: 0, measured: 3, found: 4 };
        assert_eq!(changed.exit_code(), CONVERSION_FAILED);

        let reused = MarshalError::Reused { state: MarshalState::Released };
        assert_eq!(reused.exit_code(), ENTRY_UNAVAILABLE);
    }

    #[test]
    fn conversion_error_retags_index() {
        let err = ConversionError::InteriorNul { index: 0, position: 3 }.at(7);
        assert_eq!(err, ConversionError::InteriorNul { index: 7, position: 3 });
        assert_eq!(err.index(), 7);
    }

    #[test]
    fn display_mentions_position() {
        let err = MarshalError::from(ConversionError::NullElement { index: 4 });
        assert_eq!(err.to_string(), "conversion error: argument 4 is null");
    }
}
