//! argv-bridge - start an embedded runtime from a managed argument list
//!
//! The bridge takes strings owned by a foreign memory domain, packs them
//! into one contiguous, null-terminated argv buffer and hands
//! `(argc, argv)` to the runtime's startup entry point.

pub mod bindings;
pub mod config;
pub mod errors;
pub mod logging;
pub mod marshal;
pub mod runtime;

// Re-export commonly used items
pub use config::{BridgeConfig, ConfigError};
pub use errors::{
    AllocationError, ConversionError, MarshalError, ALLOCATION_FAILED, CONVERSION_FAILED,
    ENTRY_UNAVAILABLE,
};
pub use logging::{init_global_logging, init_logging, LogConfig, LogFormat, LogOutput};
pub use marshal::{
    marshal_and_start, pack, ArgumentSource, ForeignString, Limits, MarshalState, Marshaller,
    PackedArgs, RawArgv,
};
pub use runtime::{ExternEntry, LibraryEntry, RuntimeEntry, RuntimeStartFn};
