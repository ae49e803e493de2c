pub mod c_api;

#[cfg(feature = "python")]
pub mod python_ffi;

pub use c_api::*;
