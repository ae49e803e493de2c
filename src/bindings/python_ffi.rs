//! Python bindings - start the runtime from a list of `str`
//!
//! Elements are re-fetched from the list on each pass and borrowed only
//! while the interpreter lock is held. The lock is released for the
//! runtime call itself, which may run for the life of the process.

use std::path::PathBuf;

use pyo3::exceptions::{PyMemoryError, PyOSError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyList, PyString};

use crate::config::BridgeConfig;
use crate::errors::{ConversionError, MarshalError, ALLOCATION_FAILED, CONVERSION_FAILED, ENTRY_UNAVAILABLE};
use crate::logging::init_global_logging;
use crate::marshal::{ArgumentSource, Marshaller};
use crate::runtime::LibraryEntry;

/// A Python list viewed as an argument source.
struct PyArguments<'py> {
    list: &'py PyList,
}

impl ArgumentSource for PyArguments<'_> {
    fn len(&self) -> usize {
        self.list.len()
    }

    fn with_element<R, F>(&self, index: usize, f: F) -> Result<R, ConversionError>
    where
        F: FnOnce(&[u8]) -> R,
    {
        let item = self
            .list
            .get_item(index)
            .map_err(|_| ConversionError::MissingElement { index })?;
        if item.is_none() {
            return Err(ConversionError::NullElement { index });
        }

        let string: &PyString = item.downcast().map_err(|e| ConversionError::InvalidEncoding {
            index,
            reason: e.to_string(),
        })?;
        let text = string.to_str().map_err(|e| ConversionError::InvalidEncoding {
            index,
            reason: e.to_string(),
        })?;
        Ok(f(text.as_bytes()))
    }
}

fn to_py_err(err: MarshalError) -> PyErr {
    match err {
        MarshalError::Allocation(e) => PyMemoryError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

/// Start the embedded runtime with `arguments` and return its exit code.
#[pyfunction]
#[pyo3(signature = (arguments, library=None, symbol=None))]
fn start(
    py: Python<'_>,
    arguments: &PyList,
    library: Option<PathBuf>,
    symbol: Option<String>,
) -> PyResult<i32> {
    let config = BridgeConfig::discover().map_err(|e| PyValueError::new_err(e.to_string()))?;

    let mut marshaller = Marshaller::with_limits(config.limits());
    let packed = marshaller
        .pack(&PyArguments { list: arguments })
        .map_err(to_py_err)?;

    let library = library
        .or_else(|| config.runtime.library.clone())
        .ok_or_else(|| PyOSError::new_err("no runtime library given or configured"))?;
    let symbol = symbol.unwrap_or_else(|| config.runtime.symbol.clone());

    // SAFETY: the configured symbol is documented to be an `int (*)(int, char**)`.
    let mut entry = unsafe { LibraryEntry::open(&library, &symbol) }
        .map_err(|e| PyOSError::new_err(e.to_string()))?;

    py.allow_threads(move || marshaller.invoke(packed, &mut entry))
        .map_err(to_py_err)
}

/// Install logging as configured. Returns `False` if logging was already set up.
#[pyfunction]
fn init_logging() -> PyResult<bool> {
    let config = BridgeConfig::discover()
        .and_then(|c| c.log_config())
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(init_global_logging(config))
}

#[pymodule]
fn _argv_bridge(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(start, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    m.add("ALLOCATION_FAILED", ALLOCATION_FAILED)?;
    m.add("CONVERSION_FAILED", CONVERSION_FAILED)?;
    m.add("ENTRY_UNAVAILABLE", ENTRY_UNAVAILABLE)?;
    Ok(())
}
