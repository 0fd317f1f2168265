//! Lookups whose "not found" outcome is expected rather than exceptional.

use pyo3::exceptions::{PyAttributeError, PyModuleNotFoundError};
use pyo3::prelude::*;
use pyo3::types::PyModule;

use crate::error::HostError;

/// The outcome of a lookup that is allowed to miss.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    /// Nothing by that name; carries the runtime's explanation.
    NotFound(String),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound(_) => None,
        }
    }
}

/// Import `name`.
///
/// A missing module is [`Lookup::NotFound`]. A module that exists but fails
/// while importing, including one that imports a missing dependency, is an
/// error.
pub fn import_module<'py>(py: Python<'py>, name: &str) -> Result<Lookup<Bound<'py, PyModule>>, HostError> {
    match py.import(name) {
        Ok(module) => Ok(Lookup::Found(module)),
        Err(err) if is_missing_module(py, &err, name) => {
            Ok(Lookup::NotFound(crate::error::exception_message(py, &err)))
        }
        Err(err) => Err(HostError::from_pyerr(py, &err)),
    }
}

fn is_missing_module(py: Python<'_>, err: &PyErr, name: &str) -> bool {
    if !err.is_instance_of::<PyModuleNotFoundError>(py) {
        return false;
    }
    // `name` is the module that could not be found, which for a dotted
    // import may be any prefix of the requested path.
    match err.value(py).getattr("name").and_then(|n| n.extract::<String>()) {
        Ok(missing) => name == missing || name.starts_with(&format!("{missing}.")),
        Err(_) => true,
    }
}

/// Fetch `obj.name`. A missing attribute is [`Lookup::NotFound`].
pub fn get_attribute<'py>(obj: &Bound<'py, PyAny>, name: &str) -> Result<Lookup<Bound<'py, PyAny>>, HostError> {
    let py = obj.py();
    match obj.getattr(name) {
        Ok(value) => Ok(Lookup::Found(value)),
        Err(err) if err.is_instance_of::<PyAttributeError>(py) => {
            Ok(Lookup::NotFound(crate::error::exception_message(py, &err)))
        }
        Err(err) => Err(HostError::from_pyerr(py, &err)),
    }
}

pub fn is_callable(obj: &Bound<'_, PyAny>) -> bool {
    obj.is_callable()
}

/// True for coroutine objects and for `async def` functions.
pub fn is_coroutine(obj: &Bound<'_, PyAny>) -> Result<bool, HostError> {
    let inspect = obj.py().import("inspect")?;
    if inspect.call_method1("iscoroutine", (obj,))?.is_truthy()? {
        return Ok(true);
    }
    Ok(inspect.call_method1("iscoroutinefunction", (obj,))?.is_truthy()?)
}
