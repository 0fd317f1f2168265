use pyo3::prelude::*;
use thiserror::Error;

use crate::strings::EncodingError;

#[derive(Debug, Error)]
pub enum HostError {
    /// A Python exception, stringified at the point it crossed into Rust.
    #[error("Python exception: {message}")]
    Python { message: String },

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("name is not valid UTF-8: {0:?}")]
    InvalidName(String),

    #[error("the embedded interpreter was already started in this process")]
    AlreadyStarted,

    #[error("{0}")]
    Discovery(String),
}

impl HostError {
    pub fn from_pyerr(py: Python<'_>, err: &PyErr) -> Self {
        HostError::Python {
            message: exception_message(py, err),
        }
    }
}

impl From<PyErr> for HostError {
    fn from(err: PyErr) -> Self {
        Python::with_gil(|py| HostError::from_pyerr(py, &err))
    }
}

/// `str(exc)`, or the exception type name when that is empty.
pub fn exception_message(py: Python<'_>, err: &PyErr) -> String {
    let message = err
        .value(py)
        .str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Cannot convert Python exception to string".to_string());
    if !message.is_empty() {
        return message;
    }
    err.get_type(py)
        .name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown exception".to_string())
}
