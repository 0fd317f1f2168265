//! Conversions between wire bytes and the interpreter's text type.
//!
//! Two encodings are in play. Names the operator types on the command line
//! (modules, attributes) are UTF-8. Strings handed to or received from the
//! application through the calling convention are Latin-1: every byte maps
//! to the code point of the same value, so arbitrary bytes survive a round
//! trip and code points above U+00FF are rejected on the way back.

use std::borrow::Cow;

use pyo3::buffer::PyBuffer;
use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyString};
use thiserror::Error;

use crate::error::HostError;

/// A native string contained a character Latin-1 cannot represent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("string '{text}' cannot be encoded as Latin-1: code point U+{code_point:04X} is out of range")]
pub struct EncodingError {
    pub text: String,
    pub code_point: u32,
}

impl From<EncodingError> for PyErr {
    fn from(err: EncodingError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

/// Validate an operator-supplied name as UTF-8.
pub fn decode_utf8(bytes: &[u8]) -> Result<&str, HostError> {
    std::str::from_utf8(bytes)
        .map_err(|_| HostError::InvalidName(String::from_utf8_lossy(bytes).into_owned()))
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub fn encode_latin1(text: &str) -> Result<Vec<u8>, EncodingError> {
    text.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| EncodingError {
                text: text.to_string(),
                code_point: u32::from(c),
            })
        })
        .collect()
}

/// Wire bytes as a native string.
pub fn to_native_string<'py>(py: Python<'py>, bytes: &[u8]) -> Bound<'py, PyString> {
    PyString::new(py, &decode_latin1(bytes))
}

/// A native string back to wire bytes. Non-`str` objects raise `TypeError`.
pub fn from_native_string(obj: &Bound<'_, PyAny>) -> PyResult<Vec<u8>> {
    let s = obj
        .downcast::<PyString>()
        .map_err(|_| PyTypeError::new_err(format!("expected str, got {}", type_name(obj))))?;
    Ok(encode_latin1(&s.to_cow()?)?)
}

/// Borrow the bytes of a body chunk.
///
/// `bytes` is borrowed without copying; other buffer-protocol objects
/// (`bytearray`, `memoryview`) are copied out; `str` is UTF-8 encoded.
pub fn to_byte_sequence<'a>(obj: &'a Bound<'_, PyAny>) -> PyResult<Cow<'a, [u8]>> {
    if let Ok(bytes) = obj.downcast::<PyBytes>() {
        return Ok(Cow::Borrowed(bytes.as_bytes()));
    }
    if let Ok(s) = obj.downcast::<PyString>() {
        return Ok(match s.to_cow()? {
            Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
            Cow::Owned(s) => Cow::Owned(s.into_bytes()),
        });
    }
    match PyBuffer::<u8>::get(obj) {
        Ok(buffer) => Ok(Cow::Owned(buffer.to_vec(obj.py())?)),
        Err(_) => Err(PyTypeError::new_err(format!(
            "response body items must be bytes, got {}",
            type_name(obj)
        ))),
    }
}

pub(crate) fn type_name(obj: &Bound<'_, PyAny>) -> String {
    obj.get_type()
        .name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unknown>".to_string())
}
