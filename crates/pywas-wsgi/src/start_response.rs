//! The `start_response` callable.

use std::cell::RefCell;
use std::rc::Rc;

use pyo3::exceptions::{PyAssertionError, PyBaseException, PyNotImplementedError, PyOSError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyList, PyTuple, PyType};

use pywas_core::header::header_match;
use pywas_core::http::{is_hop_by_hop, is_valid_header_name, is_valid_header_value, is_valid_status};
use pywas_core::Response;
use pywas_host::strings::from_native_string;

use crate::context::{CallContext, CommitState};

#[pyclass(unsendable, module = "pywas")]
pub struct StartResponse {
    context: Rc<RefCell<CallContext>>,
}

impl StartResponse {
    pub fn new(context: Rc<RefCell<CallContext>>) -> Self {
        Self { context }
    }
}

#[pymethods]
impl StartResponse {
    #[pyo3(signature = (status, headers, exc_info = None))]
    fn __call__(
        &self,
        py: Python<'_>,
        status: &Bound<'_, PyAny>,
        headers: &Bound<'_, PyAny>,
        exc_info: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Py<WriteUnsupported>> {
        let state = self.context.borrow().state();
        let already_started = self.context.borrow().response().is_status_set();
        if state == CommitState::Invalidated {
            return Err(PyRuntimeError::new_err(
                "start_response called after the request has completed",
            ));
        }
        let exception = exc_info.map(exception_from_info).transpose()?;
        match (state, exception) {
            (CommitState::Committed, Some(exception)) => return Err(PyErr::from_value(exception)),
            (_, None) if already_started => {
                return Err(PyAssertionError::new_err(
                    "start_response called a second time without exc_info",
                ));
            }
            _ => {}
        }

        let response = parse_response(status, headers)?;
        tracing::trace!(status = response.status, headers = response.headers().len(), "start_response");

        let mut context = self.context.borrow_mut();
        context.set_response(response);
        // Headers may go out early only for an explicit zero length.
        if context.response().content_length == Some(0) {
            context
                .commit()
                .map_err(|err| PyOSError::new_err(err.to_string()))?;
        }
        drop(context);

        Py::new(py, WriteUnsupported)
    }
}

/// Returned from `start_response`. Only the iterable body is supported.
#[pyclass(module = "pywas")]
pub struct WriteUnsupported;

#[pymethods]
impl WriteUnsupported {
    fn __call__(&self, _data: &Bound<'_, PyAny>) -> PyResult<()> {
        Err(PyNotImplementedError::new_err(
            "the write() callable is not supported; return an iterable instead",
        ))
    }
}

/// The exception an `exc_info` triple describes, with its traceback attached.
fn exception_from_info<'py>(exc_info: &Bound<'py, PyAny>) -> PyResult<Bound<'py, PyAny>> {
    let invalid = || PyTypeError::new_err("exc_info must be a (type, value, traceback) tuple");
    let exc_info = exc_info.downcast::<PyTuple>().map_err(|_| invalid())?;
    if exc_info.len() != 3 {
        return Err(invalid());
    }
    let is_exception_class = match exc_info.get_item(0)?.downcast::<PyType>() {
        Ok(kind) => kind.is_subclass_of::<PyBaseException>()?,
        Err(_) => false,
    };
    let value = exc_info.get_item(1)?;
    if !is_exception_class || !value.is_instance_of::<PyBaseException>() {
        return Err(invalid());
    }
    let traceback = exc_info.get_item(2)?;
    if traceback.is_none() {
        Ok(value)
    } else {
        value.call_method1("with_traceback", (traceback,))
    }
}

/// Validate and convert the arguments of one `start_response` call.
pub fn parse_response(status: &Bound<'_, PyAny>, headers: &Bound<'_, PyAny>) -> PyResult<Response> {
    let status_line = from_native_string(status)?;
    let mut response = Response::new(parse_status_line(&status_line)?);

    let headers = headers
        .downcast::<PyList>()
        .map_err(|_| PyTypeError::new_err("response headers must be a list"))?;
    for item in headers.iter() {
        let pair = item
            .downcast::<PyTuple>()
            .ok()
            .filter(|t| t.len() == 2)
            .ok_or_else(|| PyTypeError::new_err("each response header must be a (name, value) tuple"))?;
        let name = from_native_string(&pair.get_item(0)?)?;
        let value = from_native_string(&pair.get_item(1)?)?;
        validate_header(&name, &value)?;
        response
            .add_header(name, value)
            .map_err(|err| PyValueError::new_err(err.to_string()))?;
    }
    Ok(response)
}

/// `"200 OK"` → `200`. The reason phrase may be empty but the space may not.
pub fn parse_status_line(line: &[u8]) -> PyResult<u16> {
    let invalid = || {
        PyValueError::new_err(format!(
            "invalid status line '{}'",
            String::from_utf8_lossy(line)
        ))
    };
    if line.len() < 4 || line[3] != b' ' || !line[..3].iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let code = line[..3]
        .iter()
        .fold(0u16, |acc, &d| acc * 10 + u16::from(d - b'0'));
    if !is_valid_status(code) {
        return Err(PyValueError::new_err(format!("invalid HTTP status code {code}")));
    }
    Ok(code)
}

fn validate_header(name: &[u8], value: &[u8]) -> PyResult<()> {
    if !is_valid_header_name(name) {
        return Err(PyValueError::new_err(format!(
            "invalid header name '{}'",
            String::from_utf8_lossy(name)
        )));
    }
    if !is_valid_header_value(value) {
        return Err(PyValueError::new_err(format!(
            "invalid value for header '{}'",
            String::from_utf8_lossy(name)
        )));
    }
    if is_hop_by_hop(name) && !header_match(name, b"Content-Length") {
        return Err(PyValueError::new_err(format!(
            "hop-by-hop header '{}' is not allowed",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(())
}
