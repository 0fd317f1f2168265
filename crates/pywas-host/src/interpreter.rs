//! Interpreter lifetime.
//!
//! The runtime is started once per process, used, and finalized on the way
//! out. Everything that needs the interpreter runs inside the closure passed
//! to [`Interpreter::run`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use pyo3::prelude::*;
use pyo3::types::PyList;

use crate::error::HostError;

static STARTED: AtomicBool = AtomicBool::new(false);

pub struct Interpreter;

impl Interpreter {
    /// Initialize the runtime, run `f` with the GIL held, then finalize.
    ///
    /// Fails with [`HostError::AlreadyStarted`] on a second call; CPython
    /// cannot be reliably re-initialized after finalization.
    pub fn run<F, R>(f: F) -> Result<R, HostError>
    where
        F: for<'py> FnOnce(Python<'py>) -> R,
    {
        if STARTED.swap(true, Ordering::SeqCst) {
            return Err(HostError::AlreadyStarted);
        }
        tracing::debug!("initializing embedded interpreter");
        // SAFETY: guarded above so this is the only initialization in the
        // process, and no Python handle escapes `f`.
        let result = unsafe { pyo3::with_embedded_python_interpreter(f) };
        tracing::debug!("embedded interpreter finalized");
        Ok(result)
    }
}

/// Append the current directory and then each of `paths` to `sys.path`.
pub fn extend_sys_path<P: AsRef<Path>>(py: Python<'_>, paths: &[P]) -> Result<(), HostError> {
    add_sys_path(py, Path::new("."))?;
    for path in paths {
        add_sys_path(py, path.as_ref())?;
    }
    Ok(())
}

pub fn add_sys_path(py: Python<'_>, path: &Path) -> Result<(), HostError> {
    let sys_path = py
        .import("sys")?
        .getattr("path")?
        .downcast_into::<PyList>()
        .map_err(PyErr::from)?;
    // Path finders skip entries that are not `str`.
    sys_path.append(path.as_os_str())?;
    tracing::debug!(path = %path.display(), "added to sys.path");
    Ok(())
}

/// Point `sys.stdout` at `sys.stderr`.
///
/// Under the gateway, stdout carries the response body; a stray `print()`
/// from the application must not corrupt it.
pub fn redirect_stdout_to_stderr(py: Python<'_>) -> Result<(), HostError> {
    let sys = py.import("sys")?;
    sys.setattr("stdout", sys.getattr("stderr")?)?;
    Ok(())
}
