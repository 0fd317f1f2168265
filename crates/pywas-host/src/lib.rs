//! pywas-host: Embedded Python runtime for pywas.
//!
//! Owns everything that touches the interpreter outside a single request:
//!
//! - **interpreter**: process-wide start/stop bracketing, `sys.path`
//!   additions, stdout redirection
//! - **strings**: native-string ⇄ byte marshaling (UTF-8 for import names,
//!   Latin-1 round trip for calling-convention strings)
//! - **error**: conversion of Python exceptions into [`HostError`]
//! - **lookup**: typed module/attribute lookups that report expected misses
//!   as values instead of exceptions
//! - **locator**: resolution of the hosted application callable
//!
//! Object lifetimes follow pyo3's handles: `Py<T>` is the exclusively owned,
//! move-only reference that decrements on drop; `Bound<'py, T>` ties a
//! reference to a held GIL.

pub mod error;
pub mod interpreter;
pub mod locator;
pub mod lookup;
pub mod strings;

pub use error::HostError;
pub use interpreter::Interpreter;
pub use locator::{AppLocator, Application};
pub use lookup::Lookup;
pub use strings::EncodingError;
