//! Resolution of the hosted application callable.
//!
//! ```text
//! module override? ──yes──► import (fatal on miss)
//!        │no
//!        └──► "app" ──miss──► "wsgi" ──miss──► Discovery error
//!
//! attribute override? ──yes──► getattr (fatal on miss / not callable)
//!        │no
//!        └──► "app" ──miss/not callable──► "application" ──► Discovery error
//!
//! then: reject coroutines and `async def` callables
//! ```

use pyo3::prelude::*;
use pyo3::types::PyModule;

use crate::error::HostError;
use crate::lookup::{self, Lookup};
use crate::strings::type_name;

pub const MODULE_CANDIDATES: &[&str] = &["app", "wsgi"];
pub const ATTRIBUTE_CANDIDATES: &[&str] = &["app", "application"];

/// The resolved application, held for the life of the process.
#[derive(Debug)]
pub struct Application {
    object: Py<PyAny>,
    module: String,
    attribute: String,
}

impl Application {
    pub fn bind<'py>(&self, py: Python<'py>) -> &Bound<'py, PyAny> {
        self.object.bind(py)
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

#[derive(Debug, Clone)]
pub struct AppLocator {
    module_candidates: Vec<String>,
    attribute_candidates: Vec<String>,
}

impl Default for AppLocator {
    fn default() -> Self {
        Self {
            module_candidates: MODULE_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            attribute_candidates: ATTRIBUTE_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.module_candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn locate(
        &self,
        py: Python<'_>,
        module: Option<&str>,
        attribute: Option<&str>,
    ) -> Result<Application, HostError> {
        let (module_name, module) = match module {
            Some(name) => (name.to_string(), self.import_override(py, name)?),
            None => self.import_fallback(py)?,
        };

        let (attribute_name, object) = match attribute {
            Some(name) => (name.to_string(), fetch_override(&module, &module_name, name)?),
            None => self.fetch_fallback(&module, &module_name)?,
        };

        if lookup::is_coroutine(&object)? {
            return Err(HostError::Discovery(format!(
                "'{module_name}.{attribute_name}' is a coroutine; asynchronous applications are not supported"
            )));
        }

        tracing::info!(module = %module_name, attribute = %attribute_name, "application loaded");
        Ok(Application {
            object: object.unbind(),
            module: module_name,
            attribute: attribute_name,
        })
    }

    fn import_override<'py>(&self, py: Python<'py>, name: &str) -> Result<Bound<'py, PyModule>, HostError> {
        match lookup::import_module(py, name)? {
            Lookup::Found(module) => Ok(module),
            Lookup::NotFound(reason) => Err(HostError::Discovery(format!(
                "could not import module '{name}': {reason}"
            ))),
        }
    }

    fn import_fallback<'py>(&self, py: Python<'py>) -> Result<(String, Bound<'py, PyModule>), HostError> {
        for name in &self.module_candidates {
            match lookup::import_module(py, name)? {
                Lookup::Found(module) => return Ok((name.clone(), module)),
                Lookup::NotFound(reason) => {
                    tracing::debug!(module = %name, %reason, "candidate module not found");
                }
            }
        }
        Err(HostError::Discovery(format!(
            "could not find an application module; tried {}",
            quoted_list(&self.module_candidates)
        )))
    }

    fn fetch_fallback<'py>(
        &self,
        module: &Bound<'py, PyModule>,
        module_name: &str,
    ) -> Result<(String, Bound<'py, PyAny>), HostError> {
        for name in &self.attribute_candidates {
            match lookup::get_attribute(module.as_any(), name)? {
                Lookup::Found(obj) if lookup::is_callable(&obj) => return Ok((name.clone(), obj)),
                Lookup::Found(obj) => {
                    tracing::debug!(attribute = %name, kind = %type_name(&obj), "candidate attribute is not callable");
                }
                Lookup::NotFound(_) => {}
            }
        }
        Err(HostError::Discovery(format!(
            "could not find a callable application in module '{module_name}'; tried {}",
            quoted_list(&self.attribute_candidates)
        )))
    }
}

fn fetch_override<'py>(
    module: &Bound<'py, PyModule>,
    module_name: &str,
    name: &str,
) -> Result<Bound<'py, PyAny>, HostError> {
    match lookup::get_attribute(module.as_any(), name)? {
        Lookup::Found(obj) if lookup::is_callable(&obj) => Ok(obj),
        Lookup::Found(obj) => Err(HostError::Discovery(format!(
            "'{module_name}.{name}' is not callable (got {})",
            type_name(&obj)
        ))),
        Lookup::NotFound(_) => Err(HostError::Discovery(format!(
            "could not find '{name}' in module '{module_name}'"
        ))),
    }
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
