//! pywas.toml configuration parser.
//!
//! Everything in the file can also be given on the command line; command-line
//! values win, and `sys_path` entries from both sources are concatenated.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where to find the hosted application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Module to import instead of the `app` / `wsgi` fallbacks.
    pub module: Option<String>,
    /// Attribute to use instead of the `app` / `application` fallbacks.
    pub attribute: Option<String>,
    /// Extra entries appended to the runtime's module search path.
    #[serde(default)]
    pub sys_path: Vec<PathBuf>,
}

/// Defaults for `SERVER_NAME` / `SERVER_PORT` when no `Host` header is sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 80;

    pub fn host_or_default(&self) -> &str {
        self.host.as_deref().unwrap_or(Self::DEFAULT_HOST)
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(Self::DEFAULT_PORT)
    }
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Layer `overrides` on top of `self`.
    pub fn merge(mut self, overrides: BridgeConfig) -> Self {
        if overrides.app.module.is_some() {
            self.app.module = overrides.app.module;
        }
        if overrides.app.attribute.is_some() {
            self.app.attribute = overrides.app.attribute;
        }
        self.app.sys_path.extend(overrides.app.sys_path);
        if overrides.server.host.is_some() {
            self.server.host = overrides.server.host;
        }
        if overrides.server.port.is_some() {
            self.server.port = overrides.server.port;
        }
        self
    }
}
