// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client configuration file parser
//!
//! The file (typically `~/.vsphere/config`) names one or more endpoints and
//! the datacenter to pin each one to.
//!
//! ```yaml
//! context: lab
//! contexts:
//!   lab:
//!     endpoint: vcenter.lab.example.com
//!     datacenter: dc0
//!     wait_max_seconds: 30
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::client::VsphereClientConfig;
use crate::error::{Result, VsphereError};

/// Path of the config file.
pub const ENV_VSPHERECONFIG: &str = "VSPHERECONFIG";
/// Name of the context to use instead of the file's active one.
pub const ENV_VSPHERE_CONTEXT: &str = "VSPHERE_CONTEXT";
/// Endpoint to use instead of the active context's.
pub const ENV_VSPHERE_ENDPOINT: &str = "VSPHERE_ENDPOINT";
/// Datacenter to use instead of the active context's.
pub const ENV_VSPHERE_DATACENTER: &str = "VSPHERE_DATACENTER";

/// The entire configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VsphereConfig {
    /// The currently active context name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Map of context names to their configurations
    #[serde(default)]
    pub contexts: HashMap<String, VsphereContext>,
}

/// Connection settings for one endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VsphereContext {
    /// SDK endpoint; a bare host name is accepted
    pub endpoint: String,

    /// Inventory path of the datacenter to pin to
    pub datacenter: String,

    /// Seconds each task long-poll may be held open by the remote side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_max_seconds: Option<i32>,
}

impl VsphereConfig {
    /// Load configuration from the default location (~/.vsphere/config)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The home directory cannot be determined
    /// - The config file cannot be read
    /// - The config file is malformed
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load from [`VsphereConfig::config_path`] and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load_from_path(Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file is malformed YAML
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            VsphereError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| VsphereError::Config(format!("Failed to parse config YAML: {}", e)))
    }

    /// Get the default config file path (~/.vsphere/config)
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| VsphereError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".vsphere").join("config"))
    }

    /// Get the path to the config file, respecting VSPHERECONFIG
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined when
    /// VSPHERECONFIG is not set
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var(ENV_VSPHERECONFIG) {
            Ok(PathBuf::from(env_path))
        } else {
            Self::default_path()
        }
    }

    /// Apply overrides looked up through `lookup`.
    ///
    /// `VSPHERE_CONTEXT` switches the active context. `VSPHERE_ENDPOINT` and
    /// `VSPHERE_DATACENTER` patch the active context, creating an `env`
    /// context when there is none and both are given.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(ENV_VSPHERE_CONTEXT).filter(|s| !s.is_empty()) {
            self.context = Some(name);
        }
        let endpoint = lookup(ENV_VSPHERE_ENDPOINT).filter(|s| !s.is_empty());
        let datacenter = lookup(ENV_VSPHERE_DATACENTER).filter(|s| !s.is_empty());
        if endpoint.is_none() && datacenter.is_none() {
            return;
        }

        if self.active_context().is_none() {
            let (Some(endpoint), Some(datacenter)) = (endpoint, datacenter) else {
                return;
            };
            self.contexts.insert(
                "env".to_string(),
                VsphereContext {
                    endpoint,
                    datacenter,
                    wait_max_seconds: None,
                },
            );
            self.context = Some("env".to_string());
            return;
        }

        let name = self.context.clone().unwrap_or_default();
        if let Some(ctx) = self.contexts.get_mut(&name) {
            if let Some(endpoint) = endpoint {
                ctx.endpoint = endpoint;
            }
            if let Some(datacenter) = datacenter {
                ctx.datacenter = datacenter;
            }
        }
    }

    /// Get the currently active context
    ///
    /// Returns `None` if no active context is set or if the context doesn't exist
    pub fn active_context(&self) -> Option<&VsphereContext> {
        self.context
            .as_ref()
            .and_then(|name| self.contexts.get(name))
    }

    /// Get a context by name
    pub fn get_context(&self, name: &str) -> Option<&VsphereContext> {
        self.contexts.get(name)
    }

    /// List all available context names
    pub fn context_names(&self) -> Vec<&String> {
        self.contexts.keys().collect()
    }
}

impl VsphereContext {
    /// Client configuration for this context, with defaults for everything
    /// the file does not set.
    #[must_use]
    pub fn client_config(&self) -> VsphereClientConfig {
        let mut builder = VsphereClientConfig::builder(&self.endpoint, &self.datacenter);
        if let Some(seconds) = self.wait_max_seconds {
            builder = builder.wait_max_seconds(seconds);
        }
        builder.build()
    }
}
