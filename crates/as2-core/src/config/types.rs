//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server-wide settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Partnerships declared inline: [[partnerships]]
    #[serde(default)]
    pub partnerships: Vec<PartnershipConfig>,
}

/// Server-wide settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base directory for `%home%` substitution and relative paths.
    /// Relative values are taken relative to the config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    /// What to do when a single partnership poller fails to load
    #[serde(default)]
    pub on_poller_error: PollerErrorPolicy,
    /// Additional files holding [[partnerships]] entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partnership_files: Vec<PathBuf>,
}

/// Policy applied by the loader when one poller entry fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerErrorPolicy {
    /// Abort the whole configuration load
    #[default]
    Abort,
    /// Log the failure and keep loading the remaining entries
    Skip,
}

/// A configured trading relationship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnershipConfig {
    /// Partnership name, e.g. "acme-to-globex"
    pub name: String,
    /// Outbound directory poller for this partnership, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poller: Option<ModuleSpec>,
}

/// Declarative description of a processor module.
///
/// `type` selects a constructor in the server's module factory table; every
/// other key is passed to the module as a string parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    #[serde(rename = "type")]
    pub module_type: String,
    #[serde(flatten)]
    pub parameters: toml::Table,
}

impl ModuleSpec {
    pub fn new(module_type: impl Into<String>) -> Self {
        Self {
            module_type: module_type.into(),
            parameters: toml::Table::new(),
        }
    }

    /// Builder-style parameter insertion, mostly for tests and embedding.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into(), toml::Value::String(value.into()));
        self
    }

    /// Module parameters flattened to strings.
    ///
    /// Strings are taken verbatim; numbers and booleans use their TOML
    /// rendering (`interval = 5` becomes `"5"`).
    pub fn string_parameters(&self) -> BTreeMap<String, String> {
        self.parameters
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }
}
