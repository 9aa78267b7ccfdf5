//! Module system configuration (`modgate.toml`)
//!
//! Describes the boot layer: the name and packages of the base module and
//! any further modules bound to the platform loader at startup.
//!
//! ```toml
//! [boot]
//! base_module = "java.base"
//! base_packages = ["java.lang", "java.io"]
//!
//! [[boot.modules]]
//! name = "java.logging"
//! requires = ["java.base"]
//! exports = ["java.util.logging"]
//! ```

use crate::descriptor::{DescriptorError, ModuleDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A module entry does not form a valid descriptor
    #[error("Invalid module in configuration: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Semantically invalid configuration
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    /// Boot layer contents
    #[serde(default)]
    pub boot: BootConfig,
}

/// Boot layer contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BootConfig {
    /// Name of the always-readable base module (default: "java.base")
    #[serde(default = "default_base_module")]
    pub base_module: String,

    /// Packages the base module exports unqualifiedly
    #[serde(default = "default_base_packages")]
    pub base_packages: Vec<String>,

    /// Additional platform modules
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

fn default_base_module() -> String {
    "java.base".to_string()
}

fn default_base_packages() -> Vec<String> {
    ["java.lang", "java.lang.reflect", "java.io", "java.util"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            base_module: default_base_module(),
            base_packages: default_base_packages(),
            modules: Vec::new(),
        }
    }
}

/// Declarative form of a module descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModuleSpec {
    /// Module name
    pub name: String,

    /// Required module names
    #[serde(default)]
    pub requires: Vec<String>,

    /// Packages exported to everyone
    #[serde(default)]
    pub exports: Vec<String>,

    /// Packages exported to named modules only: package -> targets
    #[serde(default)]
    pub qualified: BTreeMap<String, Vec<String>>,

    /// Packages contained but not exported
    #[serde(default)]
    pub contains: Vec<String>,
}

impl ModuleSpec {
    /// Build the descriptor this entry declares
    pub fn to_descriptor(&self) -> Result<ModuleDescriptor, DescriptorError> {
        let mut builder = ModuleDescriptor::builder(self.name.clone());
        for required in &self.requires {
            builder = builder.requires(required.clone());
        }
        for package in &self.exports {
            builder = builder.exports(package.clone());
        }
        for (package, targets) in &self.qualified {
            builder = builder.exports_to(package.clone(), targets.iter().cloned());
        }
        for package in &self.contains {
            builder = builder.contains(package.clone());
        }
        builder.build()
    }
}

impl SystemConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check the boot section for mistakes that parsing cannot catch
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_descriptor()?;
        for module in &self.boot.modules {
            if module.name == self.boot.base_module {
                return Err(ConfigError::Invalid(format!(
                    "boot module '{}' has the same name as the base module",
                    module.name
                )));
            }
            module.to_descriptor()?;
        }
        Ok(())
    }

    /// Descriptor of the base module
    pub fn base_descriptor(&self) -> Result<ModuleDescriptor, DescriptorError> {
        let mut builder = ModuleDescriptor::builder(self.boot.base_module.clone());
        for package in &self.boot.base_packages {
            builder = builder.exports(package.clone());
        }
        builder.build()
    }
}
