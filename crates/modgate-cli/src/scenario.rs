//! Scenario files
//!
//! A scenario declares modules, stacks layers built from them, then runs an
//! ordered list of steps against the resulting module system:
//!
//! ```toml
//! [[modules]]
//! name = "m1"
//! requires = ["java.base", "m2"]
//! exports = ["p1"]
//!
//! [[modules]]
//! name = "m2"
//! requires = ["java.base"]
//! qualified = { p2 = ["m1"] }
//!
//! [[layers]]
//! name = "app"
//! roots = ["m1"]
//! loaders = { m1 = "l1", m2 = "l2" }
//!
//! [[steps]]
//! check = { from = "app:m1", to = "app:m2", package = "p2", expect = "allow" }
//! ```

use anyhow::{bail, Context};
use modgate_core::{AccessDecision, BootConfig, DenyReason, ModuleSpec};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Name of the layer every scenario starts from
pub const BOOT_LAYER: &str = "boot";

/// Name of the empty layer below the boot layer
pub const EMPTY_LAYER: &str = "empty";

/// Loader name that maps to the platform loader
pub const PLATFORM_LOADER: &str = "platform";

/// A parsed scenario file
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Boot layer contents; defaults to a lone `java.base`
    #[serde(default)]
    pub boot: BootConfig,

    /// Descriptors available to every layer
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,

    /// Layers, created in file order
    #[serde(default)]
    pub layers: Vec<LayerSpec>,

    /// Mutations and checks, run in file order
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One `[[layers]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSpec {
    /// Name used by module references (`layer:module`)
    pub name: String,

    /// Root modules to resolve
    pub roots: Vec<String>,

    /// Parent layer name
    #[serde(default = "default_parent")]
    pub parent: String,

    /// Module name -> loader name; unmapped modules use the platform loader
    #[serde(default)]
    pub loaders: BTreeMap<String, String>,
}

fn default_parent() -> String {
    BOOT_LAYER.to_string()
}

/// One `[[steps]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// `from` starts reading `to`, or every module when `to` is absent
    AddReads {
        /// Module gaining the edge
        from: ModuleRefSpec,
        /// Module to read
        #[serde(default)]
        to: Option<ModuleRefSpec>,
    },

    /// `module` exports `package` to `to`, or to everyone when `to` is absent
    AddExports {
        /// Exporting module
        module: ModuleRefSpec,
        /// Package to export
        package: String,
        /// Sole new target
        #[serde(default)]
        to: Option<ModuleRefSpec>,
    },

    /// Access check with an expected outcome
    Check(CheckSpec),
}

/// A `check` step
#[derive(Debug, Clone, Deserialize)]
pub struct CheckSpec {
    /// Accessing module
    pub from: ModuleRefSpec,
    /// Accessed module
    pub to: ModuleRefSpec,
    /// Package of the accessed class
    pub package: String,
    /// Expected decision
    pub expect: Expectation,
}

/// Expected decision of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expectation {
    /// Access allowed
    Allow,
    /// Accessor does not read the target
    NotReadable,
    /// Package not exported
    PackageNotExported,
    /// Package exported, but not to the accessor
    PackageNotExportedToModule,
}

impl Expectation {
    /// Whether `decision` is the expected one
    pub fn matches(self, decision: AccessDecision) -> bool {
        self.decision() == decision
    }

    fn decision(self) -> AccessDecision {
        match self {
            Expectation::Allow => AccessDecision::Allow,
            Expectation::NotReadable => AccessDecision::Deny(DenyReason::NotReadable),
            Expectation::PackageNotExported => AccessDecision::Deny(DenyReason::PackageNotExported),
            Expectation::PackageNotExportedToModule => {
                AccessDecision::Deny(DenyReason::PackageNotExportedToModule)
            }
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decision() {
            AccessDecision::Allow => f.write_str("allow"),
            AccessDecision::Deny(reason) => write!(f, "{}", reason),
        }
    }
}

/// Reference to a module from a step
///
/// `layer:module` names a module of a layer (ancestors included);
/// `unnamed:loader` names the unnamed module of a loader.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ModuleRefSpec {
    /// Named module looked up from a layer
    Named {
        /// Layer to start the lookup from
        layer: String,
        /// Module name
        module: String,
    },
    /// Unnamed module of a loader
    Unnamed {
        /// Loader name
        loader: String,
    },
}

impl TryFrom<String> for ModuleRefSpec {
    type Error = String;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        match text.split_once(':') {
            Some(("unnamed", loader)) if !loader.is_empty() => Ok(ModuleRefSpec::Unnamed {
                loader: loader.to_string(),
            }),
            Some((layer, module)) if !layer.is_empty() && !module.is_empty() => {
                Ok(ModuleRefSpec::Named {
                    layer: layer.to_string(),
                    module: module.to_string(),
                })
            }
            _ => Err(format!(
                "invalid module reference '{}', expected 'layer:module' or 'unnamed:loader'",
                text
            )),
        }
    }
}

impl fmt::Display for ModuleRefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleRefSpec::Named { layer, module } => write!(f, "{}:{}", layer, module),
            ModuleRefSpec::Unnamed { loader } => write!(f, "unnamed:{}", loader),
        }
    }
}

impl Scenario {
    /// Parse a scenario from TOML text
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = toml::from_str(text).context("Failed to parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load a scenario file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("In {}", path.display()))
    }

    /// Check layer names and parent links
    fn validate(&self) -> anyhow::Result<()> {
        let mut seen: BTreeSet<&str> = [BOOT_LAYER, EMPTY_LAYER].into_iter().collect();
        for layer in &self.layers {
            if layer.name == "unnamed" || !seen.insert(layer.name.as_str()) {
                bail!("Layer name '{}' is reserved or used twice", layer.name);
            }
            if !seen.contains(layer.parent.as_str()) || layer.parent == layer.name {
                bail!(
                    "Layer '{}' has parent '{}', which is not declared before it",
                    layer.name,
                    layer.parent
                );
            }
        }
        Ok(())
    }
}
