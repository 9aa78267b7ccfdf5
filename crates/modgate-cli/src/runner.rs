//! Scenario execution
//!
//! Builds a [`ModuleSystem`] from a scenario, creates its layers, then runs
//! its steps in order, collecting one [`CheckOutcome`] per check.

use crate::scenario::{
    CheckSpec, Expectation, LayerSpec, ModuleRefSpec, Scenario, Step, BOOT_LAYER, EMPTY_LAYER,
    PLATFORM_LOADER,
};
use anyhow::{anyhow, Context};
use modgate_core::{
    check_access, AccessDecision, Layer, LayerId, Loader, ModuleFinder, ModuleLibrary, ModuleRef,
    ModuleSystem, SystemConfig,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one check step
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// `from -> to package` label
    pub label: String,
    /// Expected decision
    pub expected: Expectation,
    /// Actual decision
    pub actual: AccessDecision,
}

impl CheckOutcome {
    /// Whether the actual decision was the expected one
    pub fn passed(&self) -> bool {
        self.expected.matches(self.actual)
    }
}

/// Results of a whole run
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// Check outcomes in step order
    pub checks: Vec<CheckOutcome>,
    /// Number of mutation steps applied
    pub mutations: usize,
}

impl Report {
    /// Number of failed checks
    pub fn failures(&self) -> usize {
        self.checks.iter().filter(|check| !check.passed()).count()
    }
}

/// A module system populated from a scenario
pub struct Runner {
    system: ModuleSystem,
    library: ModuleLibrary,
    layers: BTreeMap<String, LayerId>,
    loaders: HashMap<String, Loader>,
}

impl Runner {
    /// Create the module system and every layer of `scenario`
    pub fn build(scenario: &Scenario) -> anyhow::Result<Self> {
        let system = ModuleSystem::with_config(SystemConfig {
            boot: scenario.boot.clone(),
        })
        .context("Failed to create the boot layer")?;

        let mut library = ModuleLibrary::new();
        for spec in &scenario.modules {
            let descriptor = spec
                .to_descriptor()
                .with_context(|| format!("Invalid module '{}'", spec.name))?;
            library.add(descriptor)?;
        }

        let mut layers = BTreeMap::new();
        layers.insert(EMPTY_LAYER.to_string(), system.empty_layer());
        layers.insert(BOOT_LAYER.to_string(), system.boot_layer());

        let mut runner = Self {
            system,
            library,
            layers,
            loaders: HashMap::new(),
        };
        for spec in &scenario.layers {
            runner
                .create_layer(spec)
                .with_context(|| format!("Failed to create layer '{}'", spec.name))?;
        }
        Ok(runner)
    }

    /// The populated module system
    #[cfg(test)]
    pub fn system(&self) -> &ModuleSystem {
        &self.system
    }

    /// Layer registered under `name`
    pub fn layer(&self, name: &str) -> Option<Arc<Layer>> {
        self.layers
            .get(name)
            .and_then(|id| self.system.layer(*id))
    }

    /// Declared modules that no scenario layer defines, by name
    pub fn unused_modules(&self) -> Vec<String> {
        let defined: Vec<Arc<Layer>> = self
            .layers
            .values()
            .filter_map(|id| self.system.layer(*id))
            .collect();
        self.library
            .find_all()
            .into_iter()
            .map(|descriptor| descriptor.name().to_string())
            .filter(|name| defined.iter().all(|layer| layer.module(name).is_none()))
            .collect()
    }

    fn create_layer(&mut self, spec: &LayerSpec) -> anyhow::Result<()> {
        let parent = self
            .layer(&spec.parent)
            .ok_or_else(|| anyhow!("Unknown parent layer '{}'", spec.parent))?;

        let roots: Vec<&str> = spec.roots.iter().map(String::as_str).collect();
        let cf = self
            .system
            .resolve(&self.library, parent.configuration().id(), &[], &roots)?;

        let mut loaders = HashMap::new();
        for (module, loader) in &spec.loaders {
            loaders.insert(module.clone(), self.loader(loader));
        }
        let layer = self
            .system
            .create_layer_with_map(&cf, parent.id(), &loaders)?;

        info!(layer = %spec.name, id = %layer.id(), modules = layer.len(), "scenario layer created");
        self.layers.insert(spec.name.clone(), layer.id());
        Ok(())
    }

    /// Loader registered under `name`, allocating a new one on first use
    fn loader(&mut self, name: &str) -> Loader {
        if name == PLATFORM_LOADER {
            return Loader::Platform;
        }
        *self
            .loaders
            .entry(name.to_string())
            .or_insert_with(Loader::custom)
    }

    fn module(&mut self, reference: &ModuleRefSpec) -> anyhow::Result<ModuleRef> {
        match reference {
            ModuleRefSpec::Named { layer, module } => {
                let id = self
                    .layers
                    .get(layer)
                    .ok_or_else(|| anyhow!("Unknown layer '{}' in {}", layer, reference))?;
                self.system
                    .find_module(*id, module)
                    .ok_or_else(|| anyhow!("Module {} not found", reference))
            }
            ModuleRefSpec::Unnamed { loader } => {
                let loader = self.loader(loader);
                Ok(self.system.unnamed_module(loader))
            }
        }
    }

    /// Run every step of `scenario`
    ///
    /// Failed expectations are reported, not returned as errors; an error
    /// means a step could not be carried out at all.
    pub fn run(&mut self, scenario: &Scenario) -> anyhow::Result<Report> {
        let mut report = Report::default();
        for (index, step) in scenario.steps.iter().enumerate() {
            debug!(step = index + 1, "running step");
            match step {
                Step::AddReads { from, to } => {
                    let from = self.module(from)?;
                    let to = to.as_ref().map(|to| self.module(to)).transpose()?;
                    from.add_reads(to.as_deref());
                    report.mutations += 1;
                }
                Step::AddExports {
                    module,
                    package,
                    to,
                } => {
                    let module = self.module(module)?;
                    let to = to.as_ref().map(|to| self.module(to)).transpose()?;
                    module
                        .add_exports(package, to.as_deref())
                        .with_context(|| format!("Step {} failed", index + 1))?;
                    report.mutations += 1;
                }
                Step::Check(check) => report.checks.push(self.check(check)?),
            }
        }
        Ok(report)
    }

    fn check(&mut self, check: &CheckSpec) -> anyhow::Result<CheckOutcome> {
        let from = self.module(&check.from)?;
        let to = self.module(&check.to)?;
        Ok(CheckOutcome {
            label: format!("{} -> {} {}", check.from, check.to, check.package),
            expected: check.expect,
            actual: check_access(&from, &to, &check.package),
        })
    }
}
