//! Runtime modules
//!
//! A [`Module`] is the live counterpart of a descriptor inside one layer. Its
//! identity is the pair `(name, loader)`: two modules with the same name bound
//! to different loaders are unrelated. Readability edges and the export table
//! start out as declared by the descriptor and can only grow afterwards,
//! through [`Module::add_reads`] and [`Module::add_exports`].

use crate::descriptor::{ExportSpec, ModuleDescriptor};
use crate::layer::LayerId;
use crate::loader::Loader;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Shared handle to a runtime module
pub type ModuleRef = Arc<Module>;

/// Raised by [`Module::add_exports`] for a package the module does not contain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Package {package} not in module {module}")]
pub struct NotOwnedPackageError {
    /// The module asked to export
    pub module: String,
    /// The package it does not contain
    pub package: String,
}

/// Composite key of a runtime module
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleIdentity {
    /// Module name, `None` for the unnamed module of a loader
    pub name: Option<String>,
    /// Defining loader
    pub loader: Loader,
}

impl ModuleIdentity {
    /// Identity of the named module `name` defined by `loader`
    pub fn named(name: impl Into<String>, loader: Loader) -> Self {
        Self {
            name: Some(name.into()),
            loader,
        }
    }

    /// Identity of the unnamed module of `loader`
    pub fn unnamed(loader: Loader) -> Self {
        Self { name: None, loader }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}@{}", name, self.loader),
            None => write!(f, "<unnamed>@{}", self.loader),
        }
    }
}

/// Export entry of a runtime module, targets bound to concrete identities
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeExport {
    /// Exported to every reader
    Unqualified,
    /// Exported to the listed modules only
    Qualified(FxHashSet<ModuleIdentity>),
}

impl RuntimeExport {
    fn allows(&self, module: &ModuleIdentity) -> bool {
        match self {
            RuntimeExport::Unqualified => true,
            RuntimeExport::Qualified(targets) => targets.contains(module),
        }
    }
}

/// Outcome of looking up a package in a module's export table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportVisibility {
    Visible,
    NotExported,
    NotExportedToModule,
}

#[derive(Debug, Default)]
struct ModuleState {
    reads: FxHashSet<ModuleIdentity>,
    loose_reads: bool,
    exports: BTreeMap<String, RuntimeExport>,
}

/// Live module inside a layer
pub struct Module {
    identity: ModuleIdentity,
    descriptor: Option<Arc<ModuleDescriptor>>,
    layer: Option<LayerId>,
    is_base: bool,
    state: RwLock<ModuleState>,
}

impl Module {
    /// Create a named module with the given initial readability and exports
    pub(crate) fn named(
        descriptor: Arc<ModuleDescriptor>,
        loader: Loader,
        layer: LayerId,
        is_base: bool,
        reads: FxHashSet<ModuleIdentity>,
        exports: BTreeMap<String, RuntimeExport>,
    ) -> Self {
        Self {
            identity: ModuleIdentity::named(descriptor.name(), loader),
            descriptor: Some(descriptor),
            layer: Some(layer),
            is_base,
            state: RwLock::new(ModuleState {
                reads,
                loose_reads: false,
                exports,
            }),
        }
    }

    /// Create the unnamed module of `loader`; it reads every module
    pub(crate) fn unnamed(loader: Loader) -> Self {
        Self {
            identity: ModuleIdentity::unnamed(loader),
            descriptor: None,
            layer: None,
            is_base: false,
            state: RwLock::new(ModuleState {
                loose_reads: true,
                ..ModuleState::default()
            }),
        }
    }

    /// Composite identity of this module
    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    /// Module name, `None` when unnamed
    pub fn name(&self) -> Option<&str> {
        self.identity.name.as_deref()
    }

    /// Defining loader
    pub fn loader(&self) -> Loader {
        self.identity.loader
    }

    /// Whether this is a named module
    pub fn is_named(&self) -> bool {
        self.identity.name.is_some()
    }

    /// Whether this is the always-readable base module
    pub fn is_base(&self) -> bool {
        self.is_base
    }

    /// Descriptor of a named module
    pub fn descriptor(&self) -> Option<&Arc<ModuleDescriptor>> {
        self.descriptor.as_ref()
    }

    /// Layer the module was defined in, `None` for unnamed modules
    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    /// Whether the module contains `package`
    ///
    /// Unnamed modules answer `true`: whatever package a class of the loader
    /// lives in belongs to that loader's unnamed module.
    pub fn contains_package(&self, package: &str) -> bool {
        match &self.descriptor {
            Some(descriptor) => descriptor.contains(package),
            None => true,
        }
    }

    /// Whether the module reads every other module
    pub fn is_loose(&self) -> bool {
        self.state.read().loose_reads
    }

    /// Explicit readability edges, sorted
    pub fn reads(&self) -> Vec<ModuleIdentity> {
        let mut reads: Vec<_> = self.state.read().reads.iter().cloned().collect();
        reads.sort();
        reads
    }

    /// Whether this module can read `other`
    pub fn can_read(&self, other: &Module) -> bool {
        if self.identity == other.identity || other.is_base {
            return true;
        }
        let state = self.state.read();
        state.loose_reads || state.reads.contains(&other.identity)
    }

    /// Whether `package` is exported to every module
    pub fn is_exported(&self, package: &str) -> bool {
        if !self.is_named() {
            return true;
        }
        matches!(
            self.state.read().exports.get(package),
            Some(RuntimeExport::Unqualified)
        )
    }

    /// Whether `package` is exported to `other`
    pub fn is_exported_to(&self, package: &str, other: &Module) -> bool {
        self.identity == other.identity
            || self.export_visibility(package, &other.identity) == ExportVisibility::Visible
    }

    /// Current export table as module-name based specs
    ///
    /// Qualified targets are reported by name; an unnamed target shows up as
    /// `<unnamed>`.
    pub fn exports(&self) -> BTreeMap<String, ExportSpec> {
        self.state
            .read()
            .exports
            .iter()
            .map(|(package, export)| {
                let spec = match export {
                    RuntimeExport::Unqualified => ExportSpec::Unqualified,
                    RuntimeExport::Qualified(targets) => ExportSpec::Qualified(
                        targets
                            .iter()
                            .map(|t| t.name.clone().unwrap_or_else(|| "<unnamed>".to_string()))
                            .collect(),
                    ),
                };
                (package.clone(), spec)
            })
            .collect()
    }

    pub(crate) fn export_visibility(
        &self,
        package: &str,
        accessor: &ModuleIdentity,
    ) -> ExportVisibility {
        if !self.is_named() {
            return ExportVisibility::Visible;
        }
        match self.state.read().exports.get(package) {
            None => ExportVisibility::NotExported,
            Some(export) if export.allows(accessor) => ExportVisibility::Visible,
            Some(_) => ExportVisibility::NotExportedToModule,
        }
    }

    /// Make this module read `other`; `None` makes it read every module
    ///
    /// Idempotent, and a no-op for unnamed modules, which already read
    /// everything.
    pub fn add_reads(&self, other: Option<&Module>) {
        if !self.is_named() {
            return;
        }
        match other {
            None => {
                let mut state = self.state.write();
                if !state.loose_reads {
                    state.loose_reads = true;
                    debug!(module = %self.identity, "module now reads all modules");
                }
            }
            Some(other) if other.identity == self.identity => {}
            Some(other) => {
                if self.state.write().reads.insert(other.identity.clone()) {
                    debug!(module = %self.identity, reads = %other.identity, "readability edge added");
                }
            }
        }
    }

    /// Export `package` to `to`, or to every module when `to` is `None`
    ///
    /// Never narrows an existing export. Unnamed modules export all their
    /// packages already, so this is a no-op for them.
    ///
    /// # Returns
    /// * `Ok(())` - The export is in place
    /// * `Err(NotOwnedPackageError)` - The module does not contain `package`
    pub fn add_exports(&self, package: &str, to: Option<&Module>) -> Result<(), NotOwnedPackageError> {
        if !self.is_named() {
            return Ok(());
        }
        if !self.contains_package(package) {
            return Err(NotOwnedPackageError {
                module: self.identity.to_string(),
                package: package.to_string(),
            });
        }

        let mut state = self.state.write();
        match to {
            None => {
                state
                    .exports
                    .insert(package.to_string(), RuntimeExport::Unqualified);
                debug!(module = %self.identity, package, "package exported to all modules");
            }
            Some(target) if target.identity == self.identity => {}
            Some(target) => match state.exports.entry(package.to_string()) {
                Entry::Occupied(mut entry) => {
                    if let RuntimeExport::Qualified(targets) = entry.get_mut() {
                        if targets.insert(target.identity.clone()) {
                            debug!(module = %self.identity, package, to = %target.identity, "qualified export target added");
                        }
                    }
                }
                Entry::Vacant(entry) => {
                    let mut targets = FxHashSet::default();
                    targets.insert(target.identity.clone());
                    entry.insert(RuntimeExport::Qualified(targets));
                    debug!(module = %self.identity, package, to = %target.identity, "qualified export added");
                }
            },
        }
        Ok(())
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Module {}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Module")
            .field("identity", &self.identity)
            .field("layer", &self.layer)
            .field("is_base", &self.is_base)
            .field("loose_reads", &state.loose_reads)
            .field("reads", &state.reads.len())
            .field("exports", &state.exports.len())
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity.name {
            Some(name) => write!(f, "module {}", name),
            None => write!(f, "unnamed module @{}", self.identity.loader),
        }
    }
}
