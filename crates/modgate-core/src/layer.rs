//! Layers
//!
//! A layer binds every module of a configuration to a defining loader and
//! holds the runtime [`Module`]s created for them. Layers form a parent
//! chain ending at the empty layer; the boot layer sits right above it.
//!
//! Definition is all-or-nothing: every check runs against local maps before
//! anything becomes visible to the module system.

use crate::configuration::{Configuration, ConfigurationId};
use crate::descriptor::ExportSpec;
use crate::loader::Loader;
use crate::module::{Module, ModuleIdentity, ModuleRef, RuntimeExport};
use dashmap::DashMap;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Unique identifier of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(u64);

impl LayerId {
    /// Allocate a fresh id
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        LayerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Errors that abort layer creation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    /// The configuration was not resolved against the parent layer's configuration
    #[error("Parent of configuration {configuration} is not the configuration of the parent layer")]
    ConfigurationMismatch {
        /// Configuration passed to layer creation
        configuration: ConfigurationId,
        /// Configuration of the parent layer
        expected: Option<ConfigurationId>,
    },

    /// A module with this `(name, loader)` identity already exists
    #[error("Module {name} already defined to {loader}")]
    DuplicateModule {
        /// Module name
        name: String,
        /// Loader it is already defined to
        loader: Loader,
    },

    /// One loader would define the same package in two modules
    #[error("Package {package} in both module {first} and module {second} for {loader}")]
    SplitPackage {
        /// Package defined twice
        package: String,
        /// Loader defining both modules
        loader: Loader,
        /// Module already holding the package
        first: String,
        /// Module that would define it again
        second: String,
    },

    /// A `requires` edge cannot be bound to any module of this layer or its ancestors
    #[error("Module {module} requires {target}, which is not defined in any layer")]
    MissingReadTarget {
        /// Reading module
        module: String,
        /// Required module that has no binding
        target: String,
    },

    /// The parent layer is not registered
    #[error("Unknown layer: {0}")]
    UnknownLayer(LayerId),

    /// The configuration is not registered
    #[error("Unknown configuration: {0}")]
    UnknownConfiguration(ConfigurationId),
}

/// A configuration bound to loaders
#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    configuration: Arc<Configuration>,
    parent: Option<LayerId>,
    loaders: BTreeMap<String, Loader>,
    modules: BTreeMap<String, ModuleRef>,
}

impl Layer {
    /// The empty layer: no modules, no parent
    pub(crate) fn empty(configuration: Arc<Configuration>) -> Self {
        Self {
            id: LayerId::next(),
            configuration,
            parent: None,
            loaders: BTreeMap::new(),
            modules: BTreeMap::new(),
        }
    }

    /// Layer id
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Configuration this layer instantiates
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Parent layer, `None` for the empty layer
    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    /// Loader bound to a module of this layer (ancestors are not searched)
    pub fn loader_of(&self, name: &str) -> Option<Loader> {
        self.loaders.get(name).copied()
    }

    /// Runtime module of this layer (ancestors are not searched)
    pub fn module(&self, name: &str) -> Option<&ModuleRef> {
        self.modules.get(name)
    }

    /// Runtime modules of this layer, by name
    pub fn modules(&self) -> impl Iterator<Item = &ModuleRef> {
        self.modules.values()
    }

    /// Number of modules defined in this layer
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the layer defines no modules
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Registry state a new layer is checked against
pub(crate) struct DefinedModules<'a> {
    /// Every runtime module defined so far, by identity
    pub modules: &'a DashMap<ModuleIdentity, ModuleRef>,
    /// `(loader, package)` -> name of the module defining it
    pub packages: &'a DashMap<(Loader, String), String>,
    /// Name of the always-readable base module
    pub base_module: &'a str,
}

/// Define the modules of `configuration` on top of `parents`
///
/// `parents` is the parent layer followed by its ancestors, nearest first.
/// Nothing is registered here; the caller publishes the returned layer.
pub(crate) fn define_layer<F>(
    configuration: Arc<Configuration>,
    parents: &[Arc<Layer>],
    assign: F,
    defined: &DefinedModules<'_>,
) -> Result<Layer, LayerError>
where
    F: Fn(&str) -> Loader,
{
    let expected = parents.first().map(|layer| layer.configuration.id());
    if configuration.parent() != expected {
        return Err(LayerError::ConfigurationMismatch {
            configuration: configuration.id(),
            expected,
        });
    }

    let id = LayerId::next();
    let mut loaders = BTreeMap::new();
    let mut packages: BTreeMap<(Loader, &str), &str> = BTreeMap::new();

    for descriptor in configuration.modules() {
        let name = descriptor.name();
        let loader = assign(name);
        if defined
            .modules
            .contains_key(&ModuleIdentity::named(name, loader))
        {
            return Err(LayerError::DuplicateModule {
                name: name.to_string(),
                loader,
            });
        }

        for package in descriptor.packages() {
            let owner = packages
                .get(&(loader, package.as_str()))
                .map(|owner| owner.to_string())
                .or_else(|| {
                    defined
                        .packages
                        .get(&(loader, package.clone()))
                        .map(|owner| owner.value().clone())
                });
            if let Some(first) = owner {
                return Err(LayerError::SplitPackage {
                    package: package.clone(),
                    loader,
                    first,
                    second: name.to_string(),
                });
            }
            packages.insert((loader, package.as_str()), name);
        }
        loaders.insert(name.to_string(), loader);
    }

    let resolve = |target: &str| -> Option<ModuleIdentity> {
        if let Some(loader) = loaders.get(target) {
            return Some(ModuleIdentity::named(target, *loader));
        }
        parents
            .iter()
            .find_map(|layer| layer.module(target))
            .map(|module| module.identity().clone())
    };

    let mut modules = BTreeMap::new();
    for name in configuration.order() {
        let Some(descriptor) = configuration.find_module(name) else {
            continue;
        };

        let mut reads = FxHashSet::default();
        for edge in configuration.reads(name) {
            let identity = resolve(&edge.name).ok_or_else(|| LayerError::MissingReadTarget {
                module: name.clone(),
                target: edge.name.clone(),
            })?;
            reads.insert(identity);
        }

        let mut exports = BTreeMap::new();
        for (package, spec) in descriptor.exports() {
            let export = match spec {
                ExportSpec::Unqualified => RuntimeExport::Unqualified,
                ExportSpec::Qualified(targets) => {
                    let mut bound = FxHashSet::default();
                    for target in targets {
                        match resolve(target) {
                            Some(identity) => {
                                bound.insert(identity);
                            }
                            None => {
                                debug!(module = %name, package = %package, target = %target, "qualified export target not in any layer, skipped");
                            }
                        }
                    }
                    RuntimeExport::Qualified(bound)
                }
            };
            exports.insert(package.clone(), export);
        }

        let loader = loaders[name.as_str()];
        let is_base = name == defined.base_module && loader.is_platform();
        let module = Module::named(descriptor.clone(), loader, id, is_base, reads, exports);
        debug!(module = %module.identity(), layer = %id, "module defined");
        modules.insert(name.clone(), Arc::new(module));
    }

    Ok(Layer {
        id,
        configuration,
        parent: parents.first().map(|layer| layer.id),
        loaders,
        modules,
    })
}
