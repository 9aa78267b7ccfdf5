//! The module system registry
//!
//! [`ModuleSystem`] owns every configuration, layer and runtime module. Parent
//! links are plain ids; ancestors are reached by walking those ids through
//! the registry (`configuration_chain`, `layer_chain`).
//!
//! The registry is built mostly at startup and then read by many threads
//! performing access checks. Layer creation is serialized on the layer table
//! lock; access checks only touch the modules involved.

use crate::access::{check_access, AccessDecision};
use crate::config::SystemConfig;
use crate::configuration::{Configuration, ConfigurationId};
use crate::finder::{ModuleFinder, ModuleLibrary};
use crate::layer::{define_layer, DefinedModules, Layer, LayerError, LayerId};
use crate::loader::Loader;
use crate::module::{Module, ModuleIdentity, ModuleRef};
use crate::resolver::{ResolutionError, Resolver};
use crate::{ModuleSystemError, ModuleSystemResult};
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of configurations, layers and runtime modules
pub struct ModuleSystem {
    config: SystemConfig,
    configurations: RwLock<FxHashMap<ConfigurationId, Arc<Configuration>>>,
    layers: RwLock<FxHashMap<LayerId, Arc<Layer>>>,
    modules: DashMap<ModuleIdentity, ModuleRef>,
    packages: DashMap<(Loader, String), String>,
    empty_configuration: ConfigurationId,
    empty_layer: LayerId,
    boot_configuration: ConfigurationId,
    boot_layer: LayerId,
    base_module: ModuleRef,
}

impl ModuleSystem {
    /// Create a module system with the default boot layer
    pub fn new() -> ModuleSystemResult<Self> {
        Self::with_config(SystemConfig::default())
    }

    /// Create a module system whose boot layer is described by `config`
    pub fn with_config(config: SystemConfig) -> ModuleSystemResult<Self> {
        config.validate()?;

        let empty_cf = Arc::new(Configuration::empty());
        let empty_layer = Arc::new(Layer::empty(empty_cf.clone()));

        let mut library = ModuleLibrary::new();
        library.add(config.base_descriptor()?)?;
        for module in &config.boot.modules {
            library.add(module.to_descriptor()?)?;
        }
        let roots: Vec<String> = std::iter::once(config.boot.base_module.clone())
            .chain(config.boot.modules.iter().map(|m| m.name.clone()))
            .collect();
        let roots: Vec<&str> = roots.iter().map(String::as_str).collect();

        let parents = [empty_cf.clone()];
        let boot_cf = Arc::new(Resolver::new(&parents, &library, &[]).resolve(&roots)?);

        let modules = DashMap::new();
        let packages = DashMap::new();
        let boot_layer = define_layer(
            boot_cf.clone(),
            &[empty_layer.clone()],
            |_| Loader::Platform,
            &DefinedModules {
                modules: &modules,
                packages: &packages,
                base_module: &config.boot.base_module,
            },
        )?;
        let base_module = boot_layer
            .module(&config.boot.base_module)
            .cloned()
            .ok_or_else(|| {
                ModuleSystemError::Config(crate::config::ConfigError::Invalid(format!(
                    "base module {} missing from boot layer",
                    config.boot.base_module
                )))
            })?;
        publish_modules(&boot_layer, &modules, &packages);

        let boot_layer = Arc::new(boot_layer);
        let mut configurations = FxHashMap::default();
        configurations.insert(empty_cf.id(), empty_cf.clone());
        configurations.insert(boot_cf.id(), boot_cf.clone());
        let mut layers = FxHashMap::default();
        layers.insert(empty_layer.id(), empty_layer.clone());
        layers.insert(boot_layer.id(), boot_layer.clone());

        info!(
            base = %config.boot.base_module,
            modules = boot_layer.len(),
            "boot layer created"
        );

        Ok(Self {
            configurations: RwLock::new(configurations),
            layers: RwLock::new(layers),
            modules,
            packages,
            empty_configuration: empty_cf.id(),
            empty_layer: empty_layer.id(),
            boot_configuration: boot_cf.id(),
            boot_layer: boot_layer.id(),
            base_module,
            config,
        })
    }

    /// Configuration the module system was created with
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// The empty configuration (no modules, no parent)
    pub fn empty_configuration(&self) -> ConfigurationId {
        self.empty_configuration
    }

    /// The empty layer (no modules, no parent)
    pub fn empty_layer(&self) -> LayerId {
        self.empty_layer
    }

    /// Configuration of the boot layer
    pub fn boot_configuration(&self) -> ConfigurationId {
        self.boot_configuration
    }

    /// The boot layer
    pub fn boot_layer(&self) -> LayerId {
        self.boot_layer
    }

    /// The always-readable base module
    pub fn base_module(&self) -> &ModuleRef {
        &self.base_module
    }

    /// Look up a configuration
    pub fn configuration(&self, id: ConfigurationId) -> Option<Arc<Configuration>> {
        self.configurations.read().get(&id).cloned()
    }

    /// Look up a layer
    pub fn layer(&self, id: LayerId) -> Option<Arc<Layer>> {
        self.layers.read().get(&id).cloned()
    }

    /// Look up a runtime module by identity
    pub fn module(&self, identity: &ModuleIdentity) -> Option<ModuleRef> {
        self.modules.get(identity).map(|entry| entry.value().clone())
    }

    /// The configuration `id` followed by its ancestors
    pub fn configuration_chain(&self, id: ConfigurationId) -> Option<Vec<Arc<Configuration>>> {
        let configurations = self.configurations.read();
        let mut chain = Vec::new();
        let mut next = Some(id);
        while let Some(id) = next {
            let cf = configurations.get(&id)?;
            next = cf.parent();
            chain.push(cf.clone());
        }
        Some(chain)
    }

    /// The layer `id` followed by its ancestors
    pub fn layer_chain(&self, id: LayerId) -> Option<Vec<Arc<Layer>>> {
        chain_of(&self.layers.read(), id)
    }

    /// Resolve `roots` into a new configuration on top of `parent`
    ///
    /// Names are looked up in the parent chain first, then in `library`,
    /// then in `extra_finders` in order.
    pub fn resolve(
        &self,
        library: &dyn ModuleFinder,
        parent: ConfigurationId,
        extra_finders: &[Arc<dyn ModuleFinder>],
        roots: &[&str],
    ) -> Result<Arc<Configuration>, ResolutionError> {
        let parents = self
            .configuration_chain(parent)
            .ok_or(ResolutionError::UnknownConfiguration(parent))?;
        let cf = Arc::new(Resolver::new(&parents, library, extra_finders).resolve(roots)?);

        debug!(configuration = %cf.id(), parent = %parent, modules = cf.len(), "configuration resolved");
        self.configurations.write().insert(cf.id(), cf.clone());
        Ok(cf)
    }

    /// Create a layer binding each module of `configuration` to `assign(name)`
    ///
    /// The configuration must have been resolved against the configuration
    /// of `parent`. Either every module is defined or none is.
    pub fn create_layer<F>(
        &self,
        configuration: &Arc<Configuration>,
        parent: LayerId,
        assign: F,
    ) -> Result<Arc<Layer>, LayerError>
    where
        F: Fn(&str) -> Loader,
    {
        if self.configuration(configuration.id()).is_none() {
            return Err(LayerError::UnknownConfiguration(configuration.id()));
        }

        let mut layers = self.layers.write();
        let parents = chain_of(&layers, parent).ok_or(LayerError::UnknownLayer(parent))?;
        let layer = define_layer(
            configuration.clone(),
            &parents,
            assign,
            &DefinedModules {
                modules: &self.modules,
                packages: &self.packages,
                base_module: &self.config.boot.base_module,
            },
        )?;

        publish_modules(&layer, &self.modules, &self.packages);
        let layer = Arc::new(layer);
        layers.insert(layer.id(), layer.clone());
        info!(layer = %layer.id(), parent = %parent, modules = layer.len(), "layer created");
        Ok(layer)
    }

    /// Create a layer from a name -> loader map; unmapped modules use the platform loader
    pub fn create_layer_with_map(
        &self,
        configuration: &Arc<Configuration>,
        parent: LayerId,
        loaders: &HashMap<String, Loader>,
    ) -> Result<Arc<Layer>, LayerError> {
        self.create_layer(configuration, parent, |name| {
            loaders.get(name).copied().unwrap_or(Loader::Platform)
        })
    }

    /// Create a layer whose modules are all defined by one loader
    pub fn create_layer_with_one_loader(
        &self,
        configuration: &Arc<Configuration>,
        parent: LayerId,
        loader: Loader,
    ) -> Result<Arc<Layer>, LayerError> {
        self.create_layer(configuration, parent, |_| loader)
    }

    /// Loader bound to module `name`, searching `layer` then its ancestors
    pub fn find_loader(&self, layer: LayerId, name: &str) -> Option<Loader> {
        self.layer_chain(layer)?
            .iter()
            .find_map(|layer| layer.loader_of(name))
    }

    /// Runtime module `name`, searching `layer` then its ancestors
    pub fn find_module(&self, layer: LayerId, name: &str) -> Option<ModuleRef> {
        self.layer_chain(layer)?
            .iter()
            .find_map(|layer| layer.module(name).cloned())
    }

    /// The unnamed module of `loader`, created on first use
    pub fn unnamed_module(&self, loader: Loader) -> ModuleRef {
        self.modules
            .entry(ModuleIdentity::unnamed(loader))
            .or_insert_with(|| {
                debug!(%loader, "unnamed module created");
                Arc::new(Module::unnamed(loader))
            })
            .value()
            .clone()
    }

    /// Check access between two registered modules
    pub fn check_access(
        &self,
        accessor: &ModuleIdentity,
        target: &ModuleIdentity,
        package: &str,
    ) -> ModuleSystemResult<AccessDecision> {
        let from = self
            .module(accessor)
            .ok_or_else(|| ModuleSystemError::UnknownModule(accessor.clone()))?;
        let to = self
            .module(target)
            .ok_or_else(|| ModuleSystemError::UnknownModule(target.clone()))?;
        Ok(check_access(&from, &to, package))
    }
}

fn chain_of(layers: &FxHashMap<LayerId, Arc<Layer>>, id: LayerId) -> Option<Vec<Arc<Layer>>> {
    let mut chain = Vec::new();
    let mut next = Some(id);
    while let Some(id) = next {
        let layer = layers.get(&id)?;
        next = layer.parent();
        chain.push(layer.clone());
    }
    Some(chain)
}

fn publish_modules(
    layer: &Layer,
    modules: &DashMap<ModuleIdentity, ModuleRef>,
    packages: &DashMap<(Loader, String), String>,
) {
    for module in layer.modules() {
        if let Some(descriptor) = module.descriptor() {
            for package in descriptor.packages() {
                packages.insert((module.loader(), package.clone()), descriptor.name().to_string());
            }
        }
        modules.insert(module.identity().clone(), module.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleSpec;
    use crate::descriptor::ModuleDescriptor;
    use crate::finder::EmptyFinder;

    #[test]
    fn test_boot_layer() {
        let system = ModuleSystem::new().unwrap();
        let base = system.base_module();
        assert_eq!(base.name(), Some("java.base"));
        assert!(base.is_base());
        assert_eq!(base.loader(), Loader::Platform);
        assert_eq!(
            system.find_loader(system.boot_layer(), "java.base"),
            Some(Loader::Platform)
        );
        assert!(system.find_loader(system.boot_layer(), "m1").is_none());
    }

    #[test]
    fn test_boot_modules_from_config() {
        let mut config = SystemConfig::default();
        config.boot.modules.push(ModuleSpec {
            name: "java.logging".to_string(),
            requires: vec!["java.base".to_string()],
            exports: vec!["java.util.logging".to_string()],
            ..ModuleSpec::default()
        });
        let system = ModuleSystem::with_config(config).unwrap();

        let logging = system
            .find_module(system.boot_layer(), "java.logging")
            .unwrap();
        assert!(logging.is_exported("java.util.logging"));
        assert!(logging.can_read(system.base_module()));
    }

    #[test]
    fn test_chains() {
        let system = ModuleSystem::new().unwrap();
        let configurations = system.configuration_chain(system.boot_configuration()).unwrap();
        assert_eq!(configurations.len(), 2);
        assert_eq!(configurations[1].id(), system.empty_configuration());

        let layers = system.layer_chain(system.boot_layer()).unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].id(), system.empty_layer());
    }

    #[test]
    fn test_resolve_unknown_parent() {
        let system = ModuleSystem::new().unwrap();
        let other = ModuleSystem::new().unwrap();
        let result = system.resolve(&EmptyFinder, other.boot_configuration(), &[], &["m1"]);
        assert!(matches!(result, Err(ResolutionError::UnknownConfiguration(_))));
    }

    #[test]
    fn test_create_layer_with_unregistered_configuration() {
        let system = ModuleSystem::new().unwrap();
        let other = ModuleSystem::new().unwrap();
        let library = ModuleLibrary::of([ModuleDescriptor::builder("m1").build().unwrap()]).unwrap();
        let cf = other
            .resolve(&library, other.boot_configuration(), &[], &["m1"])
            .unwrap();

        let result = system.create_layer_with_one_loader(&cf, system.boot_layer(), Loader::custom());
        assert!(matches!(result, Err(LayerError::UnknownConfiguration(_))));
    }

    #[test]
    fn test_unnamed_module_is_cached() {
        let system = ModuleSystem::new().unwrap();
        let loader = Loader::custom();
        let first = system.unnamed_module(loader);
        let second = system.unnamed_module(loader);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(system.module(&ModuleIdentity::unnamed(loader)).is_some());
    }

    #[test]
    fn test_check_access_unknown_module() {
        let system = ModuleSystem::new().unwrap();
        let missing = ModuleIdentity::named("m1", Loader::custom());
        let result = system.check_access(&missing, system.base_module().identity(), "java.lang");
        assert!(matches!(result, Err(ModuleSystemError::UnknownModule(_))));
    }
}
