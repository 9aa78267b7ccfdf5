//! Resolved configurations
//!
//! A configuration is the closed `requires` graph produced by the resolver.
//! It only stores the modules resolved into it; modules found in an ancestor
//! configuration are referenced by the ancestor's id, never copied.

use crate::descriptor::ModuleDescriptor;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier of a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigurationId(u64);

impl ConfigurationId {
    /// Allocate a fresh id
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ConfigurationId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConfigurationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cf#{}", self.0)
    }
}

/// A `requires` edge bound to the configuration that resolved its target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedModule {
    /// Name of the required module
    pub name: String,
    /// Configuration the module was resolved in (this one or an ancestor)
    pub configuration: ConfigurationId,
}

/// Immutable result of resolution
#[derive(Debug)]
pub struct Configuration {
    id: ConfigurationId,
    parent: Option<ConfigurationId>,
    modules: BTreeMap<String, Arc<ModuleDescriptor>>,
    roots: Vec<String>,
    reads: BTreeMap<String, Vec<ResolvedModule>>,
    order: Vec<String>,
}

impl Configuration {
    pub(crate) fn new(
        id: ConfigurationId,
        parent: Option<ConfigurationId>,
        modules: BTreeMap<String, Arc<ModuleDescriptor>>,
        roots: Vec<String>,
        reads: BTreeMap<String, Vec<ResolvedModule>>,
        order: Vec<String>,
    ) -> Self {
        Self {
            id,
            parent,
            modules,
            roots,
            reads,
            order,
        }
    }

    /// A configuration with no modules and no parent
    pub(crate) fn empty() -> Self {
        Self::new(
            ConfigurationId::next(),
            None,
            BTreeMap::new(),
            Vec::new(),
            BTreeMap::new(),
            Vec::new(),
        )
    }

    /// Configuration id
    pub fn id(&self) -> ConfigurationId {
        self.id
    }

    /// Parent configuration, `None` for a root configuration
    pub fn parent(&self) -> Option<ConfigurationId> {
        self.parent
    }

    /// Root module names the configuration was resolved from
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Descriptor of a module resolved in this configuration (ancestors are not searched)
    pub fn find_module(&self, name: &str) -> Option<&Arc<ModuleDescriptor>> {
        self.modules.get(name)
    }

    /// Whether `name` was resolved in this configuration
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Names of the modules resolved in this configuration, sorted
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Descriptors resolved in this configuration
    pub fn modules(&self) -> impl Iterator<Item = &Arc<ModuleDescriptor>> {
        self.modules.values()
    }

    /// Number of modules resolved in this configuration
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the configuration resolved no modules
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolved `requires` edges of module `name`
    pub fn reads(&self, name: &str) -> &[ResolvedModule] {
        self.reads.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modules of this configuration, every module after the ones it requires
    pub fn order(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_ids_are_unique() {
        let a = Configuration::empty();
        let b = Configuration::empty();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_empty_configuration() {
        let cf = Configuration::empty();
        assert!(cf.is_empty());
        assert!(cf.parent().is_none());
        assert!(cf.reads("m1").is_empty());
        assert!(cf.find_module("m1").is_none());
    }
}
