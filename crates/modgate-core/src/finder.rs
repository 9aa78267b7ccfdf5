//! Module finders
//!
//! A finder is the source of descriptors the resolver draws from when it
//! closes over `requires` edges.

use crate::descriptor::ModuleDescriptor;
use crate::resolver::ResolutionError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Source of module descriptors, looked up by module name
pub trait ModuleFinder: Send + Sync {
    /// Find the descriptor of module `name`
    fn find(&self, name: &str) -> Option<Arc<ModuleDescriptor>>;

    /// Every descriptor this finder can locate
    fn find_all(&self) -> Vec<Arc<ModuleDescriptor>>;
}

/// In-memory finder over a fixed set of descriptors
#[derive(Debug, Clone, Default)]
pub struct ModuleLibrary {
    modules: BTreeMap<String, Arc<ModuleDescriptor>>,
}

impl ModuleLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a library from a set of descriptors
    ///
    /// # Returns
    /// * `Ok(ModuleLibrary)` - All names were distinct
    /// * `Err(ResolutionError::DuplicateInFinder)` - Two descriptors share a name
    pub fn of<I>(descriptors: I) -> Result<Self, ResolutionError>
    where
        I: IntoIterator<Item = ModuleDescriptor>,
    {
        let mut library = Self::new();
        for descriptor in descriptors {
            library.add(descriptor)?;
        }
        Ok(library)
    }

    /// Add a descriptor to the library
    pub fn add(&mut self, descriptor: ModuleDescriptor) -> Result<(), ResolutionError> {
        let name = descriptor.name().to_string();
        if self.modules.contains_key(&name) {
            return Err(ResolutionError::DuplicateInFinder(name));
        }
        self.modules.insert(name, Arc::new(descriptor));
        Ok(())
    }

    /// Number of descriptors in the library
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the library holds no descriptors
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleFinder for ModuleLibrary {
    fn find(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.modules.get(name).cloned()
    }

    fn find_all(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.modules.values().cloned().collect()
    }
}

/// Finder that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyFinder;

impl ModuleFinder for EmptyFinder {
    fn find(&self, _name: &str) -> Option<Arc<ModuleDescriptor>> {
        None
    }

    fn find_all(&self) -> Vec<Arc<ModuleDescriptor>> {
        Vec::new()
    }
}

/// Composition of finders; the first finder that knows a name wins
#[derive(Default)]
pub struct ChainedFinder {
    finders: Vec<Arc<dyn ModuleFinder>>,
}

impl ChainedFinder {
    /// Chain `finders` in lookup order
    pub fn new(finders: Vec<Arc<dyn ModuleFinder>>) -> Self {
        Self { finders }
    }
}

impl ModuleFinder for ChainedFinder {
    fn find(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.finders.iter().find_map(|finder| finder.find(name))
    }

    fn find_all(&self) -> Vec<Arc<ModuleDescriptor>> {
        let mut seen = BTreeMap::new();
        for finder in &self.finders {
            for descriptor in finder.find_all() {
                seen.entry(descriptor.name().to_string())
                    .or_insert(descriptor);
            }
        }
        seen.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ModuleDescriptor {
        ModuleDescriptor::builder(name).build().unwrap()
    }

    #[test]
    fn test_library_lookup() {
        let library = ModuleLibrary::of([descriptor("m1"), descriptor("m2")]).unwrap();
        assert_eq!(library.len(), 2);
        assert!(library.find("m1").is_some());
        assert!(library.find("m3").is_none());
    }

    #[test]
    fn test_library_rejects_duplicate_names() {
        let result = ModuleLibrary::of([descriptor("m1"), descriptor("m1")]);
        assert!(matches!(result, Err(ResolutionError::DuplicateInFinder(name)) if name == "m1"));
    }

    #[test]
    fn test_empty_finder() {
        assert!(EmptyFinder.find("m1").is_none());
        assert!(EmptyFinder.find_all().is_empty());
    }

    #[test]
    fn test_chained_finder_first_hit_wins() {
        let first = ModuleLibrary::of([ModuleDescriptor::builder("m1")
            .exports("p1")
            .build()
            .unwrap()])
        .unwrap();
        let second = ModuleLibrary::of([descriptor("m1"), descriptor("m2")]).unwrap();
        let chained = ChainedFinder::new(vec![Arc::new(first), Arc::new(second)]);

        assert!(chained.find("m1").unwrap().is_exported("p1"));
        assert!(chained.find("m2").is_some());
        assert_eq!(chained.find_all().len(), 2);
    }
}
