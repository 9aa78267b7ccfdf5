//! Resolution of root modules into a configuration
//!
//! Resolution is a breadth-first closure over `requires` edges. Each name is
//! looked up in the parent configuration chain first (those modules are
//! already resolved and are only referenced), then in the library, then in
//! the extra finders in order.

use crate::configuration::{Configuration, ConfigurationId, ResolvedModule};
use crate::deps::{DependencyGraph, GraphError};
use crate::descriptor::ModuleDescriptor;
use crate::finder::ModuleFinder;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors that make a module graph unresolvable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// A root or required module is in neither the parent chain nor any finder
    #[error("Module {name} not found{}", required_suffix(.required_by))]
    ModuleNotFound {
        /// Missing module
        name: String,
        /// Module whose `requires` named it; `None` for a root
        required_by: Option<String>,
    },

    /// Two modules of the graph export the same package
    #[error("Modules {first} and {second} export package {package}")]
    DuplicatePackage {
        /// Package exported twice
        package: String,
        /// Module that claimed the package first
        first: String,
        /// Module that exports it again
        second: String,
    },

    /// `requires` edges among the newly resolved modules form a cycle
    #[error("Cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// A finder was given two descriptors with the same name
    #[error("Module {0} defined more than once in the same finder")]
    DuplicateInFinder(String),

    /// The parent configuration is not registered
    #[error("Unknown configuration: {0}")]
    UnknownConfiguration(ConfigurationId),
}

impl From<GraphError> for ResolutionError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Cycle(path) => ResolutionError::Cycle(path),
        }
    }
}

/// Resolves root names against a parent chain and a set of finders
pub struct Resolver<'a> {
    /// Parent configuration first, then its ancestors
    parents: &'a [Arc<Configuration>],
    library: &'a dyn ModuleFinder,
    extra_finders: &'a [Arc<dyn ModuleFinder>],
}

impl<'a> Resolver<'a> {
    /// Create a resolver
    ///
    /// # Arguments
    /// * `parents` - Parent configuration followed by its ancestors, nearest first
    /// * `library` - Primary source of descriptors
    /// * `extra_finders` - Consulted in order when the library has no match
    pub fn new(
        parents: &'a [Arc<Configuration>],
        library: &'a dyn ModuleFinder,
        extra_finders: &'a [Arc<dyn ModuleFinder>],
    ) -> Self {
        Self {
            parents,
            library,
            extra_finders,
        }
    }

    /// Resolve `roots` into a new configuration whose parent is `parents[0]`
    pub fn resolve(&self, roots: &[&str]) -> Result<Configuration, ResolutionError> {
        let roots: BTreeSet<&str> = roots.iter().copied().collect();
        debug!(roots = ?roots, "resolving configuration");

        let mut queue: VecDeque<(String, Option<String>)> = roots
            .iter()
            .map(|name| (name.to_string(), None))
            .collect();
        let mut selected: BTreeMap<String, Arc<ModuleDescriptor>> = BTreeMap::new();
        let mut inherited: BTreeMap<String, ConfigurationId> = BTreeMap::new();

        while let Some((name, required_by)) = queue.pop_front() {
            if selected.contains_key(&name) || inherited.contains_key(&name) {
                continue;
            }

            if let Some(cf) = self.find_in_parents(&name) {
                debug!(module = %name, configuration = %cf, "module found in parent configuration");
                inherited.insert(name, cf);
                continue;
            }

            let descriptor = self
                .find_in_finders(&name)
                .ok_or_else(|| ResolutionError::ModuleNotFound {
                    name: name.clone(),
                    required_by: required_by.clone(),
                })?;

            for required in descriptor.requires() {
                queue.push_back((required.clone(), Some(name.clone())));
            }
            debug!(module = %name, "module selected");
            selected.insert(name, descriptor);
        }

        let ancestors = self.required_ancestors(&selected, &inherited);
        check_exported_packages(&ancestors, &selected)?;
        let order = resolution_order(&selected)?;

        let id = ConfigurationId::next();
        let reads = selected
            .iter()
            .map(|(name, descriptor)| {
                let edges = descriptor
                    .requires()
                    .iter()
                    .map(|required| ResolvedModule {
                        name: required.clone(),
                        configuration: inherited.get(required).copied().unwrap_or(id),
                    })
                    .collect();
                (name.clone(), edges)
            })
            .collect();

        Ok(Configuration::new(
            id,
            self.parents.first().map(|cf| cf.id()),
            selected,
            roots.into_iter().map(str::to_string).collect(),
            reads,
            order,
        ))
    }

    fn find_in_parents(&self, name: &str) -> Option<ConfigurationId> {
        self.parents
            .iter()
            .find(|cf| cf.contains(name))
            .map(|cf| cf.id())
    }

    /// Descriptors of the inherited modules that some selected module requires
    fn required_ancestors(
        &self,
        selected: &BTreeMap<String, Arc<ModuleDescriptor>>,
        inherited: &BTreeMap<String, ConfigurationId>,
    ) -> BTreeMap<String, Arc<ModuleDescriptor>> {
        selected
            .values()
            .flat_map(|descriptor| descriptor.requires())
            .filter(|name| inherited.contains_key(name.as_str()))
            .filter_map(|name| {
                self.parents
                    .iter()
                    .find_map(|cf| cf.find_module(name))
                    .map(|descriptor| (name.clone(), descriptor.clone()))
            })
            .collect()
    }

    fn find_in_finders(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.library.find(name).or_else(|| {
            self.extra_finders
                .iter()
                .find_map(|finder| finder.find(name))
        })
    }
}

fn required_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(by) => format!(", required by {}", by),
        None => String::new(),
    }
}

/// Each exported package must have exactly one owner in the graph
///
/// Required ancestor modules count as owners too; they are seeded first so a
/// clash names the ancestor before the new module.
fn check_exported_packages(
    ancestors: &BTreeMap<String, Arc<ModuleDescriptor>>,
    selected: &BTreeMap<String, Arc<ModuleDescriptor>>,
) -> Result<(), ResolutionError> {
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    for (name, descriptor) in ancestors {
        for package in descriptor.exports().keys() {
            owners.entry(package.as_str()).or_insert(name.as_str());
        }
    }
    for (name, descriptor) in selected {
        for package in descriptor.exports().keys() {
            if let Some(first) = owners.insert(package.as_str(), name.as_str()) {
                return Err(ResolutionError::DuplicatePackage {
                    package: package.clone(),
                    first: first.to_string(),
                    second: name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn resolution_order(
    selected: &BTreeMap<String, Arc<ModuleDescriptor>>,
) -> Result<Vec<String>, ResolutionError> {
    let mut graph = DependencyGraph::new();
    for (name, descriptor) in selected {
        graph.add_module(name);
        for required in descriptor.requires() {
            if selected.contains_key(required) {
                graph.add_dependency(name, required);
            }
        }
    }
    Ok(graph.topological_sort()?)
}
