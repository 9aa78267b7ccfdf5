//! Requires graph of a configuration
//!
//! Records the `requires` edges among the modules resolved in one
//! configuration, rejects cycles and produces the dependencies-first order
//! in which layers materialize runtime modules.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// Errors that can occur during dependency graph operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The `requires` edges form a cycle; the path starts and ends at the same module
    #[error("Cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Directed graph `module -> required module`
///
/// Ordered maps keep every traversal deterministic regardless of the order
/// in which modules were added.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module with no edges yet
    pub fn add_module(&mut self, module: &str) {
        self.edges.entry(module.to_string()).or_default();
    }

    /// Record that `module` requires `required`
    pub fn add_dependency(&mut self, module: &str, required: &str) {
        self.edges
            .entry(module.to_string())
            .or_default()
            .insert(required.to_string());
        self.edges.entry(required.to_string()).or_default();
    }

    /// Find a cycle, if any
    ///
    /// # Returns
    /// * `Some(path)` - `path[0] -> ... -> path[n]` with `path[0] == path[n]`
    /// * `None` - the graph is acyclic
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::new();
        let mut path = Vec::new();

        for module in self.edges.keys() {
            if !visited.contains(module.as_str()) {
                if let Some(cycle) = self.dfs_cycle(module, &mut visited, &mut on_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut BTreeSet<&'a str>,
        on_stack: &mut BTreeSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        for next in self.edges.get(node).into_iter().flatten() {
            let next = next.as_str();
            if on_stack.contains(next) {
                let start = path.iter().position(|m| *m == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|m| m.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            if !visited.contains(next) {
                if let Some(cycle) = self.dfs_cycle(next, visited, on_stack, path) {
                    return Some(cycle);
                }
            }
        }

        on_stack.remove(node);
        path.pop();
        None
    }

    /// Order modules so that every module comes after the modules it requires
    ///
    /// Kahn's algorithm over the reversed edges; ties are broken by name.
    pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
        if let Some(cycle) = self.detect_cycle() {
            return Err(GraphError::Cycle(cycle));
        }

        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (module, required) in &self.edges {
            pending.insert(module.as_str(), required.len());
            for dep in required {
                dependents.entry(dep.as_str()).or_default().push(module.as_str());
            }
        }

        let mut queue: VecDeque<&str> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(module, _)| *module)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(module) = queue.pop_front() {
            order.push(module.to_string());
            for dependent in dependents.get(module).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        Ok(order)
    }

    /// Modules required by `module`
    pub fn dependencies(&self, module: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(module)
    }

    /// Number of modules in the graph
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no modules
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
