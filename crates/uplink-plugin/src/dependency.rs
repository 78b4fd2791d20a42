//! Plugin dependency graph with cycle validation.
//!
//! The graph maps each plugin to the set of plugins it requires. Every
//! insertion is validated before it is committed; the graph is acyclic at
//! all times.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::debug;

use uplink_core::{AppError, AppResult};

/// Directed graph of plugin-name → required-plugin-names.
#[derive(Debug, Default)]
pub struct DependencyManager {
    graph: RwLock<HashMap<String, HashSet<String>>>,
}

impl DependencyManager {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(HashMap::new()),
        }
    }

    /// Records a plugin's declared dependencies.
    ///
    /// Fails if a dependency is not in `installed`, or if the insertion
    /// would introduce a cycle; in both cases the graph is left unchanged.
    pub fn register(
        &self,
        plugin: &str,
        dependencies: &[String],
        installed: &HashSet<String>,
    ) -> AppResult<()> {
        for dep in dependencies {
            if !installed.contains(dep) {
                return Err(AppError::dependency(format!(
                    "plugin '{plugin}' requires '{dep}' which is not registered"
                )));
            }
            if dep == plugin {
                return Err(AppError::dependency(format!(
                    "plugin '{plugin}' cannot depend on itself"
                )));
            }
        }

        let mut graph = self.graph.write().expect("dependency graph lock poisoned");
        let previous = graph.insert(plugin.to_string(), dependencies.iter().cloned().collect());

        if let Some(path) = find_cycle(&graph) {
            // Roll the insertion back so the graph stays acyclic.
            match previous {
                Some(old) => {
                    graph.insert(plugin.to_string(), old);
                }
                None => {
                    graph.remove(plugin);
                }
            }
            return Err(AppError::dependency(format!(
                "registering '{plugin}' would create a dependency cycle: {}",
                path.join(" -> ")
            )));
        }

        debug!(plugin = %plugin, dependencies = dependencies.len(), "Dependencies recorded");
        Ok(())
    }

    /// Returns the plugins that require `plugin`.
    pub fn dependents(&self, plugin: &str) -> Vec<String> {
        let graph = self.graph.read().expect("dependency graph lock poisoned");
        let mut out: Vec<String> = graph
            .iter()
            .filter(|(_, deps)| deps.contains(plugin))
            .map(|(name, _)| name.clone())
            .collect();
        out.sort();
        out
    }

    /// Returns the plugins that `plugin` requires.
    pub fn dependencies_of(&self, plugin: &str) -> Vec<String> {
        let graph = self.graph.read().expect("dependency graph lock poisoned");
        let mut out: Vec<String> = graph
            .get(plugin)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Deletes a plugin's node and scrubs it from every other node's set.
    pub fn remove(&self, plugin: &str) {
        let mut graph = self.graph.write().expect("dependency graph lock poisoned");
        graph.remove(plugin);
        for deps in graph.values_mut() {
            deps.remove(plugin);
        }
    }

    /// Returns the number of tracked plugins.
    pub fn len(&self) -> usize {
        self.graph.read().expect("dependency graph lock poisoned").len()
    }

    /// Returns whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Depth-first search over the whole graph with an explicit recursion stack.
///
/// Returns the offending path (ending on the node that closes the loop)
/// when any node is reachable from itself.
fn find_cycle(graph: &HashMap<String, HashSet<String>>) -> Option<Vec<String>> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut on_stack: HashSet<&str> = HashSet::new();

    // Deterministic start order so reported paths are stable.
    let mut roots: Vec<&String> = graph.keys().collect();
    roots.sort();

    for root in roots {
        if visited.contains(root.as_str()) {
            continue;
        }
        if let Some(path) = visit(root, graph, &mut visited, &mut stack, &mut on_stack) {
            return Some(path);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    graph: &'a HashMap<String, HashSet<String>>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
    on_stack: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    stack.push(node);
    on_stack.insert(node);

    if let Some(deps) = graph.get(node) {
        let mut ordered: Vec<&String> = deps.iter().collect();
        ordered.sort();
        for dep in ordered {
            if on_stack.contains(dep.as_str()) {
                // Report the loop starting from its first occurrence.
                let start = stack.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                path.push(dep.clone());
                return Some(path);
            }
            if !visited.contains(dep.as_str()) {
                if let Some(path) = visit(dep, graph, visited, stack, on_stack) {
                    return Some(path);
                }
            }
        }
    }

    stack.pop();
    on_stack.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_register_without_dependencies() {
        let manager = DependencyManager::new();
        manager
            .register("a", &[], &installed(&["a"]))
            .expect("register");
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let manager = DependencyManager::new();
        let err = manager
            .register("a", &["ghost".to_string()], &installed(&["a"]))
            .expect_err("should fail");
        assert!(err.message.contains("ghost"));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_dependents_and_dependencies() {
        let manager = DependencyManager::new();
        let set = installed(&["a", "b", "c"]);
        manager.register("a", &[], &set).expect("a");
        manager.register("b", &["a".to_string()], &set).expect("b");
        manager.register("c", &["a".to_string()], &set).expect("c");

        assert_eq!(manager.dependents("a"), vec!["b", "c"]);
        assert_eq!(manager.dependencies_of("b"), vec!["a"]);
        assert!(manager.dependents("b").is_empty());
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let manager = DependencyManager::new();
        let set = installed(&["a", "b", "c"]);
        manager.register("a", &[], &set).expect("a");
        manager.register("b", &["a".to_string()], &set).expect("b");

        // a -> b would close the loop a -> b -> a.
        let err = manager
            .register("a", &["b".to_string()], &set)
            .expect_err("cycle");
        assert!(err.message.contains("cycle"));

        // The previous (empty) dependency set for "a" must be restored.
        assert!(manager.dependencies_of("a").is_empty());
        assert_eq!(manager.dependents("a"), vec!["b"]);
    }

    #[test]
    fn test_long_cycle_reports_path() {
        let manager = DependencyManager::new();
        let set = installed(&["a", "b", "c"]);
        manager.register("a", &[], &set).expect("a");
        manager.register("b", &["a".to_string()], &set).expect("b");
        manager.register("c", &["b".to_string()], &set).expect("c");

        let err = manager
            .register("a", &["c".to_string()], &set)
            .expect_err("cycle");
        assert!(err.message.contains(" -> "));
        assert!(manager.dependencies_of("a").is_empty());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let manager = DependencyManager::new();
        let err = manager
            .register("a", &["a".to_string()], &installed(&["a"]))
            .expect_err("self dep");
        assert!(err.message.contains("itself"));
    }

    #[test]
    fn test_remove_scrubs_other_nodes() {
        let manager = DependencyManager::new();
        let set = installed(&["a", "b"]);
        manager.register("a", &[], &set).expect("a");
        manager.register("b", &["a".to_string()], &set).expect("b");

        manager.remove("a");
        assert!(manager.dependencies_of("b").is_empty());
        assert!(manager.dependents("a").is_empty());
    }
}
