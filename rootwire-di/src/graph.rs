//! Static view of the registered bindings as a dependency graph.
//!
//! Unlike the [Resolver](crate::resolver), which discovers the graph lazily while creating
//! instances, [DependencyGraph] is built from a snapshot of all bindings and never instantiates
//! anything. Nodes live in an arena and refer to each other by [NodeId], and all traversals are
//! iterative, so arbitrarily long dependency chains don't exhaust the native stack.

use crate::component_key::ComponentKey;
use crate::component_registry::BindingPtr;
use crate::error::{ResolutionError, ValidationError};
use fxhash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Handle of a node in a [DependencyGraph].
pub type NodeId = usize;

#[derive(Clone, Debug)]
struct Node {
    key: ComponentKey,
    // false for keys which are only referenced as dependencies
    registered: bool,
    dependencies: Vec<NodeId>,
    dependents: Vec<NodeId>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Dependency graph of registered bindings.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: FxHashMap<ComponentKey, NodeId>,
}

impl DependencyGraph {
    /// Builds the graph from given bindings. Bindings are sorted by registration revision first,
    /// so the graph doesn't depend on the iteration order of the source.
    pub fn from_bindings(bindings: impl IntoIterator<Item = (ComponentKey, BindingPtr)>) -> Self {
        let mut bindings: Vec<_> = bindings.into_iter().collect();
        bindings.sort_by_key(|(_, binding)| binding.revision());

        let mut graph = Self::default();
        for (key, _) in &bindings {
            let id = graph.node(key);
            graph.nodes[id].registered = true;
        }

        for (key, binding) in &bindings {
            let id = graph.node(key);
            for dependency in binding.dependencies() {
                let dependency = graph.node(dependency);
                graph.nodes[id].dependencies.push(dependency);
                graph.nodes[dependency].dependents.push(id);
            }
        }

        graph
    }

    fn node(&mut self, key: &ComponentKey) -> NodeId {
        if let Some(id) = self.index.get(key) {
            return *id;
        }

        let id = self.nodes.len();
        self.nodes.push(Node {
            key: key.clone(),
            registered: false,
            dependencies: vec![],
            dependents: vec![],
        });
        self.index.insert(key.clone(), id);
        id
    }

    #[inline]
    pub fn node_id(&self, key: &ComponentKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    #[inline]
    pub fn key(&self, id: NodeId) -> Option<&ComponentKey> {
        self.nodes.get(id).map(|node| &node.key)
    }

    /// Checks if given key has a binding.
    pub fn is_registered(&self, key: &ComponentKey) -> bool {
        self.node_id(key)
            .map(|id| self.nodes[id].registered)
            .unwrap_or(false)
    }

    /// Number of nodes, including keys referenced as dependencies but not registered.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the order in which instances would be created when resolving given key: every key
    /// appears after all of its dependencies and the requested key is last.
    pub fn resolution_order(
        &self,
        key: &ComponentKey,
    ) -> Result<Vec<ComponentKey>, ResolutionError> {
        let start = self
            .node_id(key)
            .filter(|id| self.nodes[*id].registered)
            .ok_or_else(|| ResolutionError::NotRegistered {
                key: key.clone(),
                required_by: vec![],
            })?;

        let mut colors = vec![Color::White; self.nodes.len()];
        let mut order = vec![];
        let mut errors = vec![];

        self.visit(start, &mut colors, &mut order, &mut errors, true);

        match errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(order.into_iter().map(|id| self.nodes[id].key.clone()).collect()),
        }
    }

    /// Checks all registered bindings for missing dependencies and cycles, collecting every
    /// problem found instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut colors = vec![Color::White; self.nodes.len()];
        let mut order = vec![];
        let mut errors = vec![];

        for id in 0..self.nodes.len() {
            if self.nodes[id].registered && colors[id] == Color::White {
                self.visit(id, &mut colors, &mut order, &mut errors, false);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }

    /// Returns all keys which transitively depend on given key, nearest first.
    pub fn dependents_of(&self, key: &ComponentKey) -> Vec<ComponentKey> {
        let Some(start) = self.node_id(key) else {
            return vec![];
        };

        let mut visited = FxHashSet::default();
        visited.insert(start);

        let mut queue = VecDeque::from([start]);
        let mut result = vec![];

        while let Some(id) = queue.pop_front() {
            for dependent in &self.nodes[id].dependents {
                if visited.insert(*dependent) {
                    result.push(self.nodes[*dependent].key.clone());
                    queue.push_back(*dependent);
                }
            }
        }

        result
    }

    // iterative DFS emitting nodes in post-order; the explicit stack holds the node and the index
    // of its next dependency to visit
    fn visit(
        &self,
        start: NodeId,
        colors: &mut [Color],
        order: &mut Vec<NodeId>,
        errors: &mut Vec<ResolutionError>,
        fail_fast: bool,
    ) {
        let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
        colors[start] = Color::Gray;

        while let Some((id, next)) = stack.last_mut() {
            let id = *id;
            let Some(dependency) = self.nodes[id].dependencies.get(*next).copied() else {
                colors[id] = Color::Black;
                order.push(id);
                stack.pop();
                continue;
            };

            *next += 1;

            if !self.nodes[dependency].registered {
                errors.push(ResolutionError::NotRegistered {
                    key: self.nodes[dependency].key.clone(),
                    required_by: stack.iter().map(|(id, _)| self.nodes[*id].key.clone()).collect(),
                });
            } else {
                match colors[dependency] {
                    Color::White => {
                        colors[dependency] = Color::Gray;
                        stack.push((dependency, 0));
                        continue;
                    }
                    Color::Gray => errors.push(self.cycle_error(&stack, dependency)),
                    Color::Black => continue,
                }
            }

            if fail_fast {
                return;
            }
        }
    }

    fn cycle_error(&self, stack: &[(NodeId, usize)], repeated: NodeId) -> ResolutionError {
        let start = stack
            .iter()
            .position(|(id, _)| *id == repeated)
            .unwrap_or_default();

        let mut path: Vec<_> = stack[start..]
            .iter()
            .map(|(id, _)| self.nodes[*id].key.clone())
            .collect();
        path.push(self.nodes[repeated].key.clone());

        ResolutionError::CircularDependency {
            key: self.nodes[stack[0].0].key.clone(),
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::component_key::ComponentKey;
    use crate::component_registry::{Binding, BindingPtr};
    use crate::error::ResolutionError;
    use crate::graph::DependencyGraph;
    use std::sync::Arc;

    fn key(name: &str) -> ComponentKey {
        ComponentKey::named::<u8>(name.to_string())
    }

    fn binding(revision: u64, dependencies: &[&str]) -> BindingPtr {
        let mut binding = dependencies
            .iter()
            .fold(Binding::singleton(|_| Ok(0u8)), |binding, dependency| {
                binding.depends_on(key(dependency))
            });
        binding.revision = revision;
        Arc::new(binding)
    }

    fn graph(bindings: &[(&str, &[&str])]) -> DependencyGraph {
        DependencyGraph::from_bindings(bindings.iter().enumerate().map(
            |(index, (name, dependencies))| (key(name), binding(index as u64 + 1, dependencies)),
        ))
    }

    #[test]
    fn should_order_dependencies_first() {
        let graph = graph(&[
            ("service", &["logger", "repository"]),
            ("repository", &["pool"]),
            ("logger", &[]),
            ("pool", &["logger"]),
        ]);

        assert_eq!(
            graph.resolution_order(&key("service")).unwrap(),
            vec![key("logger"), key("pool"), key("repository"), key("service")]
        );
    }

    #[test]
    fn should_report_cycle_path() {
        let graph = graph(&[("a", &["b"]), ("b", &["a"])]);

        let ResolutionError::CircularDependency { key: root, path } =
            graph.resolution_order(&key("a")).unwrap_err()
        else {
            panic!("expected a cycle");
        };

        assert_eq!(root, key("a"));
        assert_eq!(path, vec![key("a"), key("b"), key("a")]);
    }

    #[test]
    fn should_report_missing_dependency() {
        let graph = graph(&[("a", &["b"]), ("b", &["c"])]);

        let ResolutionError::NotRegistered {
            key: missing,
            required_by,
        } = graph.resolution_order(&key("a")).unwrap_err()
        else {
            panic!("expected a missing binding");
        };

        assert_eq!(missing, key("c"));
        assert_eq!(required_by, vec![key("a"), key("b")]);
        assert!(matches!(
            graph.resolution_order(&key("c")).unwrap_err(),
            ResolutionError::NotRegistered { required_by, .. } if required_by.is_empty()
        ));
    }

    #[test]
    fn should_collect_all_validation_errors() {
        let graph = graph(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("c", &["missing"]),
            ("d", &[]),
        ]);

        let errors = graph.validate().unwrap_err().errors;
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|error| matches!(error, ResolutionError::CircularDependency { .. })));
        assert!(errors
            .iter()
            .any(|error| matches!(
                error,
                ResolutionError::NotRegistered { key: missing, .. } if *missing == key("missing")
            )));
    }

    #[test]
    fn should_validate_correct_graph() {
        let graph = graph(&[("a", &["b", "c"]), ("b", &["c"]), ("c", &[])]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn should_find_transitive_dependents() {
        let graph = graph(&[
            ("config", &[]),
            ("pool", &["config"]),
            ("repository", &["pool"]),
            ("logger", &[]),
        ]);

        assert_eq!(
            graph.dependents_of(&key("config")),
            vec![key("pool"), key("repository")]
        );
        assert!(graph.dependents_of(&key("logger")).is_empty());
        assert!(graph.dependents_of(&key("unknown")).is_empty());
    }

    #[test]
    fn should_handle_long_chains() {
        const LENGTH: usize = 10_000;

        let names: Vec<_> = (0..LENGTH).map(|index| index.to_string()).collect();
        let graph = DependencyGraph::from_bindings((0..LENGTH).map(|index| {
            let dependencies: Vec<&str> = if index + 1 < LENGTH {
                vec![names[index + 1].as_str()]
            } else {
                vec![]
            };
            (key(&names[index]), binding(index as u64 + 1, &dependencies))
        }));

        let order = graph.resolution_order(&key("0")).unwrap();
        assert_eq!(order.len(), LENGTH);
        assert_eq!(order.first(), Some(&key(&names[LENGTH - 1])));
        assert_eq!(order.last(), Some(&key("0")));
        assert!(graph.validate().is_ok());
    }
}
