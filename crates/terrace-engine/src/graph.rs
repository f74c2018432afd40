use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use terrace_domain::{Diagnostics, GraphListing, ListedVertex, ModuleInstance};

use crate::error::GraphError;
use crate::node::{NodeKey, Vertex};

/// Vertex arena with adjacency in both directions.
///
/// An edge `from -> to` means `from` depends on `to`: `to` is visited first.
/// Everything is kept in ordered maps so listings and walks are deterministic.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    path: ModuleInstance,
    vertices: BTreeMap<NodeKey, Vertex>,
    dependencies: BTreeMap<NodeKey, BTreeSet<NodeKey>>,
    dependents: BTreeMap<NodeKey, BTreeSet<NodeKey>>,
    warnings: Diagnostics,
}

impl Graph {
    #[must_use]
    pub fn new(path: ModuleInstance) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    /// The module instance this graph was built for.
    #[must_use]
    pub const fn path(&self) -> &ModuleInstance {
        &self.path
    }

    /// Non-fatal diagnostics reported while the graph was built.
    #[must_use]
    pub const fn warnings(&self) -> &Diagnostics {
        &self.warnings
    }

    pub(crate) fn add_warnings(&mut self, warnings: Diagnostics) {
        self.warnings.extend(warnings);
    }

    /// # Errors
    ///
    /// Returns an error when a vertex with the same address already exists.
    pub fn add(&mut self, vertex: Vertex) -> Result<NodeKey, GraphError> {
        let key = vertex.key();
        if self.vertices.contains_key(&key) {
            return Err(GraphError::DuplicateVertex {
                name: key.to_string(),
            });
        }
        self.vertices.insert(key.clone(), vertex);
        self.dependencies.insert(key.clone(), BTreeSet::new());
        self.dependents.insert(key.clone(), BTreeSet::new());
        Ok(key)
    }

    /// Remove a vertex and every edge touching it.
    pub fn remove(&mut self, key: &NodeKey) -> Option<Vertex> {
        let vertex = self.vertices.remove(key)?;
        for dependency in self.dependencies.remove(key).unwrap_or_default() {
            if let Some(set) = self.dependents.get_mut(&dependency) {
                set.remove(key);
            }
        }
        for dependent in self.dependents.remove(key).unwrap_or_default() {
            if let Some(set) = self.dependencies.get_mut(&dependent) {
                set.remove(key);
            }
        }
        Some(vertex)
    }

    /// Add `from -> to`. Idempotent; returns whether the edge is new.
    /// Edges touching unknown vertices are ignored.
    pub fn connect(&mut self, from: &NodeKey, to: &NodeKey) -> bool {
        if !self.vertices.contains_key(from) || !self.vertices.contains_key(to) {
            return false;
        }
        let added = self
            .dependencies
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        self.dependents
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
        added
    }

    pub fn disconnect(&mut self, from: &NodeKey, to: &NodeKey) -> bool {
        if let Some(set) = self.dependents.get_mut(to) {
            set.remove(from);
        }
        self.dependencies
            .get_mut(from)
            .is_some_and(|set| set.remove(to))
    }

    #[must_use]
    pub fn has_edge(&self, from: &NodeKey, to: &NodeKey) -> bool {
        self.dependencies
            .get(from)
            .is_some_and(|set| set.contains(to))
    }

    #[must_use]
    pub fn contains(&self, key: &NodeKey) -> bool {
        self.vertices.contains_key(key)
    }

    #[must_use]
    pub fn vertex(&self, key: &NodeKey) -> Option<&Vertex> {
        self.vertices.get(key)
    }

    pub fn vertex_mut(&mut self, key: &NodeKey) -> Option<&mut Vertex> {
        self.vertices.get_mut(key)
    }

    pub fn vertices(&self) -> impl Iterator<Item = (&NodeKey, &Vertex)> {
        self.vertices.iter()
    }

    /// Snapshot of all keys, for passes that mutate while iterating.
    #[must_use]
    pub fn keys(&self) -> Vec<NodeKey> {
        self.vertices.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(BTreeSet::len).sum()
    }

    /// Every edge as `(from, to)`, in order.
    #[must_use]
    pub fn edges(&self) -> Vec<(NodeKey, NodeKey)> {
        self.dependencies
            .iter()
            .flat_map(|(from, set)| set.iter().map(move |to| (from.clone(), to.clone())))
            .collect()
    }

    pub fn dependencies(&self, key: &NodeKey) -> impl Iterator<Item = &NodeKey> {
        self.dependencies.get(key).into_iter().flatten()
    }

    pub fn dependents(&self, key: &NodeKey) -> impl Iterator<Item = &NodeKey> {
        self.dependents.get(key).into_iter().flatten()
    }

    /// Everything `key` depends on, directly or not.
    #[must_use]
    pub fn transitive_dependencies(&self, key: &NodeKey) -> BTreeSet<NodeKey> {
        Self::reach(&self.dependencies, key)
    }

    /// Everything that depends on `key`, directly or not.
    #[must_use]
    pub fn transitive_dependents(&self, key: &NodeKey) -> BTreeSet<NodeKey> {
        Self::reach(&self.dependents, key)
    }

    fn reach(
        adjacency: &BTreeMap<NodeKey, BTreeSet<NodeKey>>,
        start: &NodeKey,
    ) -> BTreeSet<NodeKey> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&NodeKey> = adjacency.get(start).into_iter().flatten().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(adjacency.get(next).into_iter().flatten());
            }
        }
        seen
    }

    /// Vertices nothing depends on.
    #[must_use]
    pub fn sinks(&self) -> Vec<NodeKey> {
        self.dependents
            .iter()
            .filter(|(_, set)| set.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Strongly connected components with more than one vertex, plus
    /// self-loops, each sorted by address.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<NodeKey>> {
        let mut tarjan = Tarjan::new(self);
        for key in self.vertices.keys() {
            if !tarjan.index.contains_key(key) {
                tarjan.connect(key);
            }
        }
        let mut cycles: Vec<Vec<NodeKey>> = tarjan
            .components
            .into_iter()
            .filter(|component| match component.as_slice() {
                [single] => self.has_edge(single, single),
                _ => true,
            })
            .map(|mut component| {
                component.sort();
                component
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Drop every edge implied by a longer path. Cyclic graphs are left
    /// alone; the cycle check reports them.
    pub fn reduce_transitively(&mut self) {
        if !self.cycles().is_empty() {
            return;
        }
        let mut redundant = Vec::new();
        for (from, direct) in &self.dependencies {
            for via in direct {
                let implied = self.transitive_dependencies(via);
                redundant.extend(
                    direct
                        .iter()
                        .filter(|to| implied.contains(*to))
                        .map(|to| (from.clone(), to.clone())),
                );
            }
        }
        for (from, to) in redundant {
            self.disconnect(&from, &to);
        }
    }

    /// Dependencies-first ordering; ties broken by address.
    ///
    /// # Errors
    ///
    /// Returns an error naming the vertices left over when the graph has a
    /// cycle.
    pub fn topological_order(&self) -> Result<Vec<NodeKey>, GraphError> {
        let mut indegree: BTreeMap<&NodeKey, usize> = self
            .dependencies
            .iter()
            .map(|(key, set)| (key, set.len()))
            .collect();

        let mut ready: BTreeSet<&NodeKey> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(key, _)| *key)
            .collect();

        let mut order = Vec::with_capacity(self.vertices.len());
        while let Some(next) = ready.pop_first() {
            order.push(next.clone());
            for dependent in self.dependents(next) {
                let Some(entry) = indegree.get_mut(dependent) else {
                    return Err(GraphError::Invariant {
                        message: format!("internal graph error: missing indegree for {dependent}"),
                    });
                };
                if *entry == 0 {
                    continue;
                }
                *entry -= 1;
                if *entry == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.vertices.len() {
            let cycle = indegree
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(key, _)| key.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(GraphError::CycleDetected { cycle });
        }
        Ok(order)
    }

    #[must_use]
    pub fn listing(&self) -> GraphListing {
        GraphListing {
            path: self.path.to_string(),
            vertices: self
                .vertices
                .iter()
                .map(|(key, vertex)| ListedVertex {
                    name: key.to_string(),
                    kind: vertex.kind(),
                    dependencies: self.dependencies(key).map(ToString::to_string).collect(),
                })
                .collect(),
        }
    }
}

/// Each vertex on its own line, followed by its dependencies indented two
/// spaces.
impl fmt::Display for Graph {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in self.vertices.keys() {
            writeln!(formatter, "{key}")?;
            for dependency in self.dependencies(key) {
                writeln!(formatter, "  {dependency}")?;
            }
        }
        Ok(())
    }
}

struct Tarjan<'g> {
    graph: &'g Graph,
    next_index: usize,
    index: BTreeMap<&'g NodeKey, usize>,
    lowlink: BTreeMap<&'g NodeKey, usize>,
    stack: Vec<&'g NodeKey>,
    on_stack: BTreeSet<&'g NodeKey>,
    components: Vec<Vec<NodeKey>>,
}

impl<'g> Tarjan<'g> {
    fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            next_index: 0,
            index: BTreeMap::new(),
            lowlink: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        }
    }

    fn connect(&mut self, key: &'g NodeKey) {
        self.index.insert(key, self.next_index);
        self.lowlink.insert(key, self.next_index);
        self.next_index += 1;
        self.stack.push(key);
        self.on_stack.insert(key);

        let graph = self.graph;
        for dependency in graph.dependencies(key) {
            if !self.index.contains_key(dependency) {
                self.connect(dependency);
                let low = self.lowlink[dependency].min(self.lowlink[key]);
                self.lowlink.insert(key, low);
            } else if self.on_stack.contains(dependency) {
                let low = self.index[dependency].min(self.lowlink[key]);
                self.lowlink.insert(key, low);
            }
        }

        if self.lowlink[key] == self.index[key] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(member);
                component.push(member.clone());
                if member == key {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
