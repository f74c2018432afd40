use std::collections::BTreeMap;

use terrace_domain::{Diagnostic, Diagnostics, ModuleInstance};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::node::{NodeKey, Vertex};

/// Adds a count boundary per module instance. The boundary runs once every
/// vertex of its module is done and is where expansion-mode changes are
/// fixed up in state.
///
/// Vertices outside the module that depend on one of its `count` or
/// `for_each` resources wait for the boundary instead, unless that would
/// close a cycle.
pub struct CountBoundaryTransformer;

impl GraphTransformer for CountBoundaryTransformer {
    fn name(&self) -> &'static str {
        "count-boundary"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();

        let mut members: BTreeMap<ModuleInstance, Vec<NodeKey>> = BTreeMap::new();
        for (key, vertex) in graph.vertices() {
            if vertex.is_structural() {
                continue;
            }
            if let Some(module) = vertex.module() {
                members.entry(module.clone()).or_default().push(key.clone());
            }
        }

        for (module, keys) in members {
            let boundary = match graph.add(Vertex::CountBoundary(module.clone())) {
                Ok(boundary) => boundary,
                Err(error) => {
                    diagnostics.push(Diagnostic::error(
                        "Count boundary inserted twice",
                        error.to_string(),
                    ));
                    continue;
                }
            };
            for key in &keys {
                graph.connect(&boundary, key);
            }

            for key in &keys {
                let dynamic = graph
                    .vertex(key)
                    .and_then(Vertex::as_resource)
                    .is_some_and(|node| !node.is_orphan() && node.each_mode().is_dynamic());
                if !dynamic {
                    continue;
                }
                let outside: Vec<NodeKey> = graph
                    .dependents(key)
                    .filter(|dependent| {
                        graph.vertex(dependent).is_some_and(|vertex| {
                            !vertex.is_structural() && vertex.module() != Some(&module)
                        })
                    })
                    .cloned()
                    .collect();
                for dependent in outside {
                    if graph.transitive_dependencies(&boundary).contains(&dependent) {
                        tracing::debug!(
                            from = %dependent,
                            to = %key,
                            "keeping direct edge; redirecting through the boundary would cycle"
                        );
                        continue;
                    }
                    graph.disconnect(&dependent, key);
                    graph.connect(&dependent, &boundary);
                }
            }
        }
        diagnostics
    }
}
