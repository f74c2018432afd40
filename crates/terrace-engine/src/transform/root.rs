use terrace_domain::{Diagnostic, Diagnostics};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::node::{NodeKey, Vertex};

/// Adds the single root vertex, depending on every vertex nothing else
/// depends on, so the whole graph hangs off one entry point.
pub struct RootTransformer;

impl GraphTransformer for RootTransformer {
    fn name(&self) -> &'static str {
        "root"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let sinks = graph.sinks();
        let root = match graph.add(Vertex::Root) {
            Ok(root) => root,
            Err(error) => {
                return Diagnostic::error("Root inserted twice", error.to_string()).into();
            }
        };
        for sink in sinks.iter().filter(|sink| **sink != NodeKey::root()) {
            graph.connect(&root, sink);
        }
        Diagnostics::new()
    }
}
