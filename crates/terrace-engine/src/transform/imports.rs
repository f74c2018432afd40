use terrace_domain::{Diagnostic, Diagnostics};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::import::ImportTarget;
use crate::node::{NodeKey, Vertex};

/// Hands each import id to the configured resource it is imported into.
pub struct ImportTransformer<'a> {
    pub imports: &'a [ImportTarget],
}

impl GraphTransformer for ImportTransformer<'_> {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        for import in self.imports {
            let key = NodeKey::resource(&import.addr.containing_resource());
            match graph.vertex_mut(&key) {
                Some(Vertex::Resource(node)) => {
                    node.import_ids
                        .insert(import.addr.key.clone(), import.id.clone());
                }
                _ => diagnostics.push(Diagnostic::error(
                    "Import to non-existent resource address",
                    format!(
                        "resource address \"{}\" does not exist in the configuration",
                        import.addr
                    ),
                )),
            }
        }
        diagnostics
    }
}
