use terrace_domain::Diagnostics;

use super::GraphTransformer;
use crate::graph::Graph;

pub struct TransitiveReductionTransformer;

impl GraphTransformer for TransitiveReductionTransformer {
    fn name(&self) -> &'static str {
        "transitive-reduction"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let before = graph.edge_count();
        graph.reduce_transitively();
        tracing::debug!(before, after = graph.edge_count(), "reduced edges");
        Diagnostics::new()
    }
}
