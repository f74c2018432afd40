use terrace_domain::{Config, Diagnostic, Diagnostics};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::node::Vertex;

/// Gives state-only instances their configuration back when the resource is
/// still declared in a live module instance. Such instances are kept, not
/// destroyed; they only changed expansion shape.
pub struct AttachConfigTransformer<'a> {
    pub config: &'a Config,
}

impl GraphTransformer for AttachConfigTransformer<'_> {
    fn name(&self) -> &'static str {
        "attach-config"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();

        for key in graph.keys() {
            let Some(Vertex::Resource(node)) = graph.vertex(&key) else {
                continue;
            };
            if !node.is_orphan() {
                continue;
            }
            let Some(module) = super::module_instance_config(self.config, node.module()) else {
                continue;
            };
            let Some(config) = module.resource(&node.addr.resource) else {
                continue;
            };

            let provider_type = module.provider_type(&config.provider_config().local_name);
            let config = config.clone();
            let Some(Vertex::Resource(mut node)) = graph.remove(&key) else {
                continue;
            };
            node.requirement = config.provider_config();
            node.provider_type = provider_type;
            node.config = Some(config);
            node.destroy = false;
            tracing::debug!(
                address = %node.addr,
                key = ?node.key,
                "attached configuration to prior instance"
            );

            if let Err(error) = graph.add(Vertex::Resource(node)) {
                diagnostics.push(Diagnostic::error("Duplicate declaration", error.to_string()));
            }
        }
        diagnostics
    }
}
