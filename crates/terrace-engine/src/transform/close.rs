use terrace_domain::{Diagnostic, Diagnostics};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::node::{NodeKey, Vertex};

/// Adds one close vertex per provider. The close vertex runs after the
/// provider and all of its consumers; anything else that depended on the
/// provider now waits for the close instead.
pub struct ProviderCloseTransformer;

impl GraphTransformer for ProviderCloseTransformer {
    fn name(&self) -> &'static str {
        "provider-close"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let providers: Vec<_> = graph
            .vertices()
            .filter_map(|(key, vertex)| match vertex {
                Vertex::Provider(node) => Some((key.clone(), node.clone())),
                _ => None,
            })
            .collect();

        for (provider_key, provider) in providers {
            let close = match graph.add(Vertex::ProviderClose(provider.addr.clone())) {
                Ok(close) => close,
                Err(error) => {
                    diagnostics.push(Diagnostic::error(
                        "Provider close inserted twice",
                        error.to_string(),
                    ));
                    continue;
                }
            };

            graph.connect(&close, &provider_key);
            for consumer in &provider.consumers {
                graph.connect(&close, consumer);
            }

            let others: Vec<NodeKey> = graph
                .dependents(&provider_key)
                .filter(|dependent| {
                    **dependent != close && !provider.consumers.contains(*dependent)
                })
                .cloned()
                .collect();
            for dependent in others {
                graph.disconnect(&dependent, &provider_key);
                graph.connect(&dependent, &close);
            }
        }
        diagnostics
    }
}
