use std::collections::BTreeSet;

use terrace_domain::{Config, Diagnostic, Diagnostics, Target};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::node::{NodeKey, Vertex};

/// Restricts the graph to targeted vertices and what they depend on, then
/// removes excluded vertices and everything depending on them.
///
/// Structural vertices follow what they serve: a provider stays while one of
/// its consumers stays, a close vertex stays with its provider, and a count
/// boundary stays while its module keeps a member.
pub struct TargetsTransformer<'a> {
    pub config: &'a Config,
    pub targets: &'a [Target],
    pub excludes: &'a [Target],
}

fn matches(target: &Target, vertex: &Vertex) -> bool {
    match vertex {
        Vertex::Resource(node) => target.matches(
            node.module(),
            Some(&node.addr.resource),
            node.key.as_ref(),
        ),
        Vertex::Variable(_) | Vertex::Local(_) | Vertex::Output(_) => {
            target.resource.is_none()
                && vertex
                    .module()
                    .is_some_and(|module| target.matches(module, None, None))
        }
        _ => false,
    }
}

impl TargetsTransformer<'_> {
    fn validate(&self, diagnostics: &mut Diagnostics) {
        for target in self.targets.iter().chain(self.excludes) {
            let module = target.module_path();
            if self.config.descendant(&module).is_none() {
                diagnostics.push(Diagnostic::error(
                    format!("Invalid target \"{target}\""),
                    format!("{module} is not defined in the configuration"),
                ));
            }
        }
    }

    fn matched(&self, graph: &Graph, target: &Target) -> BTreeSet<NodeKey> {
        graph
            .vertices()
            .filter(|(_, vertex)| matches(target, vertex))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl GraphTransformer for TargetsTransformer<'_> {
    fn name(&self) -> &'static str {
        "targets"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        if self.targets.is_empty() && self.excludes.is_empty() {
            return diagnostics;
        }
        self.validate(&mut diagnostics);
        if diagnostics.has_errors() {
            return diagnostics;
        }

        let mut keep: BTreeSet<NodeKey> = if self.targets.is_empty() {
            graph.vertices().map(|(key, _)| key.clone()).collect()
        } else {
            let mut keep = BTreeSet::new();
            for target in self.targets {
                let matched = self.matched(graph, target);
                if matched.is_empty() {
                    diagnostics.push(Diagnostic::warning(
                        "Target matched nothing",
                        format!("No configuration or state object matches target \"{target}\"."),
                    ));
                }
                for key in matched {
                    keep.extend(graph.transitive_dependencies(&key));
                    keep.insert(key);
                }
            }
            keep
        };

        for exclude in self.excludes {
            for key in self.matched(graph, exclude) {
                for dependent in graph.transitive_dependents(&key) {
                    keep.remove(&dependent);
                }
                keep.remove(&key);
            }
        }

        keep.retain(|key| {
            graph.vertex(key).is_some_and(|vertex| {
                !vertex.is_structural() && !matches!(vertex, Vertex::Provider(_))
            })
        });

        let mut providers = Vec::new();
        let mut boundaries = Vec::new();
        let mut closes = Vec::new();
        for (key, vertex) in graph.vertices() {
            match vertex {
                Vertex::Provider(node) => {
                    if node.consumers.iter().any(|consumer| keep.contains(consumer)) {
                        providers.push((key.clone(), node.addr.clone()));
                    }
                }
                Vertex::CountBoundary(module) => boundaries.push((key.clone(), module.clone())),
                Vertex::ProviderClose(addr) => closes.push((key.clone(), addr.clone())),
                _ => {}
            }
        }

        let kept_modules: BTreeSet<_> = keep
            .iter()
            .filter_map(|key| graph.vertex(key).and_then(Vertex::module).cloned())
            .collect();
        let kept_providers: BTreeSet<_> = providers.iter().map(|(_, addr)| addr.clone()).collect();
        keep.extend(providers.into_iter().map(|(key, _)| key));
        keep.extend(
            boundaries
                .into_iter()
                .filter(|(_, module)| kept_modules.contains(module))
                .map(|(key, _)| key),
        );
        keep.extend(
            closes
                .into_iter()
                .filter(|(_, addr)| kept_providers.contains(addr))
                .map(|(key, _)| key),
        );

        for key in graph.keys() {
            if !keep.contains(&key) {
                tracing::debug!(vertex = %key, "pruned by targeting");
                graph.remove(&key);
            }
        }
        for key in graph.keys() {
            if let Some(Vertex::Provider(node)) = graph.vertex_mut(&key) {
                node.consumers.retain(|consumer| keep.contains(consumer));
            }
        }
        diagnostics
    }
}
