use std::collections::BTreeSet;

use terrace_domain::{
    AbsProviderConfig, Config, Diagnostic, Diagnostics, LocalProviderConfig, ModuleInstance,
    ProviderType, Schemas,
};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::node::{NodeKey, ProviderNode, ResourceNode, Vertex};

/// Find the provider configuration a resource in `module` gets for `local`.
///
/// The search starts in the resource's own module, follows explicit
/// `providers` passing on module calls, and lets unaliased configurations
/// inherit from the caller. When nothing is declared up to the root, an
/// unaliased requirement resolves to an implied empty root configuration.
/// Aliased configurations are never implied.
#[must_use]
pub fn resolve_provider(
    config: &Config,
    module: &ModuleInstance,
    local: &LocalProviderConfig,
    provider_type: ProviderType,
) -> Option<AbsProviderConfig> {
    let mut module = module.clone();
    let mut local = local.clone();
    let mut provider_type = provider_type;

    loop {
        if let Some(module_config) = super::module_instance_config(config, &module) {
            if module_config.provider_block(&local).is_some() {
                let provider = module_config.provider_type(&local.local_name);
                return Some(AbsProviderConfig::new(module, provider, local.alias));
            }
        }

        let Some(parent) = module.parent() else {
            return match local.alias {
                None => Some(AbsProviderConfig::new(module, provider_type, None)),
                Some(_) => None,
            };
        };

        let passed = config.call_for(&module.module()).and_then(|(caller, call)| {
            call.providers
                .iter()
                .find(|passed| passed.in_child == local)
                .map(|passed| (caller.provider_type(&passed.in_parent.local_name), passed))
        });
        match passed {
            Some((caller_type, passed)) => {
                provider_type = caller_type;
                local = passed.in_parent.clone();
            }
            None if local.alias.is_none() => {}
            None => return None,
        }
        module = parent;
    }
}

/// Resolves each resource's provider configuration, creates implied provider
/// vertices on demand and connects resources to their provider.
pub struct ProviderTransformer<'a> {
    pub config: &'a Config,
    /// When set, every resolved provider type must have a schema.
    pub schemas: Option<&'a Schemas>,
    /// Drop provider vertices no resource ended up using.
    pub prune_unused: bool,
}

impl ProviderTransformer<'_> {
    fn resolve(&self, graph: &Graph, node: &ResourceNode) -> Option<AbsProviderConfig> {
        if node.is_orphan() {
            if let Some(stored) = &node.stored_provider {
                let declared = super::module_instance_config(self.config, &stored.module)
                    .is_some_and(|module| {
                        module.providers.iter().any(|block| {
                            block.alias == stored.alias
                                && module.provider_type(&block.local_name) == stored.provider
                        })
                    });
                if declared || graph.contains(&NodeKey::provider(stored)) {
                    return Some(stored.clone());
                }
            }
        }
        resolve_provider(
            self.config,
            node.module(),
            &node.requirement,
            node.provider_type.clone(),
        )
    }

    fn provider_vertex(&self, addr: &AbsProviderConfig) -> Vertex {
        let block = super::module_instance_config(self.config, &addr.module).and_then(|module| {
            module
                .providers
                .iter()
                .find(|block| {
                    block.alias == addr.alias
                        && module.provider_type(&block.local_name) == addr.provider
                })
                .cloned()
        });
        Vertex::Provider(ProviderNode {
            addr: addr.clone(),
            config: block,
            consumers: BTreeSet::new(),
        })
    }
}

impl GraphTransformer for ProviderTransformer<'_> {
    fn name(&self) -> &'static str {
        "providers"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();

        for key in graph.keys() {
            let Some(Vertex::Resource(node)) = graph.vertex(&key) else {
                continue;
            };

            let Some(addr) = self.resolve(graph, node) else {
                let detail = match &node.stored_provider {
                    Some(stored) if node.is_orphan() => format!(
                        "To work with {key} its original provider configuration at {stored} is \
                         required, but it has been removed."
                    ),
                    _ => format!(
                        "To work with {key} its provider configuration {} is required, but it \
                         has not been declared.",
                        node.requirement
                    ),
                };
                diagnostics.push(
                    Diagnostic::error("Provider configuration not present", detail).at(&key),
                );
                continue;
            };

            if let Some(schemas) = self.schemas {
                if !schemas.contains(&addr.provider) {
                    diagnostics.push(
                        Diagnostic::error(
                            "Missing provider schema",
                            format!("No schema is loaded for provider {}.", addr.provider),
                        )
                        .at(&key),
                    );
                    continue;
                }
            }

            let provider_key = NodeKey::provider(&addr);
            if !graph.contains(&provider_key) {
                tracing::debug!(provider = %addr, "adding implied provider");
                if let Err(error) = graph.add(self.provider_vertex(&addr)) {
                    diagnostics.push(Diagnostic::error("Duplicate declaration", error.to_string()));
                    continue;
                }
            }

            graph.connect(&key, &provider_key);
            if let Some(Vertex::Resource(node)) = graph.vertex_mut(&key) {
                node.resolved_provider = Some(addr);
            }
            if let Some(Vertex::Provider(provider)) = graph.vertex_mut(&provider_key) {
                provider.consumers.insert(key);
            }
        }

        if self.prune_unused && !diagnostics.has_errors() {
            let unused: Vec<NodeKey> = graph
                .vertices()
                .filter_map(|(key, vertex)| match vertex {
                    Vertex::Provider(node) if node.consumers.is_empty() => Some(key.clone()),
                    _ => None,
                })
                .collect();
            for key in unused {
                tracing::debug!(provider = %key, "removing unused provider");
                graph.remove(&key);
            }
        }
        diagnostics
    }
}
