use std::collections::BTreeSet;

use terrace_domain::{
    AbsProviderConfig, Config, Diagnostic, Diagnostics, ModuleCallConfig, ModuleConfig,
    ModuleInstance, State,
};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::node::{
    LocalNode, NodeKey, OutputNode, ProviderNode, ResourceNode, VariableNode, Vertex,
};

/// Adds one vertex per declared resource, provider block, variable, local
/// and output, for every module instance at or below the graph's path.
pub struct ConfigTransformer<'a> {
    pub config: &'a Config,
}

impl GraphTransformer for ConfigTransformer<'_> {
    fn name(&self) -> &'static str {
        "config"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let path = graph.path().clone();
        let mut diagnostics = Diagnostics::new();
        let Some(module) = super::module_instance_config(self.config, &path) else {
            diagnostics.push(Diagnostic::error(
                "Module not declared",
                format!("{path} is not defined in the configuration"),
            ));
            return diagnostics;
        };
        let call = self.config.call_for(&path.module()).map(|(_, call)| call);
        add_module(graph, module, &path, call, &mut diagnostics);
        diagnostics
    }
}

fn add_module(
    graph: &mut Graph,
    module: &ModuleConfig,
    instance: &ModuleInstance,
    call: Option<&ModuleCallConfig>,
    diagnostics: &mut Diagnostics,
) {
    let mut vertices = Vec::new();

    for block in &module.providers {
        vertices.push(Vertex::Provider(ProviderNode {
            addr: AbsProviderConfig::new(
                instance.clone(),
                module.provider_type(&block.local_name),
                block.alias.clone(),
            ),
            config: Some(block.clone()),
            consumers: BTreeSet::new(),
        }));
    }
    for variable in &module.variables {
        vertices.push(Vertex::Variable(VariableNode {
            module: instance.clone(),
            config: variable.clone(),
            argument: call.and_then(|call| call.arguments.get(&variable.name).cloned()),
        }));
    }
    for local in &module.locals {
        vertices.push(Vertex::Local(LocalNode {
            module: instance.clone(),
            config: local.clone(),
        }));
    }
    for output in &module.outputs {
        vertices.push(Vertex::Output(OutputNode {
            module: instance.clone(),
            config: output.clone(),
        }));
    }
    for resource in &module.resources {
        let provider_type = module.provider_type(&resource.provider_config().local_name);
        vertices.push(Vertex::Resource(ResourceNode::configured(
            resource.resource.absolute(instance.clone()),
            resource.clone(),
            provider_type,
        )));
    }

    for vertex in vertices {
        if let Err(error) = graph.add(vertex) {
            diagnostics.push(Diagnostic::error("Duplicate declaration", error.to_string()));
        }
    }

    for child in &module.module_calls {
        for key in child.instances.keys() {
            let child_instance = instance.child(&child.name, key);
            add_module(graph, &child.module, &child_instance, Some(child), diagnostics);
        }
    }
}

/// Adds a vertex for every prior-state instance that no configured resource
/// covers: either the resource is gone, or its expansion shape changed.
pub struct OrphanTransformer<'a> {
    pub state: &'a State,
}

impl GraphTransformer for OrphanTransformer<'_> {
    fn name(&self) -> &'static str {
        "orphans"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let path = graph.path().clone();
        let mut diagnostics = Diagnostics::new();
        let mut orphans = Vec::new();

        for (addr, resource_state) in self.state.instances_within(&path) {
            let configured = NodeKey::resource(&addr.containing_resource());
            let covered = match graph.vertex(&configured).and_then(Vertex::as_resource) {
                Some(node) => node.each_mode() == addr.key.each_mode(),
                None => false,
            };
            if !covered {
                orphans.push(ResourceNode::orphan(&addr, resource_state.provider.clone()));
            }
        }

        for orphan in orphans {
            tracing::debug!(
                address = %orphan.addr,
                key = ?orphan.key,
                "adding state-only instance"
            );
            if let Err(error) = graph.add(Vertex::Resource(orphan)) {
                diagnostics.push(Diagnostic::error("Duplicate declaration", error.to_string()));
            }
        }
        diagnostics
    }
}
