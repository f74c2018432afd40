use std::collections::BTreeSet;

use terrace_domain::{
    Config, Diagnostic, Diagnostics, ModuleCallConfig, ModuleInstance, Reference, ResourceMode,
    Schemas,
};

use super::GraphTransformer;
use crate::graph::Graph;
use crate::node::{NodeKey, Vertex};
use crate::references::{references_in_block, references_in_expr, references_in_traversals};

/// Connects every vertex to the vertices its expressions refer to.
pub struct ReferenceTransformer<'a> {
    pub config: &'a Config,
    pub schemas: Option<&'a Schemas>,
}

/// References of one vertex, grouped by the module they resolve in.
type ScopedReferences = Vec<(ModuleInstance, BTreeSet<Reference>)>;

impl ReferenceTransformer<'_> {
    fn references(&self, vertex: &Vertex) -> Result<ScopedReferences, Diagnostics> {
        let mut diagnostics = Diagnostics::new();
        let mut scoped = Vec::new();
        let mut collect =
            |scope: &ModuleInstance, found: Result<BTreeSet<Reference>, Diagnostics>| match found {
                Ok(found) if !found.is_empty() => scoped.push((scope.clone(), found)),
                Ok(_) => {}
                Err(errors) => diagnostics.extend(errors),
            };

        match vertex {
            Vertex::Resource(node) => {
                if let Some(config) = &node.config {
                    let schema = self.schemas.and_then(|schemas| {
                        schemas.resource(&node.provider_type, &node.addr.resource)
                    });
                    let module = node.module();
                    collect(module, references_in_block(&config.body, schema));
                    if let Some(count) = &config.count {
                        collect(module, references_in_expr(count));
                    }
                    if let Some(for_each) = &config.for_each {
                        collect(module, references_in_expr(for_each));
                    }
                    collect(module, references_in_traversals(&config.depends_on));

                    // depends_on of every enclosing module call applies here too.
                    let mut inner = module.clone();
                    while let Some(parent) = inner.parent() {
                        if let Some((_, call)) = self.config.call_for(&inner.module()) {
                            collect(&parent, references_in_traversals(&call.depends_on));
                        }
                        inner = parent;
                    }
                }
            }
            Vertex::Provider(node) => {
                if let Some(config) = &node.config {
                    let schema = self
                        .schemas
                        .and_then(|schemas| schemas.provider_config(&node.addr.provider));
                    collect(&node.addr.module, references_in_block(&config.body, schema));
                }
            }
            Vertex::Variable(node) => {
                if let (Some(argument), Some(parent)) = (&node.argument, node.module.parent()) {
                    collect(&parent, references_in_expr(argument));
                }
            }
            Vertex::Local(node) => collect(&node.module, references_in_expr(&node.config.expr)),
            Vertex::Output(node) => {
                collect(&node.module, references_in_expr(&node.config.expr));
                collect(&node.module, references_in_traversals(&node.config.depends_on));
            }
            Vertex::ProviderClose(_) | Vertex::CountBoundary(_) | Vertex::Root => {}
        }

        if diagnostics.has_errors() {
            Err(diagnostics)
        } else {
            Ok(scoped)
        }
    }

    fn resolve(
        &self,
        graph: &Graph,
        scope: &ModuleInstance,
        reference: &Reference,
    ) -> Result<Vec<NodeKey>, Diagnostic> {
        let module_name = || {
            if scope.is_root() {
                "the root module".to_string()
            } else {
                scope.to_string()
            }
        };

        match reference {
            Reference::Resource(resource) => {
                let key = NodeKey::resource(&resource.absolute(scope.clone()));
                if graph.contains(&key) {
                    return Ok(vec![key]);
                }
                let what = match resource.mode {
                    ResourceMode::Managed => "managed resource",
                    ResourceMode::Data => "data resource",
                };
                Err(Diagnostic::error(
                    "Reference to undeclared resource",
                    format!(
                        "A {what} \"{}\" \"{}\" has not been declared in {}.",
                        resource.type_name,
                        resource.name,
                        module_name()
                    ),
                ))
            }
            Reference::Variable(name) => {
                let key = NodeKey::variable(scope, name);
                if graph.contains(&key) {
                    return Ok(vec![key]);
                }
                Err(Diagnostic::error(
                    "Reference to undeclared input variable",
                    format!(
                        "An input variable with the name \"{name}\" has not been declared in {}.",
                        module_name()
                    ),
                ))
            }
            Reference::Local(name) => {
                let key = NodeKey::local(scope, name);
                if graph.contains(&key) {
                    return Ok(vec![key]);
                }
                Err(Diagnostic::error(
                    "Reference to undeclared local value",
                    format!(
                        "A local value with the name \"{name}\" has not been declared in {}.",
                        module_name()
                    ),
                ))
            }
            Reference::ModuleOutput { call, output } => {
                let call_config = self.module_call(scope, call)?;
                if !call_config.module.outputs.iter().any(|o| &o.name == output) {
                    return Err(Diagnostic::error(
                        "Reference to undeclared output value",
                        format!(
                            "An output value with the name \"{output}\" has not been declared \
                             in module.{call}."
                        ),
                    ));
                }
                Ok(call_config
                    .instances
                    .keys()
                    .into_iter()
                    .map(|key| NodeKey::output(&scope.child(call, key), output))
                    .filter(|key| graph.contains(key))
                    .collect())
            }
            Reference::ModuleCall(call) => {
                let call_config = self.module_call(scope, call)?;
                let prefixes: Vec<ModuleInstance> = call_config
                    .instances
                    .keys()
                    .into_iter()
                    .map(|key| scope.child(call, key))
                    .collect();
                Ok(graph
                    .vertices()
                    .filter(|(_, vertex)| match vertex {
                        Vertex::Resource(node) => !node.is_orphan(),
                        Vertex::Output(_) => true,
                        _ => false,
                    })
                    .filter(|(_, vertex)| {
                        vertex.module().is_some_and(|module| {
                            prefixes.iter().any(|prefix| module.has_prefix(prefix))
                        })
                    })
                    .map(|(key, _)| key.clone())
                    .collect())
            }
        }
    }

    fn module_call(
        &self,
        scope: &ModuleInstance,
        call: &str,
    ) -> Result<&ModuleCallConfig, Diagnostic> {
        super::module_instance_config(self.config, scope)
            .and_then(|module| module.module_call(call))
            .ok_or_else(|| {
                Diagnostic::error(
                    "Reference to undeclared module",
                    format!("No module call named \"{call}\" is declared in {scope}."),
                )
            })
    }
}

impl GraphTransformer for ReferenceTransformer<'_> {
    fn name(&self) -> &'static str {
        "references"
    }

    fn transform(&self, graph: &mut Graph) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let mut edges = Vec::new();

        for (key, vertex) in graph.vertices() {
            let scoped = match self.references(vertex) {
                Ok(scoped) => scoped,
                Err(errors) => {
                    diagnostics.extend(errors.at(key));
                    continue;
                }
            };
            for (scope, references) in scoped {
                // Values from outside the graph's module are supplied by the caller.
                if !scope.has_prefix(graph.path()) {
                    tracing::debug!(vertex = %key, %scope, "leaving caller references unresolved");
                    continue;
                }
                for reference in references {
                    match self.resolve(graph, &scope, &reference) {
                        Ok(targets) => {
                            for target in targets {
                                if &target != key {
                                    edges.push((key.clone(), target));
                                    continue;
                                }
                                diagnostics.push(
                                    Diagnostic::error(
                                        "Self-referential block",
                                        format!("Configuration for {key} may not refer to itself."),
                                    )
                                    .at(key),
                                );
                            }
                        }
                        Err(diagnostic) => diagnostics.push(diagnostic.at(key)),
                    }
                }
            }
        }

        for (from, to) in edges {
            graph.connect(&from, &to);
        }
        diagnostics
    }
}
