use std::fmt;

use terrace_domain::{
    Config, Diagnostic, Diagnostics, ModuleInstance, Schemas, State, Target,
};

use crate::error::BuildError;
use crate::graph::Graph;
use crate::import::ImportTarget;
use crate::node::{NodeKey, Vertex};
use crate::transform::{
    AttachConfigTransformer, ConfigTransformer, CountBoundaryTransformer, GraphTransformer,
    ImportTransformer, OrphanTransformer, ProviderCloseTransformer, ProviderTransformer,
    ReferenceTransformer, RootTransformer, TargetsTransformer, TransitiveReductionTransformer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildOptions {
    /// Keep edges implied by longer paths. Listings are easier to read with
    /// every direct dependency present.
    pub disable_reduce: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderKind {
    Validate,
    Plan,
    Apply,
    Import,
}

impl BuilderKind {
    const fn inserts_structure(self) -> bool {
        !matches!(self, Self::Validate)
    }
}

impl fmt::Display for BuilderKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Validate => "validate",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Import => "import",
        })
    }
}

/// Builds the execution graph for one walk operation.
///
/// Every variant runs a fixed transformer pipeline; see [`GraphBuilder::build`].
pub struct GraphBuilder<'a> {
    kind: BuilderKind,
    config: &'a Config,
    state: Option<&'a State>,
    schemas: Option<&'a Schemas>,
    targets: Vec<Target>,
    excludes: Vec<Target>,
    imports: Vec<ImportTarget>,
    options: BuildOptions,
}

impl<'a> GraphBuilder<'a> {
    fn new(kind: BuilderKind, config: &'a Config) -> Self {
        Self {
            kind,
            config,
            state: None,
            schemas: None,
            targets: Vec::new(),
            excludes: Vec::new(),
            imports: Vec::new(),
            options: BuildOptions::default(),
        }
    }

    /// Configuration only: no prior state, no close or boundary vertices.
    /// Schemas, when given, refine reference analysis.
    #[must_use]
    pub fn validate(config: &'a Config, schemas: Option<&'a Schemas>) -> Self {
        Self {
            schemas,
            ..Self::new(BuilderKind::Validate, config)
        }
    }

    #[must_use]
    pub fn plan(config: &'a Config, state: &'a State, schemas: &'a Schemas) -> Self {
        Self {
            state: Some(state),
            schemas: Some(schemas),
            ..Self::new(BuilderKind::Plan, config)
        }
    }

    #[must_use]
    pub fn apply(config: &'a Config, state: &'a State, schemas: &'a Schemas) -> Self {
        Self {
            state: Some(state),
            schemas: Some(schemas),
            ..Self::new(BuilderKind::Apply, config)
        }
    }

    /// Only the import addresses and what they depend on end up in the
    /// graph.
    #[must_use]
    pub fn import(config: &'a Config, schemas: &'a Schemas, imports: Vec<ImportTarget>) -> Self {
        Self {
            schemas: Some(schemas),
            imports,
            ..Self::new(BuilderKind::Import, config)
        }
    }

    #[must_use]
    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    #[must_use]
    pub fn with_excludes(mut self, excludes: Vec<Target>) -> Self {
        self.excludes = excludes;
        self
    }

    #[must_use]
    pub const fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn kind(&self) -> BuilderKind {
        self.kind
    }

    fn import_targets(&self) -> Vec<Target> {
        self.imports
            .iter()
            .filter_map(|import| import.addr.to_string().parse().ok())
            .collect()
    }

    fn steps<'s>(&'s self, import_targets: &'s [Target]) -> Vec<Box<dyn GraphTransformer + 's>> {
        let mut steps: Vec<Box<dyn GraphTransformer + 's>> = vec![Box::new(ConfigTransformer {
            config: self.config,
        })];

        match self.kind {
            BuilderKind::Validate => {}
            BuilderKind::Plan | BuilderKind::Apply => {
                if let Some(state) = self.state {
                    steps.push(Box::new(OrphanTransformer { state }));
                }
            }
            BuilderKind::Import => steps.push(Box::new(ImportTransformer {
                imports: &self.imports,
            })),
        }

        steps.push(Box::new(AttachConfigTransformer {
            config: self.config,
        }));
        steps.push(Box::new(ReferenceTransformer {
            config: self.config,
            schemas: self.schemas,
        }));

        let structural = self.kind.inserts_structure();
        steps.push(Box::new(ProviderTransformer {
            config: self.config,
            schemas: if structural { self.schemas } else { None },
            prune_unused: structural,
        }));

        if structural {
            steps.push(Box::new(ProviderCloseTransformer));
            steps.push(Box::new(CountBoundaryTransformer));
            let targets = match self.kind {
                BuilderKind::Import => import_targets,
                _ => self.targets.as_slice(),
            };
            steps.push(Box::new(TargetsTransformer {
                config: self.config,
                targets,
                excludes: &self.excludes,
            }));
        }

        steps.push(Box::new(RootTransformer));
        if !self.options.disable_reduce {
            steps.push(Box::new(TransitiveReductionTransformer));
        }
        steps
    }

    /// Build the graph for the module instance at `path`.
    ///
    /// Transformers run in order: config, orphans or imports, attach-config,
    /// references, providers, then for everything but validate provider
    /// close, count boundary and targets, and finally root and transitive
    /// reduction. The build stops at the first transformer reporting an
    /// error; warnings are logged and kept on the graph.
    ///
    /// # Errors
    ///
    /// Returns an error when a transformer fails, when the graph has cycles,
    /// or when the finished graph breaks a structural invariant.
    pub fn build(&self, path: &ModuleInstance) -> Result<Graph, BuildError> {
        let import_targets = self.import_targets();
        let mut graph = Graph::new(path.clone());

        for step in self.steps(&import_targets) {
            let diagnostics = step.transform(&mut graph);
            tracing::debug!(
                builder = %self.kind,
                transformer = step.name(),
                vertices = graph.len(),
                edges = graph.edge_count(),
                "applied graph transformer"
            );
            if diagnostics.has_errors() {
                return Err(BuildError::Transform {
                    transformer: step.name(),
                    diagnostics,
                });
            }
            for warning in diagnostics.warnings() {
                tracing::warn!(transformer = step.name(), "{warning}");
            }
            graph.add_warnings(diagnostics);
        }

        let cycles = graph.cycles();
        if !cycles.is_empty() {
            let diagnostics: Diagnostics = cycles
                .into_iter()
                .map(|cycle| {
                    let names: Vec<&str> = cycle.iter().map(NodeKey::as_str).collect();
                    Diagnostic::error(format!("Cycle: {}", names.join(", ")), "")
                })
                .collect();
            return Err(BuildError::Cycles { diagnostics });
        }

        if self.kind.inserts_structure() {
            check_provider_closes(&graph)?;
        }
        check_root_reaches_everything(&graph)?;
        Ok(graph)
    }
}

fn check_provider_closes(graph: &Graph) -> Result<(), BuildError> {
    for (key, vertex) in graph.vertices() {
        match vertex {
            Vertex::Provider(node) => {
                let close = NodeKey::provider_close(&node.addr);
                if !graph.contains(&close) {
                    return Err(BuildError::Invariant {
                        message: format!("provider {key} has no close vertex"),
                    });
                }
            }
            Vertex::ProviderClose(addr) => {
                if !graph.contains(&NodeKey::provider(addr)) {
                    return Err(BuildError::Invariant {
                        message: format!("{key} has no provider vertex"),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_root_reaches_everything(graph: &Graph) -> Result<(), BuildError> {
    let root = NodeKey::root();
    let reached = graph.transitive_dependencies(&root);
    if let Some(missing) = graph
        .keys()
        .into_iter()
        .find(|key| *key != root && !reached.contains(key))
    {
        return Err(BuildError::Invariant {
            message: format!("{missing} is not reachable from the root"),
        });
    }
    Ok(())
}
