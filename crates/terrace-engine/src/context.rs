mod walker;

use std::collections::BTreeMap;
use std::sync::Arc;

use terrace_domain::{
    Changes, Config, Diagnostics, ModuleInstance, Plan, ProviderType, Schemas, State, Target,
    WalkSummary,
};

use crate::builder::{BuildOptions, GraphBuilder};
use crate::error::ContextError;
use crate::eval::{Evaluator, LiteralEvaluator};
use crate::graph::Graph;
use crate::hooks::Hook;
use crate::import::ImportTarget;
use crate::provider::ProviderRegistry;
use crate::walk::{WalkOptions, walk};

use walker::{GraphWalker, Operation};

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub summary: WalkSummary,
}

#[derive(Debug, Clone)]
pub struct StateOutcome {
    pub state: State,
    pub summary: WalkSummary,
}

/// Everything a walk operation needs: configuration, provider schemas and
/// factories, the evaluator and the hooks to notify.
pub struct Context {
    config: Config,
    schemas: Schemas,
    providers: ProviderRegistry,
    evaluator: Arc<dyn Evaluator>,
    hooks: Vec<Arc<dyn Hook>>,
    walk_options: WalkOptions,
    build_options: BuildOptions,
}

/// Ask every registered provider for its schema. Each provider is started
/// and closed again.
fn load_schemas(providers: &ProviderRegistry) -> Result<Schemas, ContextError> {
    let mut schemas = BTreeMap::new();
    for provider_type in providers.provider_types() {
        let provider = providers.instantiate(provider_type)?;
        let response = provider.get_schema();
        let mut diagnostics = response.diagnostics;
        diagnostics.extend(provider.close());
        if diagnostics.has_errors() {
            return Err(ContextError::Schema {
                provider: provider_type.clone(),
                diagnostics,
            });
        }
        tracing::debug!(provider = %provider_type, "loaded provider schema");
        schemas.insert(provider_type.clone(), response.schema);
    }
    Ok(Schemas::new(schemas))
}

impl Context {
    /// # Errors
    ///
    /// Returns an error when a provider cannot be started or reports errors
    /// while returning its schema.
    pub fn new(config: Config, providers: ProviderRegistry) -> Result<Self, ContextError> {
        let schemas = load_schemas(&providers)?;
        Ok(Self {
            config,
            schemas,
            providers,
            evaluator: Arc::new(LiteralEvaluator),
            hooks: Vec::new(),
            walk_options: WalkOptions::default(),
            build_options: BuildOptions::default(),
        })
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_walk_options(mut self, options: WalkOptions) -> Self {
        self.walk_options = options;
        self
    }

    #[must_use]
    pub const fn with_build_options(mut self, options: BuildOptions) -> Self {
        self.build_options = options;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    #[must_use]
    pub fn supports(&self, provider_type: &ProviderType) -> bool {
        self.providers.is_supported(provider_type)
    }

    fn run(
        &self,
        graph: &Graph,
        operation: Operation,
        state: State,
        planned: Option<&Changes>,
    ) -> Result<(State, Changes, WalkSummary), ContextError> {
        tracing::info!(
            operation = %operation,
            vertices = graph.len(),
            "walking graph"
        );
        let walker = GraphWalker::new(self, operation, state, planned);
        let walked = walk(graph, &walker, &self.walk_options);
        let (state, changes) = walker.into_parts();
        let mut summary = walked?;

        let mut diagnostics = Diagnostics::new();
        diagnostics.extend(graph.warnings().clone());
        diagnostics.extend(summary.diagnostics);
        summary.diagnostics = diagnostics;
        Ok((state, changes, summary))
    }

    /// Check the configuration against provider schemas without touching
    /// any remote object.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph cannot be built or the walk aborts.
    pub fn validate(&self) -> Result<WalkSummary, ContextError> {
        let graph = GraphBuilder::validate(&self.config, Some(&self.schemas))
            .with_options(self.build_options)
            .build(&ModuleInstance::root())?;
        let (_, _, summary) = self.run(&graph, Operation::Validate, State::default(), None)?;
        Ok(summary)
    }

    /// Refresh prior state and work out the change needed for every
    /// instance. The plan's prior state is the refreshed state.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph cannot be built or the walk aborts.
    pub fn plan(
        &self,
        state: &State,
        targets: &[Target],
        excludes: &[Target],
    ) -> Result<PlanOutcome, ContextError> {
        let graph = GraphBuilder::plan(&self.config, state, &self.schemas)
            .with_targets(targets.to_vec())
            .with_excludes(excludes.to_vec())
            .with_options(self.build_options)
            .build(&ModuleInstance::root())?;
        let (prior_state, changes, summary) =
            self.run(&graph, Operation::Plan, state.clone(), None)?;
        Ok(PlanOutcome {
            plan: Plan {
                changes,
                prior_state,
            },
            summary,
        })
    }

    /// Read every recorded object back from its provider.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph cannot be built or the walk aborts.
    pub fn refresh(&self, state: &State) -> Result<StateOutcome, ContextError> {
        let graph = GraphBuilder::plan(&self.config, state, &self.schemas)
            .with_options(self.build_options)
            .build(&ModuleInstance::root())?;
        let (state, _, summary) = self.run(&graph, Operation::Refresh, state.clone(), None)?;
        Ok(StateOutcome { state, summary })
    }

    /// Carry out a plan. Instances without a planned change are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph cannot be built or the walk aborts.
    pub fn apply(&self, plan: &Plan) -> Result<StateOutcome, ContextError> {
        let graph = GraphBuilder::apply(&self.config, &plan.prior_state, &self.schemas)
            .with_options(self.build_options)
            .build(&ModuleInstance::root())?;
        let (state, _, summary) = self.run(
            &graph,
            Operation::Apply,
            plan.prior_state.clone(),
            Some(&plan.changes),
        )?;
        Ok(StateOutcome { state, summary })
    }

    /// Adopt existing remote objects into state.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph cannot be built or the walk aborts.
    pub fn import(
        &self,
        state: &State,
        imports: Vec<ImportTarget>,
    ) -> Result<StateOutcome, ContextError> {
        let graph = GraphBuilder::import(&self.config, &self.schemas, imports)
            .with_options(self.build_options)
            .build(&ModuleInstance::root())?;
        let (state, _, summary) = self.run(&graph, Operation::Import, state.clone(), None)?;
        Ok(StateOutcome { state, summary })
    }
}

#[cfg(test)]
mod tests;
