use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use terrace_domain::{
    AbsProviderConfig, AbsResourceInstance, Action, Changes, Diagnostic, Diagnostics,
    InstanceKey, InstanceObject, ModuleInstance, Resource, ResourceChange, ResourceConfig,
    ResourceMode, State,
};

use super::Context;
use crate::error::WalkError;
use crate::node::{LocalNode, NodeKey, OutputNode, ProviderNode, ResourceNode, VariableNode, Vertex};
use crate::provider::{
    ApplyResourceChangeRequest, ConfigureRequest, ImportResourceStateRequest,
    PlanResourceChangeRequest, Provider, ReadDataSourceRequest, ReadResourceRequest,
};
use crate::transform::module_instance_config;
use crate::validation::validate_body;
use crate::walk::Visitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Operation {
    Validate,
    Plan,
    Refresh,
    Apply,
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Validate => "validate",
            Self::Plan => "plan",
            Self::Refresh => "refresh",
            Self::Apply => "apply",
            Self::Import => "import",
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `NoKey` and `[0]` stand for the same object when a resource gains or
/// loses `count`.
fn migrated_key(key: &InstanceKey) -> Option<InstanceKey> {
    match key {
        InstanceKey::NoKey => Some(InstanceKey::Int(0)),
        InstanceKey::Int(0) => Some(InstanceKey::NoKey),
        _ => None,
    }
}

/// The prior object for `addr`, falling back to the object recorded under
/// the other key shape.
fn prior_object(state: &State, addr: &AbsResourceInstance) -> Option<(AbsResourceInstance, Value)> {
    if let Some(object) = state.instance(addr) {
        return Some((addr.clone(), object.value.clone()));
    }
    let other = addr.containing_resource().instance(migrated_key(&addr.key)?);
    state
        .instance(&other)
        .map(|object| (other.clone(), object.value.clone()))
}

fn value_or_null(value: Option<Value>) -> Value {
    value.unwrap_or(Value::Null)
}

/// Evaluates each vertex for one walk operation. State and changes are
/// shared between worker threads; every visitor locks them only around
/// reads and writes, never across provider calls.
pub(super) struct GraphWalker<'c> {
    context: &'c Context,
    operation: Operation,
    planned: Option<&'c Changes>,
    state: Mutex<State>,
    changes: Mutex<Changes>,
    providers: Mutex<BTreeMap<AbsProviderConfig, Arc<dyn Provider>>>,
}

impl<'c> GraphWalker<'c> {
    pub(super) fn new(
        context: &'c Context,
        operation: Operation,
        state: State,
        planned: Option<&'c Changes>,
    ) -> Self {
        Self {
            context,
            operation,
            planned,
            state: Mutex::new(state),
            changes: Mutex::new(Changes::default()),
            providers: Mutex::new(BTreeMap::new()),
        }
    }

    pub(super) fn into_parts(self) -> (State, Changes) {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let changes = self
            .changes
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let leftover = self
            .providers
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        for (addr, provider) in leftover {
            tracing::debug!(provider = %addr, "closing provider left open by the walk");
            let closed = provider.close();
            for error in closed.errors() {
                tracing::warn!(provider = %addr, "{error}");
            }
        }
        (state, changes)
    }

    fn provider(
        &self,
        key: &NodeKey,
        node: &ResourceNode,
    ) -> Result<(AbsProviderConfig, Arc<dyn Provider>), WalkError> {
        let Some(addr) = &node.resolved_provider else {
            return Err(WalkError::Invariant {
                vertex: key.to_string(),
                message: "resource has no resolved provider".to_string(),
            });
        };
        let provider = lock(&self.providers).get(addr).cloned();
        provider
            .map(|provider| (addr.clone(), provider))
            .ok_or_else(|| WalkError::Invariant {
                vertex: key.to_string(),
                message: format!("{addr} is not configured"),
            })
    }

    fn record_change(&self, change: ResourceChange) {
        tracing::debug!(address = %change.addr, action = ?change.action, "planned change");
        for hook in &self.context.hooks {
            hook.post_plan(&change);
        }
        lock(&self.changes).insert(change);
    }

    fn write_object(&self, addr: &AbsResourceInstance, provider: &AbsProviderConfig, value: Option<Value>) {
        let mut state = lock(&self.state);
        match value {
            Some(value) => state.set_instance(addr, provider, InstanceObject::ready(value)),
            None => {
                state.remove_instance(addr);
            }
        }
    }

    // Resources

    fn expansion(&self, node: &ResourceNode, config: &ResourceConfig) -> Result<Vec<InstanceKey>, Diagnostics> {
        self.context.evaluator.expand(node.module(), config)
    }

    fn config_value(&self, node: &ResourceNode, config: &ResourceConfig) -> Result<Value, Diagnostics> {
        self.context.evaluator.evaluate_body(node.module(), &config.body)
    }

    /// Prior instances of a configured resource that its expansion no longer
    /// produces. Instances of another key shape have vertices of their own.
    fn stale_instances(&self, node: &ResourceNode, keys: &[InstanceKey]) -> Vec<(AbsResourceInstance, Value)> {
        let state = lock(&self.state);
        let Some(resource) = state.resource(&node.addr) else {
            return Vec::new();
        };
        resource
            .instances
            .iter()
            .filter(|(key, _)| key.each_mode() == node.each_mode() && !keys.contains(key))
            .map(|(key, object)| (node.addr.instance(key.clone()), object.value.clone()))
            .collect()
    }

    /// Whether a configured resource will take over this prior instance
    /// under its new key shape.
    fn is_migration_candidate(&self, node: &ResourceNode, addr: &AbsResourceInstance) -> bool {
        let Some(config) = &node.config else {
            return false;
        };
        let Some(target) = migrated_key(&addr.key) else {
            return false;
        };
        let Ok(keys) = self.expansion(node, config) else {
            return false;
        };
        keys.contains(&target) && lock(&self.state).instance(&node.addr.instance(target)).is_none()
    }

    fn visit_resource(&self, key: &NodeKey, node: &ResourceNode) -> Result<Diagnostics, WalkError> {
        let diagnostics = match (self.operation, node.key.as_ref(), node.config.as_ref()) {
            (Operation::Validate, _, Some(config)) => self.validate_resource(node, config),
            (Operation::Validate, _, None) => Diagnostics::new(),
            (Operation::Plan, None, Some(config)) => self.plan_configured(key, node, config)?,
            (Operation::Plan, Some(instance), _) => self.plan_instance(key, node, instance)?,
            (Operation::Refresh, None, Some(config)) => self.refresh_configured(key, node, config)?,
            (Operation::Refresh, Some(instance), _) => {
                let addr = node.addr.instance(instance.clone());
                self.refresh_existing(key, node, &addr)?
            }
            (Operation::Apply, _, _) => self.apply_resource(key, node)?,
            (Operation::Import, _, _) => self.import_resource(key, node)?,
            (_, None, None) => {
                return Err(WalkError::Invariant {
                    vertex: key.to_string(),
                    message: "resource vertex has neither configuration nor instance key".to_string(),
                });
            }
        };
        Ok(diagnostics.at(&node.addr))
    }

    fn validate_resource(&self, node: &ResourceNode, config: &ResourceConfig) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        if let Err(expansion) = self.expansion(node, config) {
            diagnostics.extend(expansion);
        }
        let Some(schema) = self.context.schemas.provider(&node.provider_type) else {
            return diagnostics;
        };
        match schema.schema_for(&config.resource) {
            Some(block) => diagnostics.extend(validate_body(&config.body, block)),
            None => diagnostics.push(Diagnostic::error(
                "Invalid resource type",
                format!(
                    "The provider {} does not support resource type \"{}\".",
                    node.provider_type, config.resource.type_name
                ),
            )),
        }
        diagnostics
    }

    fn plan_configured(&self, key: &NodeKey, node: &ResourceNode, config: &ResourceConfig) -> Result<Diagnostics, WalkError> {
        let keys = match self.expansion(node, config) {
            Ok(keys) => keys,
            Err(diagnostics) => return Ok(diagnostics),
        };
        let value = match self.config_value(node, config) {
            Ok(value) => value,
            Err(diagnostics) => return Ok(diagnostics),
        };
        let (provider_addr, provider) = self.provider(key, node)?;
        let mut diagnostics = Diagnostics::new();

        for instance in &keys {
            let addr = node.addr.instance(instance.clone());
            let outcome = match config.resource.mode {
                ResourceMode::Managed => self.plan_managed(provider.as_ref(), &provider_addr, &addr, &value),
                ResourceMode::Data => self.plan_data(provider.as_ref(), &provider_addr, &addr, &value),
            };
            diagnostics.extend(outcome.at(&addr));
        }

        for (addr, before) in self.stale_instances(node, &keys) {
            self.record_change(ResourceChange {
                addr,
                provider: provider_addr.clone(),
                action: Action::Delete,
                before,
                after: Value::Null,
            });
        }
        Ok(diagnostics)
    }

    fn plan_managed(
        &self,
        provider: &dyn Provider,
        provider_addr: &AbsProviderConfig,
        addr: &AbsResourceInstance,
        config: &Value,
    ) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let prior = prior_object(&lock(&self.state), addr);
        let before = match prior {
            Some((prior_addr, value)) => {
                let (refreshed, refresh_diagnostics) =
                    self.refresh_object(provider, provider_addr, &prior_addr, value);
                diagnostics.extend(refresh_diagnostics);
                if diagnostics.has_errors() {
                    return diagnostics;
                }
                refreshed
            }
            None => None,
        };

        let response = provider.plan_resource_change(&PlanResourceChangeRequest {
            type_name: addr.resource.type_name.clone(),
            prior: before.clone(),
            config: config.clone(),
        });
        diagnostics.extend(response.diagnostics);
        if diagnostics.has_errors() {
            return diagnostics;
        }

        let action = match &before {
            None => Action::Create,
            Some(_) if !response.requires_replace.is_empty() => Action::Replace,
            Some(before) if *before == response.planned => Action::NoOp,
            Some(_) => Action::Update,
        };
        self.record_change(ResourceChange {
            addr: addr.clone(),
            provider: provider_addr.clone(),
            action,
            before: value_or_null(before),
            after: response.planned,
        });
        diagnostics
    }

    fn plan_data(
        &self,
        provider: &dyn Provider,
        provider_addr: &AbsProviderConfig,
        addr: &AbsResourceInstance,
        config: &Value,
    ) -> Diagnostics {
        let response = provider.read_data_source(&ReadDataSourceRequest {
            type_name: addr.resource.type_name.clone(),
            config: config.clone(),
        });
        if response.diagnostics.has_errors() {
            return response.diagnostics;
        }
        self.write_object(addr, provider_addr, Some(response.state.clone()));
        self.record_change(ResourceChange {
            addr: addr.clone(),
            provider: provider_addr.clone(),
            action: Action::Read,
            before: Value::Null,
            after: response.state,
        });
        response.diagnostics
    }

    /// Plan a state-only instance: removed from configuration, or recorded
    /// under a key shape the configuration no longer uses.
    fn plan_instance(&self, key: &NodeKey, node: &ResourceNode, instance: &InstanceKey) -> Result<Diagnostics, WalkError> {
        let addr = node.addr.instance(instance.clone());
        let Some(before) = lock(&self.state).instance(&addr).map(|object| object.value.clone()) else {
            return Ok(Diagnostics::new());
        };
        let (provider_addr, provider) = self.provider(key, node)?;

        if self.is_migration_candidate(node, &addr) {
            self.record_change(ResourceChange {
                addr,
                provider: provider_addr,
                action: Action::NoOp,
                before: before.clone(),
                after: before,
            });
            return Ok(Diagnostics::new());
        }

        let mut diagnostics = Diagnostics::new();
        let before = if addr.resource.mode == ResourceMode::Managed {
            let (refreshed, refresh_diagnostics) =
                self.refresh_object(provider.as_ref(), &provider_addr, &addr, before);
            diagnostics.extend(refresh_diagnostics);
            if diagnostics.has_errors() {
                return Ok(diagnostics);
            }
            refreshed
        } else {
            Some(before)
        };

        if let Some(before) = before {
            self.record_change(ResourceChange {
                addr,
                provider: provider_addr,
                action: Action::Delete,
                before,
                after: Value::Null,
            });
        }
        Ok(diagnostics)
    }

    /// Read one object back from its provider and record the result.
    fn refresh_object(
        &self,
        provider: &dyn Provider,
        provider_addr: &AbsProviderConfig,
        addr: &AbsResourceInstance,
        prior: Value,
    ) -> (Option<Value>, Diagnostics) {
        for hook in &self.context.hooks {
            hook.pre_refresh(addr);
        }
        let response = provider.read_resource(&ReadResourceRequest {
            type_name: addr.resource.type_name.clone(),
            prior,
        });
        if response.diagnostics.has_errors() {
            return (None, response.diagnostics);
        }
        if response.new_state.is_none() {
            tracing::debug!(address = %addr, "object no longer exists");
        }
        self.write_object(addr, provider_addr, response.new_state.clone());
        for hook in &self.context.hooks {
            hook.post_refresh(addr, response.new_state.as_ref());
        }
        (response.new_state, response.diagnostics)
    }

    fn refresh_configured(&self, key: &NodeKey, node: &ResourceNode, config: &ResourceConfig) -> Result<Diagnostics, WalkError> {
        if config.resource.mode == ResourceMode::Data {
            let keys = match self.expansion(node, config) {
                Ok(keys) => keys,
                Err(diagnostics) => return Ok(diagnostics),
            };
            let value = match self.config_value(node, config) {
                Ok(value) => value,
                Err(diagnostics) => return Ok(diagnostics),
            };
            let (provider_addr, provider) = self.provider(key, node)?;
            let mut diagnostics = Diagnostics::new();
            for instance in keys {
                let addr = node.addr.instance(instance);
                let response = provider.read_data_source(&ReadDataSourceRequest {
                    type_name: addr.resource.type_name.clone(),
                    config: value.clone(),
                });
                if !response.diagnostics.has_errors() {
                    self.write_object(&addr, &provider_addr, Some(response.state));
                }
                diagnostics.extend(response.diagnostics.at(&addr));
            }
            return Ok(diagnostics);
        }

        let recorded: Vec<AbsResourceInstance> = lock(&self.state)
            .resource(&node.addr)
            .map(|resource| {
                resource
                    .instances
                    .keys()
                    .filter(|instance| instance.each_mode() == node.each_mode())
                    .map(|instance| node.addr.instance(instance.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let mut diagnostics = Diagnostics::new();
        for addr in recorded {
            diagnostics.extend(self.refresh_existing(key, node, &addr)?.at(&addr));
        }
        Ok(diagnostics)
    }

    fn refresh_existing(&self, key: &NodeKey, node: &ResourceNode, addr: &AbsResourceInstance) -> Result<Diagnostics, WalkError> {
        if addr.resource.mode == ResourceMode::Data {
            return Ok(Diagnostics::new());
        }
        let Some(prior) = lock(&self.state).instance(addr).map(|object| object.value.clone()) else {
            return Ok(Diagnostics::new());
        };
        let (provider_addr, provider) = self.provider(key, node)?;
        let (_, diagnostics) = self.refresh_object(provider.as_ref(), &provider_addr, addr, prior);
        Ok(diagnostics)
    }

    /// The planned changes this vertex is responsible for.
    fn planned_for(&self, node: &ResourceNode) -> Vec<ResourceChange> {
        let Some(planned) = self.planned else {
            return Vec::new();
        };
        match &node.key {
            Some(instance) => planned
                .get(&node.addr.instance(instance.clone()))
                .cloned()
                .into_iter()
                .collect(),
            None => planned
                .iter()
                .filter(|change| {
                    change.addr.containing_resource() == node.addr
                        && change.addr.key.each_mode() == node.each_mode()
                })
                .cloned()
                .collect(),
        }
    }

    fn apply_resource(&self, key: &NodeKey, node: &ResourceNode) -> Result<Diagnostics, WalkError> {
        let changes = self.planned_for(node);
        let mut diagnostics = Diagnostics::new();
        for change in changes {
            let applied = self.apply_change(key, node, &change)?;
            for hook in &self.context.hooks {
                hook.post_apply(&change, &applied);
            }
            diagnostics.extend(applied.at(&change.addr));
        }
        Ok(diagnostics)
    }

    fn apply_change(&self, key: &NodeKey, node: &ResourceNode, change: &ResourceChange) -> Result<Diagnostics, WalkError> {
        if node.key.is_some() && change.action == Action::NoOp {
            // The configured resource takes this object over under its new key.
            return Ok(Diagnostics::new());
        }
        for hook in &self.context.hooks {
            hook.pre_apply(change);
        }

        let prior = prior_object(&lock(&self.state), &change.addr);
        if let Some((from, value)) = &prior {
            if *from != change.addr {
                tracing::debug!(from = %from, to = %change.addr, "moving object to its new key");
                let mut state = lock(&self.state);
                state.remove_instance(from);
                state.set_instance(&change.addr, &change.provider, InstanceObject::ready(value.clone()));
            }
        }
        let prior = prior.map(|(_, value)| value);

        if change.addr.resource.mode == ResourceMode::Data {
            return self.apply_data(key, node, change);
        }

        match change.action {
            Action::NoOp | Action::Read => Ok(Diagnostics::new()),
            Action::Delete => {
                let (_, provider) = self.provider(key, node)?;
                Ok(self.apply_call(provider.as_ref(), change, prior, None))
            }
            Action::Create | Action::Update => {
                let (_, provider) = self.provider(key, node)?;
                Ok(self.apply_call(provider.as_ref(), change, prior, Some(change.after.clone())))
            }
            Action::Replace => {
                let (_, provider) = self.provider(key, node)?;
                let destroyed = self.apply_call(provider.as_ref(), change, prior, None);
                if destroyed.has_errors() {
                    return Ok(destroyed);
                }
                let mut diagnostics = destroyed;
                diagnostics.extend(self.apply_call(provider.as_ref(), change, None, Some(change.after.clone())));
                Ok(diagnostics)
            }
        }
    }

    fn apply_data(&self, key: &NodeKey, node: &ResourceNode, change: &ResourceChange) -> Result<Diagnostics, WalkError> {
        if change.action == Action::Delete {
            self.write_object(&change.addr, &change.provider, None);
            return Ok(Diagnostics::new());
        }
        let Some(config) = &node.config else {
            return Ok(Diagnostics::new());
        };
        let value = match self.config_value(node, config) {
            Ok(value) => value,
            Err(diagnostics) => return Ok(diagnostics),
        };
        let (provider_addr, provider) = self.provider(key, node)?;
        let response = provider.read_data_source(&ReadDataSourceRequest {
            type_name: change.addr.resource.type_name.clone(),
            config: value,
        });
        if !response.diagnostics.has_errors() {
            self.write_object(&change.addr, &provider_addr, Some(response.state));
        }
        Ok(response.diagnostics)
    }

    fn apply_call(
        &self,
        provider: &dyn Provider,
        change: &ResourceChange,
        prior: Option<Value>,
        planned: Option<Value>,
    ) -> Diagnostics {
        let response = provider.apply_resource_change(&ApplyResourceChangeRequest {
            type_name: change.addr.resource.type_name.clone(),
            prior,
            planned,
        });
        if !response.diagnostics.has_errors() {
            self.write_object(&change.addr, &change.provider, response.new_state);
        }
        response.diagnostics
    }

    fn import_resource(&self, key: &NodeKey, node: &ResourceNode) -> Result<Diagnostics, WalkError> {
        if node.import_ids.is_empty() {
            return Ok(Diagnostics::new());
        }
        let (provider_addr, provider) = self.provider(key, node)?;
        let mut diagnostics = Diagnostics::new();

        for (instance, id) in &node.import_ids {
            let addr = node.addr.instance(instance.clone());
            if lock(&self.state).instance(&addr).is_some() {
                diagnostics.push(
                    Diagnostic::error(
                        "Resource already managed",
                        format!("{addr} is already in state; remove it from state before importing it again."),
                    )
                    .at(&addr),
                );
                continue;
            }
            diagnostics.extend(self.import_one(provider.as_ref(), &provider_addr, &addr, id).at(&addr));
        }
        Ok(diagnostics)
    }

    fn import_one(
        &self,
        provider: &dyn Provider,
        provider_addr: &AbsProviderConfig,
        addr: &AbsResourceInstance,
        id: &str,
    ) -> Diagnostics {
        let response = provider.import_resource_state(&ImportResourceStateRequest {
            type_name: addr.resource.type_name.clone(),
            id: id.to_string(),
        });
        let mut diagnostics = response.diagnostics;
        if diagnostics.has_errors() {
            return diagnostics;
        }
        let imported = response
            .imported
            .iter()
            .find(|imported| imported.type_name == addr.resource.type_name)
            .or_else(|| response.imported.first());
        let Some(imported) = imported else {
            diagnostics.push(Diagnostic::error(
                "Cannot import non-existent remote object",
                format!("The provider returned no object for id \"{id}\"."),
            ));
            return diagnostics;
        };

        let read = provider.read_resource(&ReadResourceRequest {
            type_name: addr.resource.type_name.clone(),
            prior: imported.state.clone(),
        });
        diagnostics.extend(read.diagnostics);
        if diagnostics.has_errors() {
            return diagnostics;
        }
        match read.new_state {
            Some(state) => {
                self.write_object(addr, provider_addr, Some(state.clone()));
                for hook in &self.context.hooks {
                    hook.post_import(addr, &state);
                }
            }
            None => diagnostics.push(Diagnostic::error(
                "Cannot import non-existent remote object",
                format!(
                    "While attempting to import an existing object to {addr}, the provider detected that no object exists with the given id."
                ),
            )),
        }
        diagnostics
    }

    // Providers

    fn visit_provider(&self, node: &ProviderNode) -> Diagnostics {
        let body = node.config.as_ref().map(|block| &block.body);
        if self.operation == Operation::Validate {
            let schema = self.context.schemas.provider_config(&node.addr.provider);
            return match (body, schema) {
                (Some(body), Some(schema)) => validate_body(body, schema).at(&node.addr),
                _ => Diagnostics::new(),
            };
        }

        let provider = match self.context.providers.instantiate(&node.addr.provider) {
            Ok(provider) => provider,
            Err(error) => {
                return Diagnostic::error("Failed to instantiate provider", error.to_string())
                    .at(&node.addr)
                    .into();
            }
        };
        let config = match body {
            Some(body) => self.context.evaluator.evaluate_body(&node.addr.module, body),
            None => Ok(Value::Object(serde_json::Map::new())),
        };
        let config = match config {
            Ok(config) => config,
            Err(mut diagnostics) => {
                diagnostics.extend(provider.close());
                return diagnostics.at(&node.addr);
            }
        };

        let mut diagnostics = provider.configure(&ConfigureRequest { config });
        if diagnostics.has_errors() {
            diagnostics.extend(provider.close());
            return diagnostics.at(&node.addr);
        }
        tracing::debug!(provider = %node.addr, "provider configured");
        lock(&self.providers).insert(node.addr.clone(), provider);
        diagnostics.at(&node.addr)
    }

    fn visit_close(&self, key: &NodeKey, addr: &AbsProviderConfig) -> Result<Diagnostics, WalkError> {
        let Some(provider) = lock(&self.providers).remove(addr) else {
            return Err(WalkError::Invariant {
                vertex: key.to_string(),
                message: format!("no open handle for {addr}"),
            });
        };
        tracing::debug!(provider = %addr, "closing provider");
        Ok(provider.close().at(addr))
    }

    // Structure and named values

    fn visit_boundary(&self, module: &ModuleInstance) -> Diagnostics {
        if self.operation != Operation::Apply {
            return Diagnostics::new();
        }
        let Some(module_config) = module_instance_config(&self.context.config, module) else {
            return Diagnostics::new();
        };
        let mut state = lock(&self.state);
        let recorded: Vec<Resource> = state
            .module(module)
            .map(|module_state| module_state.resources.keys().cloned().collect())
            .unwrap_or_default();
        for resource in recorded {
            let Some(config) = module_config.resource(&resource) else {
                continue;
            };
            let addr = resource.absolute(module.clone());
            if state.fix_each_mode(&addr, config.each_mode()) {
                tracing::debug!(address = %addr, mode = ?config.each_mode(), "rekeyed instances");
            }
        }
        Diagnostics::new()
    }

    fn visit_variable(&self, node: &VariableNode) -> Diagnostics {
        let diagnostics = match (&node.argument, &node.config.default) {
            (Some(argument), _) => {
                let scope = node.module.parent().unwrap_or_default();
                match self.context.evaluator.evaluate_expr(&scope, argument) {
                    Ok(_) => Diagnostics::new(),
                    Err(diagnostics) => diagnostics,
                }
            }
            (None, Some(_)) => Diagnostics::new(),
            (None, None) if node.module.is_root() => Diagnostics::new(),
            (None, None) => Diagnostic::error(
                "No value for required variable",
                format!(
                    "The input variable \"{}\" is not set, and has no default value.",
                    node.config.name
                ),
            )
            .into(),
        };
        diagnostics.at(&NodeKey::variable(&node.module, &node.config.name))
    }

    fn visit_local(&self, node: &LocalNode) -> Diagnostics {
        match self.context.evaluator.evaluate_expr(&node.module, &node.config.expr) {
            Ok(_) => Diagnostics::new(),
            Err(diagnostics) => diagnostics.at(&NodeKey::local(&node.module, &node.config.name)),
        }
    }

    fn visit_output(&self, node: &OutputNode) -> Diagnostics {
        match self.context.evaluator.evaluate_expr(&node.module, &node.config.expr) {
            Ok(value) => {
                if self.operation != Operation::Validate {
                    lock(&self.state).set_output(&node.module, &node.config.name, value);
                }
                Diagnostics::new()
            }
            Err(diagnostics) => diagnostics.at(&NodeKey::output(&node.module, &node.config.name)),
        }
    }
}

impl Visitor for GraphWalker<'_> {
    fn visit(&self, key: &NodeKey, vertex: &Vertex) -> Result<Diagnostics, WalkError> {
        match vertex {
            Vertex::Resource(node) => self.visit_resource(key, node),
            Vertex::Provider(node) => Ok(self.visit_provider(node)),
            Vertex::ProviderClose(addr) => self.visit_close(key, addr),
            Vertex::CountBoundary(module) => Ok(self.visit_boundary(module)),
            Vertex::Variable(node) => Ok(self.visit_variable(node)),
            Vertex::Local(node) => Ok(self.visit_local(node)),
            Vertex::Output(node) => Ok(self.visit_output(node)),
            Vertex::Root => Ok(Diagnostics::new()),
        }
    }
}
