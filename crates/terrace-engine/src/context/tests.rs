#![allow(clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value, json};
use terrace_domain::{
    AbsProviderConfig, AbsResourceInstance, Action, AttributeSchema, AttributeType, BlockSchema,
    Body, Config, Diagnostic, Diagnostics, Expression, InstanceObject, ModuleConfig,
    ModuleInstance, ProviderSchema, ProviderType, Resource, ResourceChange, ResourceConfig,
    State, VertexStatus,
};

use super::{Context, Operation};
use crate::builder::GraphBuilder;
use crate::error::{ContextError, WalkError};
use crate::hooks::Hook;
use crate::import::ImportTarget;
use crate::node::{NodeKey, Vertex};
use crate::provider::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ConfigureRequest, GetSchemaResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    PlanResourceChangeRequest, PlanResourceChangeResponse, Provider, ProviderRegistry,
    ReadDataSourceRequest, ReadDataSourceResponse, ReadResourceRequest, ReadResourceResponse,
};

const PROVIDER_KEY: &str = r#"provider["registry.terraform.io/hashicorp/test"]"#;

/// An in-memory provider: remote objects live in a map keyed by id.
#[derive(Default)]
struct MockProvider {
    objects: Mutex<BTreeMap<String, Value>>,
    calls: Mutex<Vec<String>>,
    created: AtomicUsize,
    fail_configure: bool,
    fail_close: bool,
}

impl MockProvider {
    fn with_objects(objects: &[Value]) -> Self {
        let provider = Self::default();
        {
            let mut stored = provider.objects.lock().expect("objects lock");
            for object in objects {
                let id = object["id"].as_str().expect("object id").to_string();
                stored.insert(id, object.clone());
            }
        }
        provider
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().expect("calls lock").push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn object(&self, id: &str) -> Option<Value> {
        self.objects.lock().expect("objects lock").get(id).cloned()
    }

    fn object_count(&self) -> usize {
        self.objects.lock().expect("objects lock").len()
    }
}

fn thing_schema() -> BlockSchema {
    BlockSchema::default()
        .with_attribute("id", AttributeSchema::computed(AttributeType::String))
        .with_attribute("ami", AttributeSchema::optional(AttributeType::String))
        .with_attribute("image", AttributeSchema::optional(AttributeType::String))
}

fn id_of(value: &Value) -> Option<String> {
    value.get("id").and_then(Value::as_str).map(ToString::to_string)
}

impl Provider for MockProvider {
    fn get_schema(&self) -> GetSchemaResponse {
        let mut schema = ProviderSchema {
            provider: BlockSchema::default()
                .with_attribute("region", AttributeSchema::optional(AttributeType::String)),
            ..ProviderSchema::default()
        };
        schema
            .resource_types
            .insert("test_thing".to_string(), thing_schema());
        schema.data_sources.insert(
            "test_data".to_string(),
            BlockSchema::default()
                .with_attribute("name", AttributeSchema::optional(AttributeType::String)),
        );
        GetSchemaResponse {
            schema,
            diagnostics: Diagnostics::new(),
        }
    }

    fn configure(&self, _request: &ConfigureRequest) -> Diagnostics {
        self.record("configure");
        if self.fail_configure {
            return Diagnostic::error("Invalid credentials", "the test provider refused").into();
        }
        Diagnostics::new()
    }

    fn read_resource(&self, request: &ReadResourceRequest) -> ReadResourceResponse {
        self.record(format!("read {}", request.type_name));
        ReadResourceResponse {
            new_state: id_of(&request.prior).and_then(|id| self.object(&id)),
            diagnostics: Diagnostics::new(),
        }
    }

    fn plan_resource_change(
        &self,
        request: &PlanResourceChangeRequest,
    ) -> PlanResourceChangeResponse {
        self.record(format!("plan {}", request.type_name));
        let mut planned = request
            .config
            .as_object()
            .cloned()
            .unwrap_or_else(Map::new);
        let requires_replace = match &request.prior {
            Some(prior) if prior.get("image") != planned.get("image") => vec!["image".to_string()],
            _ => Vec::new(),
        };
        let kept_id = request
            .prior
            .as_ref()
            .and_then(id_of)
            .filter(|_| requires_replace.is_empty());
        planned.insert(
            "id".to_string(),
            kept_id.map_or(Value::Null, Value::String),
        );
        PlanResourceChangeResponse {
            planned: Value::Object(planned),
            requires_replace,
            diagnostics: Diagnostics::new(),
        }
    }

    fn apply_resource_change(
        &self,
        request: &ApplyResourceChangeRequest,
    ) -> ApplyResourceChangeResponse {
        let Some(planned) = &request.planned else {
            self.record(format!("delete {}", request.type_name));
            if let Some(id) = request.prior.as_ref().and_then(id_of) {
                self.objects.lock().expect("objects lock").remove(&id);
            }
            return ApplyResourceChangeResponse::default();
        };

        self.record(format!("apply {}", request.type_name));
        let mut object = planned.clone();
        let id = match id_of(&object) {
            Some(id) => id,
            None => {
                let number = self.created.fetch_add(1, Ordering::SeqCst) + 1;
                format!("{}-{number}", request.type_name)
            }
        };
        object["id"] = Value::String(id.clone());
        self.objects
            .lock()
            .expect("objects lock")
            .insert(id, object.clone());
        ApplyResourceChangeResponse {
            new_state: Some(object),
            diagnostics: Diagnostics::new(),
        }
    }

    fn read_data_source(&self, request: &ReadDataSourceRequest) -> ReadDataSourceResponse {
        self.record(format!("read data {}", request.type_name));
        let mut state = request.config.clone();
        state["id"] = json!("data-1");
        ReadDataSourceResponse {
            state,
            diagnostics: Diagnostics::new(),
        }
    }

    fn import_resource_state(
        &self,
        request: &ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        self.record(format!("import {}", request.type_name));
        ImportResourceStateResponse {
            imported: vec![ImportedResource {
                type_name: request.type_name.clone(),
                state: json!({ "id": request.id }),
            }],
            diagnostics: Diagnostics::new(),
        }
    }

    fn close(&self) -> Diagnostics {
        self.record("close");
        if self.fail_close {
            return Diagnostic::error("Provider shutdown failed", "the plugin did not exit").into();
        }
        Diagnostics::new()
    }
}

#[derive(Default)]
struct RecordingHook {
    events: Mutex<Vec<String>>,
}

impl RecordingHook {
    fn events(&self) -> Vec<String> {
        let mut events = self.events.lock().expect("events lock").clone();
        events.sort();
        events
    }

    fn push(&self, event: String) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl Hook for RecordingHook {
    fn post_plan(&self, change: &ResourceChange) {
        self.push(format!("plan {} {:?}", change.addr, change.action));
    }

    fn post_apply(&self, change: &ResourceChange, diagnostics: &Diagnostics) {
        self.push(format!("apply {} errors={}", change.addr, diagnostics.has_errors()));
    }

    fn post_import(&self, addr: &AbsResourceInstance, _state: &Value) {
        self.push(format!("import {addr}"));
    }
}

fn test_provider() -> ProviderType {
    ProviderType::default_for("test")
}

fn provider_addr() -> AbsProviderConfig {
    AbsProviderConfig::new(ModuleInstance::root(), test_provider(), None)
}

fn context_with(config: Config, provider: &Arc<MockProvider>) -> Context {
    let handle: Arc<dyn Provider> = Arc::clone(provider) as Arc<dyn Provider>;
    let registry = ProviderRegistry::default().with_fixed(test_provider(), handle);
    Context::new(config, registry).expect("context")
}

fn thing(name: &str, attributes: &[(&str, &str)]) -> ResourceConfig {
    let mut config = ResourceConfig::new(Resource::managed("test_thing", name));
    for (attribute, value) in attributes {
        config.body = config
            .body
            .with_attribute(attribute, Expression::literal(json!(value)));
    }
    config
}

fn config_of(resources: Vec<ResourceConfig>) -> Config {
    let mut module = ModuleConfig::default();
    module.resources = resources;
    Config::new(module)
}

fn addr(raw: &str) -> AbsResourceInstance {
    raw.parse().expect("instance address")
}

fn state_of(instances: &[(&str, Value)]) -> State {
    let mut state = State::default();
    for (raw, value) in instances {
        state.set_instance(&addr(raw), &provider_addr(), InstanceObject::ready(value.clone()));
    }
    state
}

fn summaries(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics
        .iter()
        .map(|diagnostic| diagnostic.summary.clone())
        .collect()
}

#[test]
fn validate_reports_schema_errors_without_configuring() {
    let provider = Arc::new(MockProvider::default());
    let config = config_of(vec![thing("a", &[("ami", "a"), ("bogus", "x")])]);
    let context = context_with(config, &provider);

    let summary = context.validate().expect("validate");

    let errors: Vec<_> = summary.diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].summary, "Unsupported argument");
    assert_eq!(errors[0].address.as_deref(), Some("test_thing.a"));
    assert!(!provider.calls().contains(&"configure".to_string()));
}

#[test]
fn plan_creates_missing_instances() {
    let provider = Arc::new(MockProvider::default());
    let mut counted = thing("many", &[("ami", "a")]);
    counted.count = Some(Expression::literal(json!(2)));
    let config = config_of(vec![thing("a", &[("ami", "a")]), counted]);
    let context = context_with(config, &provider);

    let outcome = context.plan(&State::default(), &[], &[]).expect("plan");

    assert!(outcome.summary.diagnostics.is_empty());
    let actions: Vec<(String, Action)> = outcome
        .plan
        .changes
        .iter()
        .map(|change| (change.addr.to_string(), change.action))
        .collect();
    assert_eq!(
        actions,
        vec![
            ("test_thing.a".to_string(), Action::Create),
            ("test_thing.many[0]".to_string(), Action::Create),
            ("test_thing.many[1]".to_string(), Action::Create),
        ]
    );
    assert_eq!(provider.object_count(), 0);
}

#[test]
fn plan_compares_refreshed_objects_with_configuration() {
    let same = json!({ "id": "i-1", "ami": "a", "image": "x" });
    let changed = json!({ "id": "i-2", "ami": "old", "image": "x" });
    let replaced = json!({ "id": "i-3", "ami": "a", "image": "old" });
    let provider = Arc::new(MockProvider::with_objects(&[
        same.clone(),
        changed.clone(),
        replaced.clone(),
    ]));
    let config = config_of(vec![
        thing("same", &[("ami", "a"), ("image", "x")]),
        thing("changed", &[("ami", "new"), ("image", "x")]),
        thing("replaced", &[("ami", "a"), ("image", "new")]),
    ]);
    let state = state_of(&[
        ("test_thing.same", same),
        ("test_thing.changed", changed),
        ("test_thing.replaced", replaced),
    ]);
    let context = context_with(config, &provider);

    let outcome = context.plan(&state, &[], &[]).expect("plan");

    let action = |raw: &str| {
        outcome
            .plan
            .changes
            .get(&addr(raw))
            .map(|change| change.action)
    };
    assert_eq!(action("test_thing.same"), Some(Action::NoOp));
    assert_eq!(action("test_thing.changed"), Some(Action::Update));
    assert_eq!(action("test_thing.replaced"), Some(Action::Replace));
}

#[test]
fn plan_deletes_instances_removed_from_configuration() {
    let gone = json!({ "id": "i-1", "ami": "a" });
    let provider = Arc::new(MockProvider::with_objects(&[gone.clone()]));
    let config = config_of(vec![thing("kept", &[("ami", "a")])]);
    let state = state_of(&[("test_thing.gone", gone)]);
    let context = context_with(config, &provider);

    let outcome = context.plan(&state, &[], &[]).expect("plan");

    let change = outcome
        .plan
        .changes
        .get(&addr("test_thing.gone"))
        .expect("orphan change");
    assert_eq!(change.action, Action::Delete);
    assert_eq!(change.after, Value::Null);
    assert_eq!(
        outcome.summary.status("test_thing.gone (orphan)"),
        Some(VertexStatus::Done)
    );
}

#[test]
fn plan_reads_data_sources() {
    let provider = Arc::new(MockProvider::default());
    let mut data = ResourceConfig::new(Resource::data("test_data", "info"));
    data.body = Body::default().with_attribute("name", Expression::literal(json!("web")));
    let context = context_with(config_of(vec![data]), &provider);

    let outcome = context.plan(&State::default(), &[], &[]).expect("plan");

    let change = outcome
        .plan
        .changes
        .get(&addr("data.test_data.info"))
        .expect("data change");
    assert_eq!(change.action, Action::Read);
    assert_eq!(change.after, json!({ "id": "data-1", "name": "web" }));
    assert!(
        outcome
            .plan
            .prior_state
            .instance(&addr("data.test_data.info"))
            .is_some()
    );
}

#[test]
fn apply_creates_objects_and_records_them() {
    let provider = Arc::new(MockProvider::default());
    let config = config_of(vec![thing("a", &[("ami", "a")])]);
    let context = context_with(config, &provider);

    let planned = context.plan(&State::default(), &[], &[]).expect("plan");
    let applied = context.apply(&planned.plan).expect("apply");

    assert!(applied.summary.diagnostics.is_empty());
    let object = applied
        .state
        .instance(&addr("test_thing.a"))
        .expect("created instance");
    assert_eq!(object.value["ami"], json!("a"));
    assert_eq!(object.value["id"], json!("test_thing-1"));
    assert_eq!(provider.object_count(), 1);

    let replanned = context.plan(&applied.state, &[], &[]).expect("replan");
    assert!(!replanned.plan.changes.has_changes());
}

#[test]
fn apply_destroys_orphans_and_replaces_objects() {
    let gone = json!({ "id": "i-1", "ami": "a" });
    let replaced = json!({ "id": "i-2", "ami": "a", "image": "old" });
    let provider = Arc::new(MockProvider::with_objects(&[gone.clone(), replaced.clone()]));
    let config = config_of(vec![thing("replaced", &[("ami", "a"), ("image", "new")])]);
    let state = state_of(&[("test_thing.gone", gone), ("test_thing.replaced", replaced)]);
    let context = context_with(config, &provider);

    let planned = context.plan(&state, &[], &[]).expect("plan");
    let applied = context.apply(&planned.plan).expect("apply");

    assert!(applied.summary.diagnostics.is_empty());
    assert!(applied.state.instance(&addr("test_thing.gone")).is_none());
    assert!(provider.object("i-1").is_none());
    assert!(provider.object("i-2").is_none());
    let object = applied
        .state
        .instance(&addr("test_thing.replaced"))
        .expect("replacement");
    assert_eq!(object.value["image"], json!("new"));
    assert_eq!(object.value["id"], json!("test_thing-1"));
}

#[test]
fn refresh_forgets_objects_that_no_longer_exist() {
    let kept = json!({ "id": "i-1", "ami": "a" });
    let provider = Arc::new(MockProvider::with_objects(&[kept.clone()]));
    let config = config_of(vec![thing("kept", &[("ami", "a")]), thing("vanished", &[])]);
    let state = state_of(&[
        ("test_thing.kept", kept.clone()),
        ("test_thing.vanished", json!({ "id": "i-9" })),
    ]);
    let context = context_with(config, &provider);

    let outcome = context.refresh(&state).expect("refresh");

    assert!(outcome.summary.diagnostics.is_empty());
    assert_eq!(
        outcome
            .state
            .instance(&addr("test_thing.kept"))
            .map(|object| object.value.clone()),
        Some(kept)
    );
    assert!(outcome.state.instance(&addr("test_thing.vanished")).is_none());
}

#[test]
fn import_adopts_existing_objects() {
    let existing = json!({ "id": "i-1", "ami": "a" });
    let provider = Arc::new(MockProvider::with_objects(&[existing.clone()]));
    let hook = Arc::new(RecordingHook::default());
    let config = config_of(vec![thing("a", &[("ami", "a")]), thing("b", &[])]);
    let context = context_with(config.clone(), &provider).with_hook(hook.clone());
    let target = ImportTarget::parse(&config, "test_thing.a", "i-1").expect("import target");

    let outcome = context
        .import(&State::default(), vec![target])
        .expect("import");

    assert!(outcome.summary.diagnostics.is_empty());
    assert_eq!(
        outcome
            .state
            .instance(&addr("test_thing.a"))
            .map(|object| object.value.clone()),
        Some(existing)
    );
    assert!(outcome.state.instance(&addr("test_thing.b")).is_none());
    assert_eq!(hook.events(), vec!["import test_thing.a".to_string()]);
}

#[test]
fn import_refuses_instances_already_in_state() {
    let existing = json!({ "id": "i-1", "ami": "a" });
    let provider = Arc::new(MockProvider::with_objects(&[existing.clone()]));
    let config = config_of(vec![thing("a", &[("ami", "a")])]);
    let state = state_of(&[("test_thing.a", existing)]);
    let context = context_with(config.clone(), &provider);
    let target = ImportTarget::parse(&config, "test_thing.a", "i-1").expect("import target");

    let outcome = context.import(&state, vec![target]).expect("import");

    assert_eq!(
        summaries(&outcome.summary.diagnostics),
        vec!["Resource already managed".to_string()]
    );
    assert!(!provider.calls().contains(&"import test_thing".to_string()));
}

#[test]
fn import_of_missing_objects_fails() {
    let provider = Arc::new(MockProvider::default());
    let config = config_of(vec![thing("a", &[])]);
    let context = context_with(config.clone(), &provider);
    let target = ImportTarget::parse(&config, "test_thing.a", "i-404").expect("import target");

    let outcome = context
        .import(&State::default(), vec![target])
        .expect("import");

    assert_eq!(
        summaries(&outcome.summary.diagnostics),
        vec!["Cannot import non-existent remote object".to_string()]
    );
    assert!(outcome.state.instance(&addr("test_thing.a")).is_none());
}

#[test]
fn adding_count_moves_the_existing_object_to_index_zero() {
    let existing = json!({ "id": "i-1", "ami": "a" });
    let provider = Arc::new(MockProvider::with_objects(&[existing.clone()]));
    let mut counted = thing("a", &[("ami", "a")]);
    counted.count = Some(Expression::literal(json!(1)));
    let state = state_of(&[("test_thing.a", existing.clone())]);
    let context = context_with(config_of(vec![counted]), &provider);

    let planned = context.plan(&state, &[], &[]).expect("plan");

    assert!(
        planned
            .plan
            .changes
            .iter()
            .all(|change| change.action == Action::NoOp)
    );
    assert_eq!(
        planned
            .plan
            .changes
            .get(&addr("test_thing.a[0]"))
            .map(|change| change.action),
        Some(Action::NoOp)
    );

    let applied = context.apply(&planned.plan).expect("apply");

    assert!(applied.summary.diagnostics.is_empty());
    assert!(applied.state.instance(&addr("test_thing.a")).is_none());
    assert_eq!(
        applied
            .state
            .instance(&addr("test_thing.a[0]"))
            .map(|object| object.value.clone()),
        Some(existing)
    );
    assert_eq!(provider.object_count(), 1);
}

#[test]
fn provider_configure_failures_skip_dependent_resources() {
    let provider = Arc::new(MockProvider {
        fail_configure: true,
        ..MockProvider::default()
    });
    let context = context_with(config_of(vec![thing("a", &[("ami", "a")])]), &provider);

    let outcome = context.plan(&State::default(), &[], &[]).expect("plan");

    assert_eq!(
        outcome.summary.status(PROVIDER_KEY),
        Some(VertexStatus::Failed)
    );
    assert_eq!(
        outcome.summary.status("test_thing.a"),
        Some(VertexStatus::Skipped)
    );
    assert_eq!(
        summaries(&outcome.summary.diagnostics),
        vec!["Invalid credentials".to_string()]
    );
    assert!(outcome.plan.changes.resources.is_empty());
    assert!(
        !provider
            .calls()
            .iter()
            .any(|call| call.starts_with("plan "))
    );
    assert_eq!(
        provider.calls().last().map(String::as_str),
        Some("close")
    );
}

#[test]
fn providers_are_closed_after_their_consumers() {
    let provider = Arc::new(MockProvider::default());
    let context = context_with(config_of(vec![thing("a", &[("ami", "a")])]), &provider);

    let outcome = context.plan(&State::default(), &[], &[]).expect("plan");

    assert_eq!(
        outcome.summary.status(&format!("{PROVIDER_KEY} (close)")),
        Some(VertexStatus::Done)
    );
    // Loading schemas in Context::new closes the provider once.
    assert_eq!(
        provider.calls()[1..].to_vec(),
        vec![
            "configure".to_string(),
            "plan test_thing".to_string(),
            "close".to_string(),
        ]
    );
}

#[test]
fn hooks_observe_plans_and_applies() {
    let provider = Arc::new(MockProvider::default());
    let hook = Arc::new(RecordingHook::default());
    let context = context_with(config_of(vec![thing("a", &[("ami", "a")])]), &provider)
        .with_hook(hook.clone());

    let planned = context.plan(&State::default(), &[], &[]).expect("plan");
    context.apply(&planned.plan).expect("apply");

    assert_eq!(
        hook.events(),
        vec![
            "apply test_thing.a errors=false".to_string(),
            "plan test_thing.a Create".to_string(),
        ]
    );
}

#[test]
fn close_failures_are_reported_with_the_configure_failure() {
    let provider = Arc::new(MockProvider {
        fail_configure: true,
        fail_close: true,
        ..MockProvider::default()
    });
    let context = context_with(config_of(vec![thing("a", &[("ami", "a")])]), &provider);

    let outcome = context.plan(&State::default(), &[], &[]).expect("plan");

    let mut reported = summaries(&outcome.summary.diagnostics);
    reported.sort();
    assert_eq!(
        reported,
        vec![
            "Invalid credentials".to_string(),
            "Provider shutdown failed".to_string(),
        ]
    );
}

#[test]
fn aborted_walks_still_close_open_providers() {
    let provider = Arc::new(MockProvider::default());
    let context = context_with(config_of(vec![thing("a", &[("ami", "a")])]), &provider);
    let mut graph = GraphBuilder::plan(context.config(), &State::default(), context.schemas())
        .build(&ModuleInstance::root())
        .expect("plan graph");
    let resource = NodeKey::resource(
        &Resource::managed("test_thing", "a").absolute(ModuleInstance::root()),
    );
    if let Some(Vertex::Resource(node)) = graph.vertex_mut(&resource) {
        node.resolved_provider = None;
    }

    let error = context
        .run(&graph, Operation::Plan, State::default(), None)
        .expect_err("walk must abort");

    assert!(matches!(
        error,
        ContextError::Walk(WalkError::Invariant { .. })
    ));
    // Loading schemas in Context::new closes the provider once.
    assert_eq!(
        provider.calls()[1..].to_vec(),
        vec!["configure".to_string(), "close".to_string()]
    );
}
