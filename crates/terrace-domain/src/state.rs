use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addrs::{
    AbsProviderConfig, AbsResource, AbsResourceInstance, EachMode, InstanceKey, ModuleInstance,
    Resource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    #[default]
    Ready,
    Tainted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceObject {
    pub value: Value,
    #[serde(default)]
    pub status: ObjectStatus,
}

impl InstanceObject {
    #[must_use]
    pub const fn ready(value: Value) -> Self {
        Self {
            value,
            status: ObjectStatus::Ready,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub provider: AbsProviderConfig,
    #[serde(default)]
    pub instances: BTreeMap<InstanceKey, InstanceObject>,
}

impl ResourceState {
    /// The expansion shape recorded in state, derived from the instance keys.
    #[must_use]
    pub fn each_mode(&self) -> Option<EachMode> {
        self.instances.keys().next().map(InstanceKey::each_mode)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    #[serde(default)]
    pub resources: BTreeMap<Resource, ResourceState>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

/// Previously recorded objects, keyed by module instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub modules: BTreeMap<ModuleInstance, ModuleState>,
}

impl State {
    #[must_use]
    pub fn module(&self, path: &ModuleInstance) -> Option<&ModuleState> {
        self.modules.get(path)
    }

    #[must_use]
    pub fn resource(&self, addr: &AbsResource) -> Option<&ResourceState> {
        self.modules.get(&addr.module)?.resources.get(&addr.resource)
    }

    #[must_use]
    pub fn instance(&self, addr: &AbsResourceInstance) -> Option<&InstanceObject> {
        self.resource(&addr.containing_resource())?
            .instances
            .get(&addr.key)
    }

    /// Every recorded instance at or below `path`.
    pub fn instances_within<'a>(
        &'a self,
        path: &'a ModuleInstance,
    ) -> impl Iterator<Item = (AbsResourceInstance, &'a ResourceState)> + 'a {
        self.modules
            .iter()
            .filter(move |(module, _)| module.has_prefix(path))
            .flat_map(|(module, state)| {
                state.resources.iter().flat_map(move |(resource, resource_state)| {
                    resource_state.instances.keys().map(move |key| {
                        (
                            AbsResourceInstance {
                                module: module.clone(),
                                resource: resource.clone(),
                                key: key.clone(),
                            },
                            resource_state,
                        )
                    })
                })
            })
    }

    pub fn set_instance(
        &mut self,
        addr: &AbsResourceInstance,
        provider: &AbsProviderConfig,
        object: InstanceObject,
    ) {
        let resource = self
            .modules
            .entry(addr.module.clone())
            .or_default()
            .resources
            .entry(addr.resource.clone())
            .or_insert_with(|| ResourceState {
                provider: provider.clone(),
                instances: BTreeMap::new(),
            });
        resource.provider = provider.clone();
        resource.instances.insert(addr.key.clone(), object);
    }

    /// Remove one instance; empty resources and modules are dropped too.
    pub fn remove_instance(&mut self, addr: &AbsResourceInstance) -> Option<InstanceObject> {
        let module = self.modules.get_mut(&addr.module)?;
        let resource = module.resources.get_mut(&addr.resource)?;
        let removed = resource.instances.remove(&addr.key);
        if resource.instances.is_empty() {
            module.resources.remove(&addr.resource);
        }
        if module.resources.is_empty() && module.outputs.is_empty() {
            self.modules.remove(&addr.module);
        }
        removed
    }

    pub fn set_output(&mut self, module: &ModuleInstance, name: &str, value: Value) {
        self.modules
            .entry(module.clone())
            .or_default()
            .outputs
            .insert(name.to_string(), value);
    }

    /// Rewrite instance keys of a resource to match a new expansion mode.
    ///
    /// Only the unambiguous transitions are handled: a lone `NoKey` instance
    /// becomes `[0]` under `count`, and a lone `[0]` becomes `NoKey` when
    /// `count` is removed. Returns whether anything changed.
    pub fn fix_each_mode(&mut self, addr: &AbsResource, mode: EachMode) -> bool {
        let Some(resource) = self
            .modules
            .get_mut(&addr.module)
            .and_then(|module| module.resources.get_mut(&addr.resource))
        else {
            return false;
        };

        let (from, to) = match mode {
            EachMode::Count => (InstanceKey::NoKey, InstanceKey::Int(0)),
            EachMode::Single => (InstanceKey::Int(0), InstanceKey::NoKey),
            EachMode::ForEach => return false,
        };
        if resource.instances.contains_key(&to) {
            return false;
        }
        match resource.instances.remove(&from) {
            Some(object) => {
                resource.instances.insert(to, object);
                true
            }
            None => false,
        }
    }
}
