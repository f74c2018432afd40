use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addrs::{EachMode, InstanceKey, LocalProviderConfig, Module, ProviderType, Resource};

/// An expression as handed over by the configuration parser.
///
/// Evaluation is not performed here: `traversals` lists the raw references
/// (`aws_instance.web.id`, `var.region`) and `value` carries the literal
/// result when it is already known.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Expression {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traversals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Expression {
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Self {
            traversals: Vec::new(),
            value: Some(value),
        }
    }

    #[must_use]
    pub fn refs<I, S>(traversals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            traversals: traversals.into_iter().map(Into::into).collect(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Expression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl Body {
    #[must_use]
    pub fn with_attribute(mut self, name: &str, expr: Expression) -> Self {
        self.attributes.insert(name.to_string(), expr);
        self
    }

    #[must_use]
    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn blocks_of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks
            .iter()
            .filter(move |block| block.type_name == type_name)
    }
}

pub const DYNAMIC_BLOCK_TYPE: &str = "dynamic";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub body: Body,
}

impl Block {
    #[must_use]
    pub fn new(type_name: &str, body: Body) -> Self {
        Self {
            type_name: type_name.to_string(),
            labels: Vec::new(),
            body,
        }
    }

    /// A `dynamic "<name>" { for_each = ..., content { ... } }` block.
    #[must_use]
    pub fn dynamic(name: &str, for_each: Expression, content: Body) -> Self {
        Self {
            type_name: DYNAMIC_BLOCK_TYPE.to_string(),
            labels: vec![name.to_string()],
            body: Body::default()
                .with_attribute("for_each", for_each)
                .with_block(Self::new("content", content)),
        }
    }

    /// The generated block type name when this is a dynamic block.
    #[must_use]
    pub fn dynamic_target(&self) -> Option<&str> {
        if self.type_name == DYNAMIC_BLOCK_TYPE {
            self.labels.first().map(String::as_str)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub resource: Resource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<LocalProviderConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<Expression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub body: Body,
}

impl ResourceConfig {
    #[must_use]
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            provider: None,
            count: None,
            for_each: None,
            depends_on: Vec::new(),
            body: Body::default(),
        }
    }

    #[must_use]
    pub const fn each_mode(&self) -> EachMode {
        if self.count.is_some() {
            EachMode::Count
        } else if self.for_each.is_some() {
            EachMode::ForEach
        } else {
            EachMode::Single
        }
    }

    /// The provider configuration this resource asks for, explicit or implied.
    #[must_use]
    pub fn provider_config(&self) -> LocalProviderConfig {
        self.provider.clone().unwrap_or_else(|| {
            LocalProviderConfig::new(self.resource.implied_provider(), None)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfigBlock {
    pub local_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub body: Body,
}

impl ProviderConfigBlock {
    #[must_use]
    pub fn local_config(&self) -> LocalProviderConfig {
        LocalProviderConfig::new(&self.local_name, self.alias.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    pub name: String,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    pub expr: Expression,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Instance keys of a module call, as resolved by the configuration provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum ModuleExpansion {
    #[default]
    Single,
    Count(usize),
    ForEach(Vec<String>),
}

impl ModuleExpansion {
    #[must_use]
    pub fn keys(&self) -> Vec<InstanceKey> {
        match self {
            Self::Single => vec![InstanceKey::NoKey],
            Self::Count(count) => (0..*count)
                .map(|index| InstanceKey::Int(i64::try_from(index).unwrap_or(i64::MAX)))
                .collect(),
            Self::ForEach(keys) => keys.iter().cloned().map(InstanceKey::Str).collect(),
        }
    }
}

/// `providers = { aws = aws.west }` on a module call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassedProvider {
    pub in_child: LocalProviderConfig,
    pub in_parent: LocalProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCallConfig {
    pub name: String,
    #[serde(default)]
    pub instances: ModuleExpansion,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, Expression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<PassedProvider>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub module: ModuleConfig,
}

impl ModuleCallConfig {
    #[must_use]
    pub fn new(name: &str, module: ModuleConfig) -> Self {
        Self {
            name: name.to_string(),
            instances: ModuleExpansion::Single,
            arguments: BTreeMap::new(),
            providers: Vec::new(),
            depends_on: Vec::new(),
            module,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub required_providers: BTreeMap<String, ProviderType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderConfigBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<LocalConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub module_calls: Vec<ModuleCallConfig>,
}

impl ModuleConfig {
    #[must_use]
    pub fn resource(&self, resource: &Resource) -> Option<&ResourceConfig> {
        self.resources
            .iter()
            .find(|config| &config.resource == resource)
    }

    #[must_use]
    pub fn module_call(&self, name: &str) -> Option<&ModuleCallConfig> {
        self.module_calls.iter().find(|call| call.name == name)
    }

    #[must_use]
    pub fn provider_block(&self, local: &LocalProviderConfig) -> Option<&ProviderConfigBlock> {
        self.providers
            .iter()
            .find(|block| &block.local_config() == local)
    }

    /// Map a provider local name to its fully-qualified type.
    #[must_use]
    pub fn provider_type(&self, local_name: &str) -> ProviderType {
        self.required_providers
            .get(local_name)
            .cloned()
            .unwrap_or_else(|| ProviderType::default_for(local_name))
    }
}

/// The whole configuration tree, rooted at the root module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub root: ModuleConfig,
}

impl Config {
    #[must_use]
    pub const fn new(root: ModuleConfig) -> Self {
        Self { root }
    }

    /// The module configuration at a static path, if declared.
    #[must_use]
    pub fn descendant(&self, path: &Module) -> Option<&ModuleConfig> {
        let mut current = &self.root;
        for name in path.steps() {
            current = &current.module_call(name)?.module;
        }
        Some(current)
    }

    /// The module call that introduced `path`, with the caller's module.
    #[must_use]
    pub fn call_for(&self, path: &Module) -> Option<(&ModuleConfig, &ModuleCallConfig)> {
        let (last, parents) = path.steps().split_last()?;
        let parent = parents
            .iter()
            .try_fold(&self.root, |module, name| {
                module.module_call(name).map(|call| &call.module)
            })?;
        parent.module_call(last).map(|call| (parent, call))
    }
}
