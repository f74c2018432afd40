use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use terrace_domain::{
    AbsProviderConfig, AbsResource, AbsResourceInstance, EachMode, Expression, InstanceKey,
    LocalConfig, LocalProviderConfig, ModuleInstance, OutputConfig, ProviderConfigBlock,
    ProviderType, ResourceConfig, VariableConfig, VertexKind, join_module,
};

pub const ROOT_NAME: &str = "root";
pub const COUNT_BOUNDARY_NAME: &str = "meta.count-boundary (EachMode fixup)";

/// Stable identity of a vertex: its rendered address. Ordering is lexical,
/// which is also the order vertices appear in listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct NodeKey(String);

impl NodeKey {
    #[must_use]
    pub fn resource(addr: &AbsResource) -> Self {
        Self(addr.to_string())
    }

    #[must_use]
    pub fn orphan(addr: &AbsResourceInstance) -> Self {
        Self(format!("{addr} (orphan)"))
    }

    /// A prior instance whose resource is still configured with another shape.
    #[must_use]
    pub fn prior(addr: &AbsResourceInstance) -> Self {
        Self(format!("{addr} (prior)"))
    }

    #[must_use]
    pub fn provider(addr: &AbsProviderConfig) -> Self {
        Self(addr.to_string())
    }

    #[must_use]
    pub fn provider_close(addr: &AbsProviderConfig) -> Self {
        Self(format!("{addr} (close)"))
    }

    #[must_use]
    pub fn count_boundary(module: &ModuleInstance) -> Self {
        Self(join_module(module, COUNT_BOUNDARY_NAME))
    }

    #[must_use]
    pub fn variable(module: &ModuleInstance, name: &str) -> Self {
        Self(join_module(module, &format!("var.{name}")))
    }

    #[must_use]
    pub fn local(module: &ModuleInstance, name: &str) -> Self {
        Self(join_module(module, &format!("local.{name}")))
    }

    #[must_use]
    pub fn output(module: &ModuleInstance, name: &str) -> Self {
        Self(join_module(module, &format!("output.{name}")))
    }

    #[must_use]
    pub fn root() -> Self {
        Self(ROOT_NAME.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<NodeKey> for String {
    fn from(value: NodeKey) -> Self {
        value.0
    }
}

/// A managed or data resource.
///
/// Configured resources are one vertex per resource (`key` is `None`) and
/// expand into instances at walk time. Instances known only from prior
/// state get a vertex of their own with `key` set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub addr: AbsResource,
    pub key: Option<InstanceKey>,
    pub config: Option<ResourceConfig>,
    pub provider_type: ProviderType,
    pub requirement: LocalProviderConfig,
    pub stored_provider: Option<AbsProviderConfig>,
    pub resolved_provider: Option<AbsProviderConfig>,
    pub destroy: bool,
    pub import_ids: BTreeMap<InstanceKey, String>,
}

impl ResourceNode {
    #[must_use]
    pub fn configured(
        addr: AbsResource,
        config: ResourceConfig,
        provider_type: ProviderType,
    ) -> Self {
        let requirement = config.provider_config();
        Self {
            addr,
            key: None,
            config: Some(config),
            provider_type,
            requirement,
            stored_provider: None,
            resolved_provider: None,
            destroy: false,
            import_ids: BTreeMap::new(),
        }
    }

    /// A prior-state instance with no configuration: destroyed on apply.
    #[must_use]
    pub fn orphan(addr: &AbsResourceInstance, stored_provider: AbsProviderConfig) -> Self {
        Self {
            addr: addr.containing_resource(),
            key: Some(addr.key.clone()),
            config: None,
            provider_type: stored_provider.provider.clone(),
            requirement: LocalProviderConfig::new(
                &stored_provider.provider.type_name,
                stored_provider.alias.as_deref(),
            ),
            stored_provider: Some(stored_provider),
            resolved_provider: None,
            destroy: true,
            import_ids: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn module(&self) -> &ModuleInstance {
        &self.addr.module
    }

    /// The state instance this vertex stands for, when it is not a
    /// configured resource.
    #[must_use]
    pub fn instance(&self) -> Option<AbsResourceInstance> {
        self.key.clone().map(|key| self.addr.instance(key))
    }

    #[must_use]
    pub fn each_mode(&self) -> EachMode {
        match (&self.config, &self.key) {
            (Some(config), _) => config.each_mode(),
            (None, Some(key)) => key.each_mode(),
            (None, None) => EachMode::Single,
        }
    }

    #[must_use]
    pub const fn is_orphan(&self) -> bool {
        self.config.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderNode {
    pub addr: AbsProviderConfig,
    /// `None` for implied, empty configurations.
    pub config: Option<ProviderConfigBlock>,
    pub consumers: BTreeSet<NodeKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub module: ModuleInstance,
    pub config: VariableConfig,
    /// The module call argument, evaluated in the parent module.
    pub argument: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalNode {
    pub module: ModuleInstance,
    pub config: LocalConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputNode {
    pub module: ModuleInstance,
    pub config: OutputConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Vertex {
    Resource(ResourceNode),
    Provider(ProviderNode),
    ProviderClose(AbsProviderConfig),
    CountBoundary(ModuleInstance),
    Variable(VariableNode),
    Local(LocalNode),
    Output(OutputNode),
    Root,
}

impl Vertex {
    #[must_use]
    pub fn key(&self) -> NodeKey {
        match self {
            Self::Resource(node) => match node.instance() {
                Some(addr) if node.is_orphan() => NodeKey::orphan(&addr),
                Some(addr) => NodeKey::prior(&addr),
                None => NodeKey::resource(&node.addr),
            },
            Self::Provider(node) => NodeKey::provider(&node.addr),
            Self::ProviderClose(addr) => NodeKey::provider_close(addr),
            Self::CountBoundary(module) => NodeKey::count_boundary(module),
            Self::Variable(node) => NodeKey::variable(&node.module, &node.config.name),
            Self::Local(node) => NodeKey::local(&node.module, &node.config.name),
            Self::Output(node) => NodeKey::output(&node.module, &node.config.name),
            Self::Root => NodeKey::root(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> VertexKind {
        match self {
            Self::Resource(node) if node.is_orphan() => VertexKind::Orphan,
            Self::Resource(_) => VertexKind::Resource,
            Self::Provider(_) => VertexKind::Provider,
            Self::ProviderClose(_) => VertexKind::ProviderClose,
            Self::CountBoundary(_) => VertexKind::CountBoundary,
            Self::Variable(_) => VertexKind::Variable,
            Self::Local(_) => VertexKind::Local,
            Self::Output(_) => VertexKind::Output,
            Self::Root => VertexKind::Root,
        }
    }

    /// The module instance the vertex belongs to; `None` for the root.
    #[must_use]
    pub fn module(&self) -> Option<&ModuleInstance> {
        match self {
            Self::Resource(node) => Some(node.module()),
            Self::Provider(node) => Some(&node.addr.module),
            Self::ProviderClose(addr) => Some(&addr.module),
            Self::CountBoundary(module) => Some(module),
            Self::Variable(node) => Some(&node.module),
            Self::Local(node) => Some(&node.module),
            Self::Output(node) => Some(&node.module),
            Self::Root => None,
        }
    }

    /// Vertices added by the builder rather than declared by configuration.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::ProviderClose(_) | Self::CountBoundary(_) | Self::Root
        )
    }

    #[must_use]
    pub const fn as_resource(&self) -> Option<&ResourceNode> {
        match self {
            Self::Resource(node) => Some(node),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_provider(&self) -> Option<&ProviderNode> {
        match self {
            Self::Provider(node) => Some(node),
            _ => None,
        }
    }
}
