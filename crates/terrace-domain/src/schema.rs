use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};

use crate::addrs::{ProviderType, Resource, ResourceMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "element", rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Bool,
    Dynamic,
    List(Box<AttributeType>),
    Set(Box<AttributeType>),
    Map(Box<AttributeType>),
    Object(BTreeMap<String, AttributeType>),
}

impl AttributeType {
    /// List, set or map of objects: the shapes that config may write with
    /// nested block syntax even though the schema declares an attribute.
    #[must_use]
    pub fn is_collection_of_objects(&self) -> bool {
        match self {
            Self::List(element) | Self::Set(element) | Self::Map(element) => {
                matches!(element.as_ref(), Self::Object(_))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    #[serde(rename = "type")]
    pub ty: AttributeType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
}

impl AttributeSchema {
    #[must_use]
    pub const fn optional(ty: AttributeType) -> Self {
        Self {
            ty,
            required: false,
            optional: true,
            computed: false,
        }
    }

    #[must_use]
    pub const fn required(ty: AttributeType) -> Self {
        Self {
            ty,
            required: true,
            optional: false,
            computed: false,
        }
    }

    #[must_use]
    pub const fn computed(ty: AttributeType) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    Single,
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedBlockSchema {
    pub nesting: NestingMode,
    #[serde(default)]
    pub block: BlockSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockSchema {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSchema>,
    #[serde(default)]
    pub block_types: BTreeMap<String, NestedBlockSchema>,
}

impl BlockSchema {
    #[must_use]
    pub fn with_attribute(mut self, name: &str, attribute: AttributeSchema) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    #[must_use]
    pub fn with_block_type(mut self, name: &str, nested: NestedBlockSchema) -> Self {
        self.block_types.insert(name.to_string(), nested);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderSchema {
    #[serde(default)]
    pub provider: BlockSchema,
    #[serde(default)]
    pub resource_types: BTreeMap<String, BlockSchema>,
    #[serde(default)]
    pub data_sources: BTreeMap<String, BlockSchema>,
}

impl ProviderSchema {
    #[must_use]
    pub fn schema_for(&self, resource: &Resource) -> Option<&BlockSchema> {
        match resource.mode {
            ResourceMode::Managed => self.resource_types.get(&resource.type_name),
            ResourceMode::Data => self.data_sources.get(&resource.type_name),
        }
    }
}

/// Schemas of every provider type the configuration may use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schemas(BTreeMap<ProviderType, ProviderSchema>);

impl Schemas {
    #[must_use]
    pub const fn new(providers: BTreeMap<ProviderType, ProviderSchema>) -> Self {
        Self(providers)
    }

    pub fn insert(&mut self, provider: ProviderType, schema: ProviderSchema) {
        self.0.insert(provider, schema);
    }

    #[must_use]
    pub fn provider(&self, provider: &ProviderType) -> Option<&ProviderSchema> {
        self.0.get(provider)
    }

    #[must_use]
    pub fn provider_config(&self, provider: &ProviderType) -> Option<&BlockSchema> {
        self.0.get(provider).map(|schema| &schema.provider)
    }

    #[must_use]
    pub fn resource(&self, provider: &ProviderType, resource: &Resource) -> Option<&BlockSchema> {
        self.0.get(provider)?.schema_for(resource)
    }

    #[must_use]
    pub fn contains(&self, provider: &ProviderType) -> bool {
        self.0.contains_key(provider)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ProviderType, ProviderSchema> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Schemas {
    type Item = (&'a ProviderType, &'a ProviderSchema);
    type IntoIter = btree_map::Iter<'a, ProviderType, ProviderSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
