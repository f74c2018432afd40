use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PROVIDER_HOST: &str = "registry.terraform.io";
pub const DEFAULT_PROVIDER_NAMESPACE: &str = "hashicorp";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid address \"{input}\": {reason}")]
    Invalid { input: String, reason: String },
    #[error("Invalid provider source \"{input}\": expected [hostname/]namespace/type")]
    InvalidProviderSource { input: String },
}

impl AddressError {
    fn invalid(input: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Traversal tokens
// ---------------------------------------------------------------------------

/// Index selector inside `[...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelector {
    Key(InstanceKey),
    Wildcard,
}

/// One step of a dotted traversal such as `module.a[0].aws_instance.b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalStep {
    Name(String),
    Index(KeySelector),
}

/// Split a traversal string into name and index steps.
///
/// # Errors
///
/// Returns an error for empty names, unterminated brackets or malformed keys.
pub fn parse_traversal(input: &str) -> Result<Vec<TraversalStep>, AddressError> {
    let chars: Vec<char> = input.trim().chars().collect();
    if chars.is_empty() {
        return Err(AddressError::invalid(input, "address is empty"));
    }

    let mut steps = Vec::new();
    let mut index = 0;
    let mut expect_name = true;

    while index < chars.len() {
        match chars[index] {
            '.' => {
                if expect_name {
                    return Err(AddressError::invalid(input, "unexpected \".\""));
                }
                expect_name = true;
                index += 1;
            }
            '[' => {
                if expect_name && !steps.is_empty() {
                    return Err(AddressError::invalid(input, "unexpected \"[\""));
                }
                let (selector, next) = parse_index(input, &chars, index + 1)?;
                steps.push(TraversalStep::Index(selector));
                expect_name = false;
                index = next;
            }
            _ => {
                if !expect_name {
                    return Err(AddressError::invalid(
                        input,
                        format!("expected \".\" or \"[\" at offset {index}"),
                    ));
                }
                let start = index;
                while index < chars.len() && is_name_char(chars[index]) {
                    index += 1;
                }
                if start == index {
                    return Err(AddressError::invalid(
                        input,
                        format!("unexpected character {:?}", chars[index]),
                    ));
                }
                steps.push(TraversalStep::Name(chars[start..index].iter().collect()));
                expect_name = false;
            }
        }
    }

    if expect_name {
        return Err(AddressError::invalid(input, "address ends with \".\""));
    }
    Ok(steps)
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

fn parse_index(
    input: &str,
    chars: &[char],
    mut index: usize,
) -> Result<(KeySelector, usize), AddressError> {
    let Some(&first) = chars.get(index) else {
        return Err(AddressError::invalid(input, "unterminated \"[\""));
    };

    let selector = if first == '"' {
        index += 1;
        let mut value = String::new();
        loop {
            match chars.get(index) {
                None => return Err(AddressError::invalid(input, "unterminated string key")),
                Some('\\') => {
                    let Some(&escaped) = chars.get(index + 1) else {
                        return Err(AddressError::invalid(input, "unterminated string key"));
                    };
                    value.push(escaped);
                    index += 2;
                }
                Some('"') => {
                    index += 1;
                    break;
                }
                Some(&ch) => {
                    value.push(ch);
                    index += 1;
                }
            }
        }
        KeySelector::Key(InstanceKey::Str(value))
    } else if first == '*' {
        index += 1;
        KeySelector::Wildcard
    } else {
        let start = index;
        while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '-') {
            index += 1;
        }
        let digits: String = chars[start..index].iter().collect();
        let value = digits
            .parse::<i64>()
            .map_err(|_| AddressError::invalid(input, "index must be a number, string or *"))?;
        KeySelector::Key(InstanceKey::Int(value))
    };

    if chars.get(index) != Some(&']') {
        return Err(AddressError::invalid(input, "expected \"]\""));
    }
    Ok((selector, index + 1))
}

// ---------------------------------------------------------------------------
// Instance keys and module paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InstanceKey {
    #[default]
    NoKey,
    Int(i64),
    Str(String),
}

impl InstanceKey {
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::NoKey)
    }

    /// The expansion shape this key belongs to.
    #[must_use]
    pub const fn each_mode(&self) -> EachMode {
        match self {
            Self::NoKey => EachMode::Single,
            Self::Int(_) => EachMode::Count,
            Self::Str(_) => EachMode::ForEach,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoKey => Ok(()),
            Self::Int(value) => write!(formatter, "[{value}]"),
            Self::Str(value) => write!(formatter, "[{}]", quote(value)),
        }
    }
}

impl TryFrom<String> for InstanceKey {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self::NoKey);
        }
        match parse_traversal(&value)?.as_slice() {
            [TraversalStep::Index(KeySelector::Key(key))] => Ok(key.clone()),
            _ => Err(AddressError::invalid(&value, "expected a single instance key")),
        }
    }
}

impl From<InstanceKey> for String {
    fn from(value: InstanceKey) -> Self {
        value.to_string()
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// How a configuration block expands into instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EachMode {
    Single,
    Count,
    ForEach,
}

impl EachMode {
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        !matches!(self, Self::Single)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ModuleInstanceStep {
    pub name: String,
    pub key: InstanceKey,
}

/// Static module path, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Module(Vec<String>);

impl Module {
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut steps = self.0.clone();
        steps.push(name.to_string());
        Self(steps)
    }

    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Module {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, name) in self.0.iter().enumerate() {
            if index > 0 {
                formatter.write_str(".")?;
            }
            write!(formatter, "module.{name}")?;
        }
        Ok(())
    }
}

/// A module path with instance keys, `module.a[0].module.b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleInstance(Vec<ModuleInstanceStep>);

impl ModuleInstance {
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn child(&self, name: &str, key: InstanceKey) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleInstanceStep {
            name: name.to_string(),
            key,
        });
        Self(steps)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    #[must_use]
    pub fn last_step(&self) -> Option<&ModuleInstanceStep> {
        self.0.last()
    }

    #[must_use]
    pub fn steps(&self) -> &[ModuleInstanceStep] {
        &self.0
    }

    /// Whether `prefix` is this module instance or one of its ancestors.
    #[must_use]
    pub fn has_prefix(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    #[must_use]
    pub fn module(&self) -> Module {
        Module(self.0.iter().map(|step| step.name.clone()).collect())
    }

    fn from_steps(input: &str, steps: &[TraversalStep]) -> Result<(Self, usize), AddressError> {
        let mut path = Vec::new();
        let mut index = 0;
        while let Some(TraversalStep::Name(name)) = steps.get(index) {
            if name != "module" {
                break;
            }
            let Some(TraversalStep::Name(call)) = steps.get(index + 1) else {
                return Err(AddressError::invalid(
                    input,
                    "prefix \"module.\" must be followed by a module name",
                ));
            };
            index += 2;
            let key = match steps.get(index) {
                Some(TraversalStep::Index(KeySelector::Key(key))) => {
                    index += 1;
                    key.clone()
                }
                Some(TraversalStep::Index(KeySelector::Wildcard)) => {
                    return Err(AddressError::invalid(
                        input,
                        "wildcard keys are only allowed in targets",
                    ));
                }
                _ => InstanceKey::NoKey,
            };
            path.push(ModuleInstanceStep {
                name: call.clone(),
                key,
            });
        }
        Ok((Self(path), index))
    }
}

impl Ord for ModuleInstance {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for ModuleInstance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.0.iter().enumerate() {
            if index > 0 {
                formatter.write_str(".")?;
            }
            write!(formatter, "module.{}{}", step.name, step.key)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleInstance {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.trim().is_empty() {
            return Ok(Self::root());
        }
        let steps = parse_traversal(input)?;
        let (path, consumed) = Self::from_steps(input, &steps)?;
        if consumed != steps.len() {
            return Err(AddressError::invalid(
                input,
                "a module instance address may only contain module steps",
            ));
        }
        Ok(path)
    }
}

impl TryFrom<String> for ModuleInstance {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleInstance> for String {
    fn from(value: ModuleInstance) -> Self {
        value.to_string()
    }
}

/// Render `module_prefix.local` without a leading dot for the root module.
#[must_use]
pub fn join_module(module: &ModuleInstance, local: &str) -> String {
    if module.is_root() {
        local.to_string()
    } else {
        format!("{module}.{local}")
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceMode {
    Managed,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resource {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
}

impl Resource {
    #[must_use]
    pub fn managed(type_name: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn data(type_name: &str, name: &str) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }

    /// The provider local name implied by the type prefix (`aws_instance` → `aws`).
    #[must_use]
    pub fn implied_provider(&self) -> &str {
        self.type_name
            .split_once('_')
            .map_or(self.type_name.as_str(), |(prefix, _)| prefix)
    }

    #[must_use]
    pub fn absolute(&self, module: ModuleInstance) -> AbsResource {
        AbsResource {
            module,
            resource: self.clone(),
        }
    }

    fn from_steps(input: &str, steps: &[TraversalStep]) -> Result<(Self, usize), AddressError> {
        let name_at = |index: usize| match steps.get(index) {
            Some(TraversalStep::Name(name)) => Some(name.clone()),
            _ => None,
        };
        let (mode, offset) = match name_at(0).as_deref() {
            Some("data") => (ResourceMode::Data, 1),
            Some(_) => (ResourceMode::Managed, 0),
            None => return Err(AddressError::invalid(input, "expected a resource type")),
        };
        let (Some(type_name), Some(name)) = (name_at(offset), name_at(offset + 1)) else {
            return Err(AddressError::invalid(
                input,
                "resource address must have a type and a name",
            ));
        };
        Ok((
            Self {
                mode,
                type_name,
                name,
            },
            offset + 2,
        ))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(formatter, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(formatter, "data.{}.{}", self.type_name, self.name),
        }
    }
}

impl FromStr for Resource {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let steps = parse_traversal(input)?;
        let (resource, consumed) = Self::from_steps(input, &steps)?;
        if consumed != steps.len() {
            return Err(AddressError::invalid(input, "unexpected trailing steps"));
        }
        Ok(resource)
    }
}

impl TryFrom<String> for Resource {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resource> for String {
    fn from(value: Resource) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct AbsResource {
    pub module: ModuleInstance,
    pub resource: Resource,
}

impl AbsResource {
    #[must_use]
    pub fn instance(&self, key: InstanceKey) -> AbsResourceInstance {
        AbsResourceInstance {
            module: self.module.clone(),
            resource: self.resource.clone(),
            key,
        }
    }
}

impl fmt::Display for AbsResource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&join_module(&self.module, &self.resource.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AbsResourceInstance {
    pub module: ModuleInstance,
    pub resource: Resource,
    pub key: InstanceKey,
}

impl AbsResourceInstance {
    #[must_use]
    pub fn containing_resource(&self) -> AbsResource {
        AbsResource {
            module: self.module.clone(),
            resource: self.resource.clone(),
        }
    }
}

impl fmt::Display for AbsResourceInstance {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = format!("{}{}", self.resource, self.key);
        formatter.write_str(&join_module(&self.module, &local))
    }
}

impl FromStr for AbsResourceInstance {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let steps = parse_traversal(input)?;
        let (module, consumed) = ModuleInstance::from_steps(input, &steps)?;
        if consumed == steps.len() {
            return Err(AddressError::invalid(
                input,
                "a resource instance address is required, not a module address",
            ));
        }
        let (resource, used) = Resource::from_steps(input, &steps[consumed..])?;
        let rest = &steps[consumed + used..];
        let key = match rest {
            [] => InstanceKey::NoKey,
            [TraversalStep::Index(KeySelector::Key(key))] => key.clone(),
            _ => {
                return Err(AddressError::invalid(
                    input,
                    "a resource instance address may only end with a single instance key",
                ));
            }
        };
        Ok(Self {
            module,
            resource,
            key,
        })
    }
}

impl TryFrom<String> for AbsResourceInstance {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AbsResourceInstance> for String {
    fn from(value: AbsResourceInstance) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Fully-qualified provider type, `registry.terraform.io/hashicorp/aws`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderType {
    pub hostname: String,
    pub namespace: String,
    pub type_name: String,
}

impl ProviderType {
    /// The provider type assumed for a local name with no explicit source.
    #[must_use]
    pub fn default_for(type_name: &str) -> Self {
        Self {
            hostname: DEFAULT_PROVIDER_HOST.to_string(),
            namespace: DEFAULT_PROVIDER_NAMESPACE.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}/{}/{}",
            self.hostname, self.namespace, self.type_name
        )
    }
}

impl FromStr for ProviderType {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split('/').collect();
        let valid = |part: &&str| !part.is_empty() && part.chars().all(is_name_char_or_dot);
        if !parts.iter().all(valid) {
            return Err(AddressError::InvalidProviderSource {
                input: input.to_string(),
            });
        }
        match parts.as_slice() {
            [type_name] => Ok(Self::default_for(type_name)),
            [namespace, type_name] => Ok(Self {
                hostname: DEFAULT_PROVIDER_HOST.to_string(),
                namespace: (*namespace).to_string(),
                type_name: (*type_name).to_string(),
            }),
            [hostname, namespace, type_name] => Ok(Self {
                hostname: (*hostname).to_string(),
                namespace: (*namespace).to_string(),
                type_name: (*type_name).to_string(),
            }),
            _ => Err(AddressError::InvalidProviderSource {
                input: input.to_string(),
            }),
        }
    }
}

fn is_name_char_or_dot(ch: char) -> bool {
    is_name_char(ch) || ch == '.'
}

impl TryFrom<String> for ProviderType {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProviderType> for String {
    fn from(value: ProviderType) -> Self {
        value.to_string()
    }
}

/// A provider configuration as named inside one module, `aws` or `aws.west`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalProviderConfig {
    pub local_name: String,
    pub alias: Option<String>,
}

impl LocalProviderConfig {
    #[must_use]
    pub fn new(local_name: &str, alias: Option<&str>) -> Self {
        Self {
            local_name: local_name.to_string(),
            alias: alias.map(str::to_string),
        }
    }
}

impl fmt::Display for LocalProviderConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(formatter, "{}.{alias}", self.local_name),
            None => formatter.write_str(&self.local_name),
        }
    }
}

impl FromStr for LocalProviderConfig {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match parse_traversal(input)?.as_slice() {
            [TraversalStep::Name(name)] => Ok(Self::new(name, None)),
            [TraversalStep::Name(name), TraversalStep::Name(alias)] => {
                Ok(Self::new(name, Some(alias)))
            }
            _ => Err(AddressError::invalid(
                input,
                "provider reference must be NAME or NAME.ALIAS",
            )),
        }
    }
}

impl TryFrom<String> for LocalProviderConfig {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocalProviderConfig> for String {
    fn from(value: LocalProviderConfig) -> Self {
        value.to_string()
    }
}

/// A provider configuration placed in a specific module instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AbsProviderConfig {
    pub module: ModuleInstance,
    pub provider: ProviderType,
    pub alias: Option<String>,
}

impl AbsProviderConfig {
    #[must_use]
    pub const fn new(module: ModuleInstance, provider: ProviderType, alias: Option<String>) -> Self {
        Self {
            module,
            provider,
            alias,
        }
    }
}

impl fmt::Display for AbsProviderConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut local = format!("provider[{}]", quote(&self.provider.to_string()));
        if let Some(alias) = &self.alias {
            local.push('.');
            local.push_str(alias);
        }
        formatter.write_str(&join_module(&self.module, &local))
    }
}

impl FromStr for AbsProviderConfig {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let steps = parse_traversal(input)?;
        let (module, consumed) = ModuleInstance::from_steps(input, &steps)?;
        match &steps[consumed..] {
            [
                TraversalStep::Name(keyword),
                TraversalStep::Index(KeySelector::Key(InstanceKey::Str(source))),
                rest @ ..,
            ] if keyword == "provider" => {
                let alias = match rest {
                    [] => None,
                    [TraversalStep::Name(alias)] => Some(alias.clone()),
                    _ => return Err(AddressError::invalid(input, "unexpected trailing steps")),
                };
                Ok(Self {
                    module,
                    provider: source.parse()?,
                    alias,
                })
            }
            _ => Err(AddressError::invalid(
                input,
                "expected provider[\"SOURCE\"] after the module path",
            )),
        }
    }
}

impl TryFrom<String> for AbsProviderConfig {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AbsProviderConfig> for String {
    fn from(value: AbsProviderConfig) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// References found in expressions
// ---------------------------------------------------------------------------

/// Something an expression can refer to, relative to the module it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Reference {
    Resource(Resource),
    Variable(String),
    Local(String),
    ModuleCall(String),
    ModuleOutput { call: String, output: String },
}

impl fmt::Display for Reference {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(resource) => resource.fmt(formatter),
            Self::Variable(name) => write!(formatter, "var.{name}"),
            Self::Local(name) => write!(formatter, "local.{name}"),
            Self::ModuleCall(call) => write!(formatter, "module.{call}"),
            Self::ModuleOutput { call, output } => write!(formatter, "module.{call}.{output}"),
        }
    }
}

/// Roots that never produce graph dependencies.
const NON_GRAPH_ROOTS: [&str; 5] = ["count", "each", "path", "terraform", "self"];

/// Parse an expression traversal into a graph reference.
///
/// Returns `Ok(None)` for traversals that never become graph edges
/// (`count.index`, `each.key`, `path.module`, `terraform.workspace`, `self`)
/// and for names bound locally by the caller (dynamic block iterators).
///
/// # Errors
///
/// Returns an error when the traversal cannot be split or its root is
/// incomplete (`var` without a name, `module.x` followed by an index only).
pub fn parse_reference(input: &str) -> Result<Option<Reference>, AddressError> {
    let steps = parse_traversal(input)?;
    let name_at = |index: usize| match steps.get(index) {
        Some(TraversalStep::Name(name)) => Some(name.clone()),
        _ => None,
    };
    let Some(root) = name_at(0) else {
        return Err(AddressError::invalid(input, "reference must start with a name"));
    };

    if NON_GRAPH_ROOTS.contains(&root.as_str()) {
        return Ok(None);
    }

    let need = |value: Option<String>, what: &str| -> Result<String, AddressError> {
        value.ok_or_else(|| {
            AddressError::invalid(input, format!("\"{root}\" must be followed by {what}"))
        })
    };

    match root.as_str() {
        "var" => Ok(Some(Reference::Variable(need(name_at(1), "a variable name")?))),
        "local" => Ok(Some(Reference::Local(need(name_at(1), "a local value name")?))),
        "module" => {
            let call = need(name_at(1), "a module call name")?;
            let output_index = match steps.get(2) {
                Some(TraversalStep::Index(_)) => 3,
                _ => 2,
            };
            Ok(Some(match name_at(output_index) {
                Some(output) => Reference::ModuleOutput { call, output },
                None => Reference::ModuleCall(call),
            }))
        }
        "data" => {
            let type_name = need(name_at(1), "a data source type")?;
            let name = need(name_at(2), "a data source name")?;
            Ok(Some(Reference::Resource(Resource::data(&type_name, &name))))
        }
        _ => {
            let name = need(name_at(1), "a resource name")?;
            Ok(Some(Reference::Resource(Resource::managed(&root, &name))))
        }
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetModuleStep {
    pub name: String,
    pub key: Option<KeySelector>,
}

/// A `-target`/`-exclude` address. Module steps without a key or with `[*]`
/// match every instance of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub module: Vec<TargetModuleStep>,
    pub resource: Option<(Resource, Option<KeySelector>)>,
    raw: String,
}

impl Target {
    /// Whether `module` lies inside the module prefix of this target.
    #[must_use]
    pub fn matches_module_prefix(&self, module: &ModuleInstance) -> bool {
        if module.steps().len() < self.module.len() {
            return false;
        }
        self.module
            .iter()
            .zip(module.steps())
            .all(|(pattern, step)| pattern.name == step.name && key_matches(pattern.key.as_ref(), &step.key))
    }

    #[must_use]
    pub fn matches_module_exactly(&self, module: &ModuleInstance) -> bool {
        module.steps().len() == self.module.len() && self.matches_module_prefix(module)
    }

    /// Whether a graph vertex living in `module` for `resource`/`key` is selected.
    #[must_use]
    pub fn matches(
        &self,
        module: &ModuleInstance,
        resource: Option<&Resource>,
        key: Option<&InstanceKey>,
    ) -> bool {
        match &self.resource {
            None => self.matches_module_prefix(module),
            Some((target_resource, target_key)) => {
                if !self.matches_module_exactly(module) || resource != Some(target_resource) {
                    return false;
                }
                // A whole-resource vertex covers every one of its instances.
                match key {
                    None => true,
                    Some(key) => key_matches(target_key.as_ref(), key),
                }
            }
        }
    }

    /// The static module path the target names.
    #[must_use]
    pub fn module_path(&self) -> Module {
        self.module
            .iter()
            .fold(Module::root(), |module, step| module.child(&step.name))
    }
}

fn key_matches(pattern: Option<&KeySelector>, key: &InstanceKey) -> bool {
    match pattern {
        None | Some(KeySelector::Wildcard) => true,
        Some(KeySelector::Key(expected)) => expected == key,
    }
}

impl fmt::Display for Target {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}

impl FromStr for Target {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let steps = parse_traversal(input)?;
        let mut module = Vec::new();
        let mut index = 0;
        while let Some(TraversalStep::Name(name)) = steps.get(index) {
            if name != "module" {
                break;
            }
            let Some(TraversalStep::Name(call)) = steps.get(index + 1) else {
                return Err(AddressError::invalid(
                    input,
                    "prefix \"module.\" must be followed by a module name",
                ));
            };
            index += 2;
            let key = match steps.get(index) {
                Some(TraversalStep::Index(selector)) => {
                    index += 1;
                    Some(selector.clone())
                }
                _ => None,
            };
            module.push(TargetModuleStep {
                name: call.clone(),
                key,
            });
        }

        let resource = if index == steps.len() {
            None
        } else {
            let (resource, used) = Resource::from_steps(input, &steps[index..])?;
            let key = match &steps[index + used..] {
                [] => None,
                [TraversalStep::Index(selector)] => Some(selector.clone()),
                _ => {
                    return Err(AddressError::invalid(
                        input,
                        "unexpected steps after the resource instance key",
                    ));
                }
            };
            Some((resource, key))
        };

        Ok(Self {
            module,
            resource,
            raw: input.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::{
        AbsProviderConfig, AbsResourceInstance, AddressError, InstanceKey, ModuleInstance,
        ProviderType, Reference, Resource, Target, parse_reference,
    };

    #[test]
    fn renders_module_instances_with_keys() {
        let path = ModuleInstance::root()
            .child("a", InstanceKey::Int(0))
            .child("b", InstanceKey::Str("x".to_string()));
        assert_eq!(path.to_string(), "module.a[0].module.b[\"x\"]");
        let parsed: ModuleInstance = path.to_string().parse().expect("parse module path");
        assert_eq!(parsed, path);
    }

    #[test]
    fn renders_provider_configs() {
        let aws = ProviderType::default_for("aws");
        let root = AbsProviderConfig::new(ModuleInstance::root(), aws.clone(), None);
        assert_eq!(root.to_string(), "provider[\"registry.terraform.io/hashicorp/aws\"]");

        let child = AbsProviderConfig::new(
            ModuleInstance::root().child("child1", InstanceKey::NoKey),
            aws,
            Some("west".to_string()),
        );
        let rendered = child.to_string();
        assert_eq!(
            rendered,
            "module.child1.provider[\"registry.terraform.io/hashicorp/aws\"].west"
        );
        let parsed: AbsProviderConfig = rendered.parse().expect("parse provider config");
        assert_eq!(parsed, child);
    }

    #[test]
    fn parses_resource_instance_addresses() {
        let addr: AbsResourceInstance = "module.foo[1].data.aws_ami.ubuntu[\"a\"]"
            .parse()
            .expect("parse instance");
        assert_eq!(addr.resource, Resource::data("aws_ami", "ubuntu"));
        assert_eq!(addr.key, InstanceKey::Str("a".to_string()));
        assert_eq!(addr.to_string(), "module.foo[1].data.aws_ami.ubuntu[\"a\"]");
    }

    #[test]
    fn module_only_address_is_not_a_resource_instance() {
        let error = "module.foo"
            .parse::<AbsResourceInstance>()
            .expect_err("module address must be rejected");
        assert!(matches!(error, AddressError::Invalid { .. }));
        assert!(error.to_string().starts_with("Invalid address"));
    }

    #[test]
    fn single_name_is_not_a_resource_instance() {
        let error = "bananas"
            .parse::<AbsResourceInstance>()
            .expect_err("bare name must be rejected");
        assert!(error.to_string().contains("Invalid address"));
    }

    #[test]
    fn parses_references() {
        assert_eq!(
            parse_reference("aws_instance.web[0].id").expect("parse"),
            Some(Reference::Resource(Resource::managed("aws_instance", "web")))
        );
        assert_eq!(
            parse_reference("module.child[\"a\"].out").expect("parse"),
            Some(Reference::ModuleOutput {
                call: "child".to_string(),
                output: "out".to_string(),
            })
        );
        assert_eq!(
            parse_reference("module.child").expect("parse"),
            Some(Reference::ModuleCall("child".to_string()))
        );
        assert_eq!(parse_reference("count.index").expect("parse"), None);
        assert!(parse_reference("var").is_err());
    }

    #[test]
    fn target_with_wildcard_matches_every_instance() {
        let target: Target = "module.child[*].aws_instance.web".parse().expect("target");
        let first = ModuleInstance::root().child("child", InstanceKey::Int(0));
        let web = Resource::managed("aws_instance", "web");
        assert!(target.matches(&first, Some(&web), None));
        assert!(!target.matches(&ModuleInstance::root(), Some(&web), None));
    }

    #[test]
    fn module_target_matches_nested_modules() {
        let target: Target = "module.child2".parse().expect("target");
        let nested = ModuleInstance::root()
            .child("child2", InstanceKey::NoKey)
            .child("inner", InstanceKey::NoKey);
        assert!(target.matches(&nested, None, None));
        let other = ModuleInstance::root().child("child1", InstanceKey::NoKey);
        assert!(!target.matches(&other, None, None));
    }

    #[test]
    fn instance_key_round_trips_through_serde() {
        let key = InstanceKey::Str("with \"quote\"".to_string());
        let encoded = serde_json::to_string(&key).expect("encode");
        let decoded: InstanceKey = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, key);
    }
}
