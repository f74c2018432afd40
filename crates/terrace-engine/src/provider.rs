use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use terrace_domain::{Diagnostics, ProviderSchema, ProviderType};

use crate::error::ProviderError;

#[derive(Debug, Clone, Default)]
pub struct GetSchemaResponse {
    pub schema: ProviderSchema,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ConfigureRequest {
    pub config: Value,
}

#[derive(Debug, Clone)]
pub struct ReadResourceRequest {
    pub type_name: String,
    pub prior: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ReadResourceResponse {
    /// `None` when the remote object no longer exists.
    pub new_state: Option<Value>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct PlanResourceChangeRequest {
    pub type_name: String,
    pub prior: Option<Value>,
    pub config: Value,
}

#[derive(Debug, Clone, Default)]
pub struct PlanResourceChangeResponse {
    pub planned: Value,
    /// Attributes whose change forces the object to be recreated.
    pub requires_replace: Vec<String>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ApplyResourceChangeRequest {
    pub type_name: String,
    pub prior: Option<Value>,
    /// `None` deletes the object.
    pub planned: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyResourceChangeResponse {
    pub new_state: Option<Value>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ReadDataSourceResponse {
    pub state: Value,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ImportResourceStateRequest {
    pub type_name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResource {
    pub type_name: String,
    pub state: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ImportResourceStateResponse {
    pub imported: Vec<ImportedResource>,
    pub diagnostics: Diagnostics,
}

/// A provider plugin as seen by graph walks.
///
/// Every call reports problems through the diagnostics in its response;
/// transport failures are the implementation's concern.
pub trait Provider: Send + Sync {
    fn get_schema(&self) -> GetSchemaResponse;
    fn configure(&self, request: &ConfigureRequest) -> Diagnostics;
    fn read_resource(&self, request: &ReadResourceRequest) -> ReadResourceResponse;
    fn plan_resource_change(&self, request: &PlanResourceChangeRequest)
    -> PlanResourceChangeResponse;
    fn apply_resource_change(
        &self,
        request: &ApplyResourceChangeRequest,
    ) -> ApplyResourceChangeResponse;
    fn read_data_source(&self, request: &ReadDataSourceRequest) -> ReadDataSourceResponse;
    fn import_resource_state(
        &self,
        request: &ImportResourceStateRequest,
    ) -> ImportResourceStateResponse;

    fn close(&self) -> Diagnostics {
        Diagnostics::new()
    }
}

pub type ProviderFactory =
    Arc<dyn Fn() -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

/// Provider constructors keyed by provider type. Each provider vertex of a
/// walk gets its own instance.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<ProviderType, ProviderFactory>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn from_factories(factories: BTreeMap<ProviderType, ProviderFactory>) -> Self {
        Self { factories }
    }

    /// Register a factory that hands out the same instance every time.
    #[must_use]
    pub fn with_fixed(mut self, provider_type: ProviderType, provider: Arc<dyn Provider>) -> Self {
        let factory: ProviderFactory =
            Arc::new(move || -> Result<Arc<dyn Provider>, ProviderError> {
                Ok(Arc::clone(&provider))
            });
        self.factories.insert(provider_type, factory);
        self
    }

    #[must_use]
    pub fn with_factory(mut self, provider_type: ProviderType, factory: ProviderFactory) -> Self {
        self.factories.insert(provider_type, factory);
        self
    }

    #[must_use]
    pub fn supported_names(&self) -> Vec<String> {
        self.factories.keys().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn is_supported(&self, provider_type: &ProviderType) -> bool {
        self.factories.contains_key(provider_type)
    }

    pub fn provider_types(&self) -> impl Iterator<Item = &ProviderType> {
        self.factories.keys()
    }

    /// # Errors
    ///
    /// Returns an error when no factory is registered for the type or the
    /// factory fails to start the provider.
    pub fn instantiate(
        &self,
        provider_type: &ProviderType,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let factory =
            self.factories
                .get(provider_type)
                .ok_or_else(|| ProviderError::NotAvailable {
                    provider: provider_type.clone(),
                })?;
        factory()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProviderRegistry")
            .field("providers", &self.supported_names())
            .finish()
    }
}
