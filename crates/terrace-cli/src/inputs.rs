use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use terrace_domain::{Diagnostic, Diagnostics, ProviderSchema, Schemas};
use terrace_engine::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ConfigureRequest, GetSchemaResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, PlanResourceChangeRequest,
    PlanResourceChangeResponse, Provider, ProviderRegistry, ReadDataSourceRequest,
    ReadDataSourceResponse, ReadResourceRequest, ReadResourceResponse,
};

use crate::CliError;

/// Read and deserialize one JSON input file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_str(&text).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded input");
    Ok(value)
}

pub fn read_optional_json<T: DeserializeOwned + Default>(
    path: Option<&Path>,
) -> Result<T, CliError> {
    path.map_or_else(|| Ok(T::default()), read_json)
}

/// A provider that only knows its schema. It is enough for validation,
/// which never reaches a remote API.
struct SchemaOnlyProvider {
    schema: ProviderSchema,
}

fn unsupported(operation: &str) -> Diagnostics {
    Diagnostic::error(
        "Operation not supported",
        format!("{operation} needs a provider plugin; only the provider schema was given."),
    )
    .into()
}

impl Provider for SchemaOnlyProvider {
    fn get_schema(&self) -> GetSchemaResponse {
        GetSchemaResponse {
            schema: self.schema.clone(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn configure(&self, _request: &ConfigureRequest) -> Diagnostics {
        unsupported("configure")
    }

    fn read_resource(&self, _request: &ReadResourceRequest) -> ReadResourceResponse {
        ReadResourceResponse {
            new_state: None,
            diagnostics: unsupported("read_resource"),
        }
    }

    fn plan_resource_change(
        &self,
        _request: &PlanResourceChangeRequest,
    ) -> PlanResourceChangeResponse {
        PlanResourceChangeResponse {
            diagnostics: unsupported("plan_resource_change"),
            ..PlanResourceChangeResponse::default()
        }
    }

    fn apply_resource_change(
        &self,
        _request: &ApplyResourceChangeRequest,
    ) -> ApplyResourceChangeResponse {
        ApplyResourceChangeResponse {
            new_state: None,
            diagnostics: unsupported("apply_resource_change"),
        }
    }

    fn read_data_source(&self, _request: &ReadDataSourceRequest) -> ReadDataSourceResponse {
        ReadDataSourceResponse {
            diagnostics: unsupported("read_data_source"),
            ..ReadDataSourceResponse::default()
        }
    }

    fn import_resource_state(
        &self,
        _request: &ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        ImportResourceStateResponse {
            imported: Vec::new(),
            diagnostics: unsupported("import_resource_state"),
        }
    }
}

/// One schema-only provider per schema entry.
pub fn schema_registry(schemas: &Schemas) -> ProviderRegistry {
    schemas
        .iter()
        .fold(ProviderRegistry::default(), |registry, (provider_type, schema)| {
            let provider: Arc<dyn Provider> = Arc::new(SchemaOnlyProvider {
                schema: schema.clone(),
            });
            registry.with_fixed(provider_type.clone(), provider)
        })
}
