use terrace_domain::{AbsResourceInstance, AddressError, Diagnostics, ProviderType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("vertex {name} already exists in the graph")]
    DuplicateVertex { name: String },
    #[error("{message}")]
    Invariant { message: String },
    #[error("Cycle: {cycle}")]
    CycleDetected { cycle: String },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{transformer}: {diagnostics}")]
    Transform {
        transformer: &'static str,
        diagnostics: Diagnostics,
    },
    #[error("{diagnostics}")]
    Cycles { diagnostics: Diagnostics },
    #[error("{path} is not defined in the configuration")]
    UndeclaredModule { path: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("internal graph error: {message}")]
    Invariant { message: String },
}

impl BuildError {
    /// The diagnostics behind this failure, one per problem found.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        match self {
            Self::Transform { diagnostics, .. } | Self::Cycles { diagnostics } => {
                diagnostics.clone()
            }
            other => terrace_domain::Diagnostic::error(other.to_string(), "").into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("failed to start graph walk worker pool")]
    ThreadPool {
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
    #[error("internal walk error at {vertex}: {message}")]
    Invariant { vertex: String, message: String },
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider {provider} is not available")]
    NotAvailable { provider: ProviderType },
    #[error("failed to start provider {provider}: {message}")]
    Startup {
        provider: ProviderType,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error(
        "A managed resource address is required. Importing into a data resource is not allowed: {addr}"
    )]
    NotManaged { addr: AbsResourceInstance },
    #[error("{module} is not defined in the configuration")]
    UndeclaredModule { module: String },
    #[error("resource address \"{addr}\" does not exist in the configuration")]
    UndeclaredResource { addr: AbsResourceInstance },
    #[error("import id for {addr} must not be empty")]
    EmptyId { addr: AbsResourceInstance },
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("failed to load schema for provider {provider}:\n{diagnostics}")]
    Schema {
        provider: ProviderType,
        diagnostics: Diagnostics,
    },
}
