mod builder;
mod context;
mod error;
mod eval;
mod graph;
mod hooks;
mod import;
mod node;
mod provider;
mod references;
mod transform;
mod validation;
mod walk;

pub use builder::{BuildOptions, BuilderKind, GraphBuilder};
pub use context::{Context, PlanOutcome, StateOutcome};
pub use error::{BuildError, ContextError, GraphError, ImportError, ProviderError, WalkError};
pub use eval::{Evaluator, LiteralEvaluator};
pub use graph::Graph;
pub use hooks::Hook;
pub use import::{ImportTarget, validate_import_address};
pub use node::{
    COUNT_BOUNDARY_NAME, LocalNode, NodeKey, OutputNode, ProviderNode, ROOT_NAME, ResourceNode,
    VariableNode, Vertex,
};
pub use provider::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ConfigureRequest, GetSchemaResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    PlanResourceChangeRequest, PlanResourceChangeResponse, Provider, ProviderFactory,
    ProviderRegistry, ReadDataSourceRequest, ReadDataSourceResponse, ReadResourceRequest,
    ReadResourceResponse,
};
pub use references::{references_in_block, references_in_expr, references_in_traversals};
pub use transform::{GraphTransformer, module_instance_config};
pub use validation::validate_body;
pub use walk::{CancelToken, Visitor, WalkOptions, walk};
