mod addrs;
mod config;
mod diagnostics;
mod listing;
mod plans;
mod schema;
mod state;

pub use addrs::{
    AbsProviderConfig, AbsResource, AbsResourceInstance, AddressError, DEFAULT_PROVIDER_HOST,
    DEFAULT_PROVIDER_NAMESPACE, EachMode, InstanceKey, KeySelector, LocalProviderConfig, Module,
    ModuleInstance, ModuleInstanceStep, ProviderType, Reference, Resource, ResourceMode, Target,
    TargetModuleStep, TraversalStep, join_module, parse_reference, parse_traversal,
};
pub use config::{
    Block, Body, Config, DYNAMIC_BLOCK_TYPE, Expression, LocalConfig, ModuleCallConfig,
    ModuleConfig, ModuleExpansion, OutputConfig, PassedProvider, ProviderConfigBlock,
    ResourceConfig, VariableConfig,
};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use listing::{GraphListing, ListedVertex, VertexKind, VertexStatus, WalkSummary};
pub use plans::{Action, Changes, Plan, ResourceChange};
pub use schema::{
    AttributeSchema, AttributeType, BlockSchema, NestedBlockSchema, NestingMode, ProviderSchema,
    Schemas,
};
pub use state::{InstanceObject, ModuleState, ObjectStatus, ResourceState, State};
