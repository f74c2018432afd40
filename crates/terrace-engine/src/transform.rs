mod attach_config;
mod boundary;
mod close;
mod imports;
mod populate;
mod provider;
mod reduce;
mod reference;
mod root;
mod targets;

use terrace_domain::{Config, Diagnostics, ModuleConfig, ModuleInstance};

use crate::graph::Graph;

pub use attach_config::AttachConfigTransformer;
pub use boundary::CountBoundaryTransformer;
pub use close::ProviderCloseTransformer;
pub use imports::ImportTransformer;
pub use populate::{ConfigTransformer, OrphanTransformer};
pub use provider::ProviderTransformer;
pub use reduce::TransitiveReductionTransformer;
pub use reference::ReferenceTransformer;
pub use root::RootTransformer;
pub use targets::TargetsTransformer;

/// One step of a graph build. Transformers mutate the graph in place and
/// report problems as diagnostics; an error diagnostic stops the build.
pub trait GraphTransformer {
    fn name(&self) -> &'static str;
    fn transform(&self, graph: &mut Graph) -> Diagnostics;
}

/// The configuration of a module instance, if both its calls and its
/// instance keys are declared.
#[must_use]
pub fn module_instance_config<'c>(
    config: &'c Config,
    instance: &ModuleInstance,
) -> Option<&'c ModuleConfig> {
    let mut current = &config.root;
    for step in instance.steps() {
        let call = current.module_call(&step.name)?;
        if !call.instances.keys().contains(&step.key) {
            return None;
        }
        current = &call.module;
    }
    Some(current)
}
