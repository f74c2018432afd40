use serde_json::Value;
use terrace_domain::{AbsResourceInstance, Diagnostics, ResourceChange};

/// Observes per-instance progress of a walk. Every method defaults to doing
/// nothing; hooks are called from worker threads.
pub trait Hook: Send + Sync {
    fn pre_refresh(&self, _addr: &AbsResourceInstance) {}

    fn post_refresh(&self, _addr: &AbsResourceInstance, _new_state: Option<&Value>) {}

    fn post_plan(&self, _change: &ResourceChange) {}

    fn pre_apply(&self, _change: &ResourceChange) {}

    fn post_apply(&self, _change: &ResourceChange, _diagnostics: &Diagnostics) {}

    fn post_import(&self, _addr: &AbsResourceInstance, _state: &Value) {}
}
