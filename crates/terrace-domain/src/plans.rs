use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addrs::{AbsProviderConfig, AbsResourceInstance};
use crate::state::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Create,
    Read,
    Update,
    Replace,
    Delete,
}

impl Action {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Read => "<=",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
        }
    }

    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::NoOp | Self::Read)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub addr: AbsResourceInstance,
    pub provider: AbsProviderConfig,
    pub action: Action,
    #[serde(default)]
    pub before: Value,
    #[serde(default)]
    pub after: Value,
}

/// Planned changes keyed by instance address.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Changes {
    #[serde(default)]
    pub resources: BTreeMap<AbsResourceInstance, ResourceChange>,
}

impl Changes {
    pub fn insert(&mut self, change: ResourceChange) {
        self.resources.insert(change.addr.clone(), change);
    }

    #[must_use]
    pub fn get(&self, addr: &AbsResourceInstance) -> Option<&ResourceChange> {
        self.resources.get(addr)
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.resources.values().any(|change| change.action.is_change())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceChange> {
        self.resources.values()
    }
}

/// The result of a plan walk: what will change, relative to which state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub changes: Changes,
    #[serde(default)]
    pub prior_state: State,
}
