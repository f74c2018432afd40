use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexKind {
    Resource,
    Orphan,
    Provider,
    ProviderClose,
    CountBoundary,
    Variable,
    Local,
    Output,
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedVertex {
    pub name: String,
    pub kind: VertexKind,
    pub dependencies: Vec<String>,
}

/// A rendered graph: vertices in address order, each with sorted dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphListing {
    pub path: String,
    pub vertices: Vec<ListedVertex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexStatus {
    Pending,
    Runnable,
    Running,
    Done,
    Failed,
    Skipped,
}

impl VertexStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }
}

/// Outcome of one graph walk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalkSummary {
    pub statuses: BTreeMap<String, VertexStatus>,
    pub diagnostics: Diagnostics,
    pub cancelled: bool,
}

impl WalkSummary {
    #[must_use]
    pub fn count(&self, status: VertexStatus) -> usize {
        self.statuses.values().filter(|value| **value == status).count()
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<VertexStatus> {
        self.statuses.get(name).copied()
    }
}
